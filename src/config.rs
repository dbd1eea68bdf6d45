use thiserror::Error;

use crate::cache::{CohortCache, MaxEntries};

/// Records returned inline by `fetch_records` when nothing else is configured.
pub const DEFAULT_SAMPLE_CAP: usize = 10;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("sample cap must be at least 1")]
    ZeroSampleCap,
    #[error("cache capacity must be at least 1 when set")]
    ZeroCacheCapacity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub sample_cap: usize,
    /// `None` keeps every cohort for the life of the process.
    pub cache_max_entries: Option<usize>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_cap: DEFAULT_SAMPLE_CAP,
            cache_max_entries: None,
        }
    }
}

impl EngineConfig {
    pub fn new(sample_cap: usize, cache_max_entries: Option<usize>) -> Result<Self, ConfigError> {
        if sample_cap == 0 {
            return Err(ConfigError::ZeroSampleCap);
        }
        if cache_max_entries == Some(0) {
            return Err(ConfigError::ZeroCacheCapacity);
        }
        Ok(Self {
            sample_cap,
            cache_max_entries,
        })
    }

    pub fn build_cache(&self) -> CohortCache {
        match self.cache_max_entries {
            Some(limit) => CohortCache::new(Box::new(MaxEntries(limit))),
            None => CohortCache::unbounded(),
        }
    }
}
