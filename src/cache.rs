//! Process-lifetime store of staged query results, keyed by generated
//! handles that callers redeem later.
//!
//! Entries are never updated in place. With the default [`Unbounded`]
//! policy nothing is ever removed, so the cache grows for as long as the
//! process runs; a [`MaxEntries`] policy drops the oldest entries instead.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::debug;
use uuid::Uuid;

use crate::models::CohortEntry;

/// Decides how many of the oldest entries to drop after an insert.
pub trait EvictionPolicy: Send + Sync + fmt::Debug {
    fn excess(&self, len: usize) -> usize;
}

/// Keeps every entry for the life of the process.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl EvictionPolicy for Unbounded {
    fn excess(&self, _len: usize) -> usize {
        0
    }
}

/// Caps the cache at a fixed number of entries, oldest out first.
#[derive(Debug, Clone, Copy)]
pub struct MaxEntries(pub usize);

impl EvictionPolicy for MaxEntries {
    fn excess(&self, len: usize) -> usize {
        len.saturating_sub(self.0)
    }
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<String, Arc<CohortEntry>>,
    order: VecDeque<String>,
}

#[derive(Debug)]
pub struct CohortCache {
    inner: RwLock<Inner>,
    policy: Box<dyn EvictionPolicy>,
    empty: Arc<CohortEntry>,
}

impl Default for CohortCache {
    fn default() -> Self {
        Self::unbounded()
    }
}

impl CohortCache {
    pub fn new(policy: Box<dyn EvictionPolicy>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            policy,
            empty: Arc::new(CohortEntry::empty()),
        }
    }

    pub fn unbounded() -> Self {
        Self::new(Box::new(Unbounded))
    }

    /// Stores `entry` under a fresh key and returns the key.
    ///
    /// Keys look like `<prefix>_<utc millis timestamp>_<random hex>`. The key
    /// is checked against existing entries under the write lock, so two
    /// writers can never end up sharing one.
    pub fn put(&self, prefix: &str, entry: CohortEntry) -> String {
        let entry = Arc::new(entry);
        let mut inner = self.inner.write().unwrap_or_else(PoisonError::into_inner);

        let mut key = generate_key(prefix);
        while inner.entries.contains_key(&key) {
            key = generate_key(prefix);
        }

        inner.entries.insert(key.clone(), entry);
        inner.order.push_back(key.clone());

        let excess = self.policy.excess(inner.entries.len());
        for _ in 0..excess {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            inner.entries.remove(&oldest);
            debug!(key = %oldest, "evicted cohort");
        }

        key
    }

    /// Looks up a staged result. Unknown keys yield an empty entry.
    pub fn get(&self, key: &str) -> Arc<CohortEntry> {
        let inner = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        match inner.entries.get(key) {
            Some(entry) => Arc::clone(entry),
            None => {
                debug!(key, "cohort cache miss");
                Arc::clone(&self.empty)
            }
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn generate_key(prefix: &str) -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!(
        "{prefix}_{}_{}",
        Utc::now().format("%Y%m%d%H%M%S%3f"),
        &suffix[..12]
    )
}
