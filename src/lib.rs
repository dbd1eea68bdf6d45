//! Query engine over an in-memory hospital patient dataset.
//!
//! Callers filter the population with loosely-typed arguments, get back a
//! small sample plus a cache key, and redeem the key later for the full
//! cohort. Department summaries are staged the same way.

pub mod cache;
pub mod config;
pub mod filter;
pub mod models;
pub mod risk;
pub mod rpc;
pub mod store;
pub mod summary;
pub mod tools;

pub use cache::{CohortCache, EvictionPolicy, MaxEntries, Unbounded};
pub use config::{ConfigError, EngineConfig, DEFAULT_SAMPLE_CAP};
pub use filter::{FilterArgs, FilterSpec};
pub use models::{CategorySummary, CohortEntry, EntryStatus, PatientRecord, Vitals};
pub use risk::HIGH_RISK_THRESHOLD;
pub use store::{LoadError, RecordStore};
pub use tools::CohortTools;
