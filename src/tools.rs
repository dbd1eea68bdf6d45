//! Tool surface over the record store and the cohort cache.
//!
//! Every operation answers. An empty store produces empty-shaped responses,
//! bad filter arguments are skipped, and unknown cache keys redeem to an
//! empty entry.

use std::sync::Arc;

use tracing::info;

use crate::cache::CohortCache;
use crate::config::EngineConfig;
use crate::filter::{self, FilterArgs};
use crate::models::{CohortEntry, DatasetStats, FetchResponse, PingResponse, SummaryResponse};
use crate::risk;
use crate::store::RecordStore;
use crate::summary;

const PATIENTS_PREFIX: &str = "patients";
const SUMMARY_PREFIX: &str = "dept_summary";

pub struct CohortTools {
    store: Arc<RecordStore>,
    cache: CohortCache,
    sample_cap: usize,
}

impl CohortTools {
    pub fn new(store: Arc<RecordStore>, config: &EngineConfig) -> Self {
        Self {
            store,
            cache: config.build_cache(),
            sample_cap: config.sample_cap,
        }
    }

    pub fn store(&self) -> &RecordStore {
        &self.store
    }

    pub fn cache(&self) -> &CohortCache {
        &self.cache
    }

    pub fn sample_cap(&self) -> usize {
        self.sample_cap
    }

    pub fn ping(&self) -> PingResponse {
        PingResponse { status: "online" }
    }

    /// Filters the store, stages the whole cohort and returns a capped
    /// prefix of it along with the key that redeems the rest.
    pub fn fetch_records(&self, args: &FilterArgs) -> FetchResponse {
        let spec = args.normalize();
        let matched = filter::apply(self.store.all(), &spec);
        let total_count = matched.len();
        let sample_records: Vec<_> = matched.iter().take(self.sample_cap).cloned().collect();
        let stats = risk::cohort_stats(matched.iter().map(Arc::as_ref));

        let cache_key = self
            .cache
            .put(PATIENTS_PREFIX, CohortEntry::records(matched, stats));

        info!(
            cache_key = %cache_key,
            filters = ?spec,
            total_count,
            sample_count = sample_records.len(),
            "staged patient cohort"
        );

        FetchResponse {
            cache_key,
            sample_count: sample_records.len(),
            sample_records,
            total_count,
        }
    }

    pub fn summarize_by_category(&self) -> SummaryResponse {
        let summary = summary::summarize_by_category(self.store.all().iter().map(Arc::as_ref));
        let cache_key = self
            .cache
            .put(SUMMARY_PREFIX, CohortEntry::summary(summary.clone()));

        info!(cache_key = %cache_key, categories = summary.len(), "staged department summary");
        SummaryResponse { cache_key, summary }
    }

    pub fn dataset_stats(&self) -> DatasetStats {
        risk::dataset_stats(self.store.all().iter().map(Arc::as_ref))
    }

    pub fn redeem(&self, key: &str) -> Arc<CohortEntry> {
        self.cache.get(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{EntryStatus, PatientRecord};
    use serde_json::json;

    fn tools(records: Vec<PatientRecord>, sample_cap: usize) -> CohortTools {
        let config = EngineConfig::new(sample_cap, None).unwrap();
        CohortTools::new(Arc::new(RecordStore::from_records(records)), &config)
    }

    fn population(n: usize) -> Vec<PatientRecord> {
        (0..n)
            .map(|i| {
                let department = ["ICU", "ER"][i % 2];
                PatientRecord::new(format!("P-{i:06}"), department, (i % 100) as f64 / 100.0)
            })
            .collect()
    }

    #[test]
    fn ping_reports_online() {
        assert_eq!(tools(Vec::new(), 10).ping().status, "online");
    }

    #[test]
    fn sample_is_capped_but_cache_holds_everything() {
        let tools = tools(population(40), 10);
        let response = tools.fetch_records(&FilterArgs::default());

        assert_eq!(response.total_count, 40);
        assert_eq!(response.sample_count, 10);
        assert_eq!(response.sample_records.len(), 10);
        assert_eq!(response.sample_records[0].patient_id, "P-000000");

        let entry = tools.redeem(&response.cache_key);
        assert_eq!(entry.status, EntryStatus::Success);
        assert_eq!(entry.total_count, 40);
        assert_eq!(entry.record_list().len(), 40);
    }

    #[test]
    fn small_cohorts_are_returned_whole() {
        let tools = tools(population(100), 10);
        let response = tools.fetch_records(&FilterArgs::from_json(&json!({"risk_threshold": 98})));
        assert_eq!(response.total_count, 2);
        assert_eq!(response.sample_count, 2);
    }

    #[test]
    fn staged_cohort_carries_risk_stats() {
        let tools = tools(population(100), 10);
        let response = tools.fetch_records(&FilterArgs::from_json(&json!({"risk_threshold": 0.7})));
        let entry = tools.redeem(&response.cache_key);
        let stats = entry.stats.as_ref().unwrap();
        assert_eq!(stats.high_risk_count, 30);
        assert_eq!(stats.avg_risk, 0.845);
    }

    #[test]
    fn summary_is_staged_and_returned_in_full() {
        let tools = tools(population(10), 3);
        let response = tools.summarize_by_category();
        assert_eq!(response.summary.len(), 2);
        assert!(response.cache_key.starts_with("dept_summary_"));

        let entry = tools.redeem(&response.cache_key);
        assert_eq!(entry.total_count, 2);
        assert!(entry.record_list().is_empty());
    }

    #[test]
    fn empty_store_answers_with_empty_shapes() {
        let tools = tools(Vec::new(), 10);

        let fetched = tools.fetch_records(&FilterArgs::from_json(&json!({"category": "ICU"})));
        assert_eq!(fetched.total_count, 0);
        assert!(fetched.sample_records.is_empty());
        assert_eq!(tools.redeem(&fetched.cache_key).total_count, 0);

        let summary = tools.summarize_by_category();
        assert!(summary.summary.is_empty());

        let stats = tools.dataset_stats();
        assert_eq!(stats.total_records, 0);
        assert_eq!(stats.avg_risk, 0.0);
    }

    #[test]
    fn dataset_stats_cover_whole_store() {
        let stats = tools(population(100), 10).dataset_stats();
        assert_eq!(stats.total_records, 100);
        assert_eq!(stats.high_risk, 30);
        assert_eq!(stats.avg_risk, 0.495);
    }
}
