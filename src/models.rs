use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// One admitted patient as loaded from the dataset.
///
/// Descriptive fields the engine never filters on are optional so that
/// trimmed-down datasets still load; anything not modelled here is kept in
/// `extra` and written back out unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatientRecord {
    pub patient_id: String,
    pub department: String,
    pub risk_score: f64,
    #[serde(default, deserialize_with = "nullable_vitals")]
    pub vitals: Vitals,
    #[serde(
        default,
        deserialize_with = "lenient_timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub admission_date: Option<NaiveDateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnosis_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attending_physician: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurance: Option<String>,
    /// Estimated length of stay in days.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_los: Option<u32>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl PatientRecord {
    /// Minimal record with every optional field unset.
    pub fn new(
        patient_id: impl Into<String>,
        department: impl Into<String>,
        risk_score: f64,
    ) -> Self {
        Self {
            patient_id: patient_id.into(),
            department: department.into(),
            risk_score,
            vitals: Vitals::default(),
            admission_date: None,
            name: None,
            age: None,
            gender: None,
            room: None,
            diagnosis: None,
            diagnosis_name: None,
            attending_physician: None,
            insurance: None,
            estimated_los: None,
            extra: Map::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Vitals {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<i32>,
    #[serde(default, alias = "spo2", skip_serializing_if = "Option::is_none")]
    pub oxygen_saturation: Option<i32>,
    #[serde(default, alias = "bp_systolic", skip_serializing_if = "Option::is_none")]
    pub blood_pressure_systolic: Option<i32>,
    #[serde(default, alias = "bp_diastolic", skip_serializing_if = "Option::is_none")]
    pub blood_pressure_diastolic: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiratory_rate: Option<i32>,
}

/// An explicit `"vitals": null` reads the same as a missing block.
fn nullable_vitals<'de, D>(deserializer: D) -> Result<Vitals, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vitals>::deserialize(deserializer)?.unwrap_or_default())
}

/// Accepts naive ISO timestamps, RFC 3339 timestamps and bare dates.
/// Anything else is dropped rather than failing the whole record.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<NaiveDateTime>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    raw.parse::<NaiveDateTime>()
        .ok()
        .or_else(|| DateTime::parse_from_rfc3339(raw).ok().map(|dt| dt.naive_utc()))
        .or_else(|| {
            raw.parse::<NaiveDate>()
                .ok()
                .and_then(|date| date.and_hms_opt(0, 0, 0))
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySummary {
    pub category: String,
    pub count: usize,
    pub avg_risk: f64,
    pub high_risk_count: usize,
}

/// Risk overview of one cohort.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortStats {
    pub avg_risk: f64,
    pub high_risk_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DatasetStats {
    pub total_records: usize,
    pub high_risk: usize,
    pub avg_risk: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryStatus {
    Success,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CohortData {
    Records(Vec<Arc<PatientRecord>>),
    Summary(Vec<CategorySummary>),
}

/// A staged query result, as handed back when a cache key is redeemed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CohortEntry {
    pub status: EntryStatus,
    pub data: CohortData,
    pub total_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<CohortStats>,
}

impl CohortEntry {
    pub fn records(records: Vec<Arc<PatientRecord>>, stats: CohortStats) -> Self {
        Self {
            status: EntryStatus::Success,
            total_count: records.len(),
            data: CohortData::Records(records),
            stats: Some(stats),
        }
    }

    pub fn summary(summary: Vec<CategorySummary>) -> Self {
        Self {
            status: EntryStatus::Success,
            total_count: summary.len(),
            data: CohortData::Summary(summary),
            stats: None,
        }
    }

    /// What an unknown key redeems to.
    pub fn empty() -> Self {
        Self {
            status: EntryStatus::Empty,
            data: CohortData::Records(Vec::new()),
            total_count: 0,
            stats: None,
        }
    }

    pub fn record_list(&self) -> &[Arc<PatientRecord>] {
        match &self.data {
            CohortData::Records(records) => records,
            CohortData::Summary(_) => &[],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingResponse {
    pub status: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchResponse {
    pub cache_key: String,
    pub sample_records: Vec<Arc<PatientRecord>>,
    pub sample_count: usize,
    pub total_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SummaryResponse {
    pub cache_key: String,
    pub summary: Vec<CategorySummary>,
}
