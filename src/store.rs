use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{info, warn};

use crate::models::{parse_timestamp, PatientRecord, Vitals};
use crate::risk;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read dataset {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("dataset is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dataset CSV is malformed: {0}")]
    Csv(#[from] csv::Error),
    #[error("dataset must be a list of records, found {0}")]
    NotAList(&'static str),
    #[error("record {index} is malformed: {source}")]
    Record {
        index: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// The loaded patient population. Built once, never mutated.
#[derive(Debug, Default)]
pub struct RecordStore {
    records: Vec<Arc<PatientRecord>>,
}

impl RecordStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn from_records(records: Vec<PatientRecord>) -> Self {
        Self {
            records: records.into_iter().map(Arc::new).collect(),
        }
    }

    /// Loads a dataset file. `.csv` files use the flattened `vitals_*`
    /// column layout; everything else is read as a JSON array.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));

        let records = if is_csv {
            load_csv(path)?
        } else {
            load_json(path)?
        };
        Ok(Self::from_records(records))
    }

    /// Startup path: a dataset that cannot be loaded leaves the engine
    /// running with no records.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(store) => {
                store.log_loaded(path);
                store
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "dataset failed to load, serving an empty store"
                );
                Self::empty()
            }
        }
    }

    pub fn all(&self) -> &[Arc<PatientRecord>] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn log_loaded(&self, path: &Path) {
        let max_risk = self
            .records
            .iter()
            .map(|record| record.risk_score)
            .reduce(f64::max);
        let high_risk = self.records.iter().filter(|r| risk::is_high_risk(r)).count();
        info!(
            path = %path.display(),
            records = self.records.len(),
            max_risk = ?max_risk,
            high_risk,
            "loaded patient records"
        );
    }
}

fn load_json(path: &Path) -> Result<Vec<PatientRecord>, LoadError> {
    let raw = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let value: Value = serde_json::from_str(&raw)?;

    let items = match value {
        Value::Array(items) => items,
        Value::Object(_) => return Err(LoadError::NotAList("an object")),
        Value::String(_) => return Err(LoadError::NotAList("a string")),
        Value::Number(_) => return Err(LoadError::NotAList("a number")),
        Value::Bool(_) => return Err(LoadError::NotAList("a boolean")),
        Value::Null => return Err(LoadError::NotAList("null")),
    };

    items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            serde_json::from_value(item).map_err(|source| LoadError::Record { index, source })
        })
        .collect()
}

/// Row of the flattened CSV export. Vitals arrive as `vitals_<field>`
/// columns and numeric columns may be written as floats.
#[derive(Debug, Deserialize)]
struct CsvRow {
    patient_id: String,
    department: String,
    risk_score: f64,
    name: Option<String>,
    age: Option<f64>,
    gender: Option<String>,
    room: Option<String>,
    diagnosis: Option<String>,
    diagnosis_name: Option<String>,
    admission_date: Option<String>,
    estimated_los: Option<f64>,
    attending_physician: Option<String>,
    insurance: Option<String>,
    vitals_heart_rate: Option<f64>,
    vitals_blood_pressure_systolic: Option<f64>,
    vitals_blood_pressure_diastolic: Option<f64>,
    vitals_temperature: Option<f64>,
    vitals_oxygen_saturation: Option<f64>,
    vitals_respiratory_rate: Option<f64>,
}

impl From<CsvRow> for PatientRecord {
    fn from(row: CsvRow) -> Self {
        let whole = |value: Option<f64>| value.filter(|v| v.is_finite()).map(|v| v.round() as i32);
        let count = |value: Option<f64>| {
            value
                .filter(|v| v.is_finite() && *v >= 0.0)
                .map(|v| v.round() as u32)
        };

        let mut record = PatientRecord::new(row.patient_id, row.department, row.risk_score);
        record.vitals = Vitals {
            heart_rate: whole(row.vitals_heart_rate),
            oxygen_saturation: whole(row.vitals_oxygen_saturation),
            blood_pressure_systolic: whole(row.vitals_blood_pressure_systolic),
            blood_pressure_diastolic: whole(row.vitals_blood_pressure_diastolic),
            temperature: row.vitals_temperature.filter(|v| v.is_finite()),
            respiratory_rate: whole(row.vitals_respiratory_rate),
        };
        record.admission_date = row.admission_date.as_deref().and_then(parse_timestamp);
        record.name = row.name;
        record.age = count(row.age);
        record.gender = row.gender;
        record.room = row.room;
        record.diagnosis = row.diagnosis;
        record.diagnosis_name = row.diagnosis_name;
        record.estimated_los = count(row.estimated_los);
        record.attending_physician = row.attending_physician;
        record.insurance = row.insurance;
        record
    }
}

fn load_csv(path: &Path) -> Result<Vec<PatientRecord>, LoadError> {
    let file = File::open(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);
    let mut records = Vec::new();

    for result in reader.deserialize::<CsvRow>() {
        records.push(result?.into());
    }

    Ok(records)
}
