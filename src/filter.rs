//! Filtering of the record store by loosely-typed caller arguments.
//!
//! Arguments arrive from an automated caller and may be strings, numbers,
//! nulls or garbage. Each field is normalized on its own; a field that
//! cannot be read is skipped and the rest of the query still runs.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::models::PatientRecord;
use crate::risk;

/// Category values that mean "every department".
const MATCH_ALL_CATEGORIES: [&str; 5] = ["all", "any", "everything", "none", "null"];

/// Oxygen saturation assumed for records without a reading.
const DEFAULT_OXYGEN: i64 = 100;
/// Heart rate assumed for records without a reading.
const DEFAULT_HEART_RATE: i64 = 0;

#[derive(Debug, Error, PartialEq)]
#[error("cannot read {found} as {expected}")]
pub struct FieldCoercionError {
    expected: &'static str,
    found: String,
}

impl FieldCoercionError {
    fn new(expected: &'static str, value: &Value) -> Self {
        let found = match value {
            Value::String(s) => format!("{s:?}"),
            Value::Bool(_) => "a boolean".to_string(),
            Value::Array(_) => "an array".to_string(),
            Value::Object(_) => "an object".to_string(),
            other => other.to_string(),
        };
        Self { expected, found }
    }
}

/// Raw filter arguments exactly as the caller sent them.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterArgs {
    pub category: Option<Value>,
    pub risk_threshold: Option<Value>,
    pub min_oxygen: Option<Value>,
    pub max_heart_rate: Option<Value>,
}

impl FilterArgs {
    /// Reads arguments from a tool-call payload. `department` is accepted as
    /// another name for `category`; unknown keys and non-object payloads
    /// impose no constraint.
    pub fn from_json(args: &Value) -> Self {
        let field = |name: &str| args.get(name).filter(|v| !v.is_null()).cloned();
        Self {
            category: field("category").or_else(|| field("department")),
            risk_threshold: field("risk_threshold"),
            min_oxygen: field("min_oxygen"),
            max_heart_rate: field("max_heart_rate"),
        }
    }

    pub fn normalize(&self) -> FilterSpec {
        FilterSpec {
            category: self.category.as_ref().and_then(|v| {
                keep_or_skip("category", coerce_text(v)).and_then(|text| category_needle(&text))
            }),
            min_risk: self.risk_threshold.as_ref().and_then(|v| {
                keep_or_skip("risk_threshold", coerce_f64(v)).map(risk::scale_threshold)
            }),
            min_oxygen: self
                .min_oxygen
                .as_ref()
                .and_then(|v| keep_or_skip("min_oxygen", coerce_int(v))),
            max_heart_rate: self
                .max_heart_rate
                .as_ref()
                .and_then(|v| keep_or_skip("max_heart_rate", coerce_int(v))),
        }
    }
}

/// Typed constraints; `None` means the field does not restrict anything.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilterSpec {
    /// Lowercased substring the department must contain.
    pub category: Option<String>,
    pub min_risk: Option<f64>,
    pub min_oxygen: Option<i64>,
    pub max_heart_rate: Option<i64>,
}

impl FilterSpec {
    pub fn is_unconstrained(&self) -> bool {
        *self == Self::default()
    }

    /// Numeric checks run before the substring match.
    pub fn matches(&self, record: &PatientRecord) -> bool {
        self.min_risk.map_or(true, |min| record.risk_score >= min)
            && self.min_oxygen.map_or(true, |floor| {
                record
                    .vitals
                    .oxygen_saturation
                    .map_or(DEFAULT_OXYGEN, i64::from)
                    >= floor
            })
            && self.max_heart_rate.map_or(true, |ceiling| {
                record
                    .vitals
                    .heart_rate
                    .map_or(DEFAULT_HEART_RATE, i64::from)
                    <= ceiling
            })
            && self.category.as_deref().map_or(true, |needle| {
                record.department.to_lowercase().contains(needle)
            })
    }
}

/// Returns the matching records in store order as a new collection.
pub fn apply(records: &[Arc<PatientRecord>], spec: &FilterSpec) -> Vec<Arc<PatientRecord>> {
    if spec.is_unconstrained() {
        return records.to_vec();
    }
    records
        .iter()
        .filter(|record| spec.matches(record))
        .cloned()
        .collect()
}

fn keep_or_skip<T>(field: &'static str, coerced: Result<T, FieldCoercionError>) -> Option<T> {
    match coerced {
        Ok(value) => Some(value),
        Err(err) => {
            debug!(field, error = %err, "ignoring unreadable filter argument");
            None
        }
    }
}

fn category_needle(raw: &str) -> Option<String> {
    let needle = raw.trim().to_lowercase();
    if needle.is_empty() || MATCH_ALL_CATEGORIES.contains(&needle.as_str()) {
        debug!(category = raw, "category filter matches every department");
        return None;
    }
    Some(needle)
}

fn coerce_text(value: &Value) -> Result<String, FieldCoercionError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(FieldCoercionError::new("text", other)),
    }
}

fn coerce_f64(value: &Value) -> Result<f64, FieldCoercionError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| FieldCoercionError::new("a number", value))
}

/// Integers, integral floats and their string forms.
fn coerce_int(value: &Value) -> Result<i64, FieldCoercionError> {
    let parsed = match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().and_then(integral)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| s.parse::<f64>().ok().and_then(integral))
        }
        _ => None,
    };
    parsed.ok_or_else(|| FieldCoercionError::new("an integer", value))
}

fn integral(value: f64) -> Option<i64> {
    let in_range = value >= i64::MIN as f64 && value < i64::MAX as f64;
    (value.is_finite() && value.fract() == 0.0 && in_range).then_some(value as i64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vitals;
    use serde_json::json;

    fn patient(
        id: &str,
        department: &str,
        risk: f64,
        oxygen: Option<i32>,
        heart: Option<i32>,
    ) -> Arc<PatientRecord> {
        let mut record = PatientRecord::new(id, department, risk);
        record.vitals = Vitals {
            oxygen_saturation: oxygen,
            heart_rate: heart,
            ..Vitals::default()
        };
        Arc::new(record)
    }

    fn ward() -> Vec<Arc<PatientRecord>> {
        vec![
            patient("1", "ICU", 0.92, Some(89), Some(118)),
            patient("2", "Cardiology", 0.71, Some(95), Some(88)),
            patient("3", "General", 0.30, Some(98), Some(72)),
            patient("4", "Pediatric ICU", 0.55, None, None),
            patient("5", "ER", 0.70, Some(93), Some(101)),
        ]
    }

    fn ids(records: &[Arc<PatientRecord>]) -> Vec<&str> {
        records.iter().map(|r| r.patient_id.as_str()).collect()
    }

    fn run(args: Value) -> Vec<String> {
        let spec = FilterArgs::from_json(&args).normalize();
        let matched = apply(&ward(), &spec);
        ids(&matched).into_iter().map(String::from).collect()
    }

    #[test]
    fn category_is_case_insensitive_substring() {
        assert_eq!(run(json!({"category": "icu"})), ["1", "4"]);
        assert_eq!(run(json!({"category": "  Cardio "})), ["2"]);
    }

    #[test]
    fn department_is_an_alias_for_category() {
        assert_eq!(run(json!({"department": "cardiology"})), ["2"]);
        // "er" is also inside "General"
        assert_eq!(run(json!({"department": "ER"})), ["3", "5"]);
    }

    #[test]
    fn sentinel_categories_do_not_filter() {
        let everyone = run(json!({}));
        for word in ["all", "ANY", " Everything ", "none", "Null", ""] {
            assert_eq!(run(json!({ "category": word })), everyone, "category {word:?}");
        }
    }

    #[test]
    fn sentinel_category_keeps_other_filters() {
        assert_eq!(
            run(json!({"category": "all", "risk_threshold": 0.7})),
            run(json!({"risk_threshold": 0.7}))
        );
    }

    #[test]
    fn risk_threshold_accepts_fraction_percentage_and_text() {
        let expected = ["1", "2", "5"];
        assert_eq!(run(json!({"risk_threshold": 0.7})), expected);
        assert_eq!(run(json!({"risk_threshold": 70})), expected);
        assert_eq!(run(json!({"risk_threshold": "70"})), expected);
        assert_eq!(run(json!({"risk_threshold": " 0.7 "})), expected);
    }

    #[test]
    fn unreadable_fields_are_skipped() {
        let everyone = run(json!({}));
        assert_eq!(run(json!({"risk_threshold": "high"})), everyone);
        assert_eq!(run(json!({"risk_threshold": true})), everyone);
        assert_eq!(run(json!({"risk_threshold": "NaN"})), everyone);
        assert_eq!(run(json!({"min_oxygen": "low"})), everyone);
        assert_eq!(run(json!({"max_heart_rate": 99.5})), everyone);
        assert_eq!(run(json!({"category": ["ICU"]})), everyone);
    }

    #[test]
    fn bad_field_does_not_disable_good_ones() {
        assert_eq!(
            run(json!({"risk_threshold": "oops", "category": "icu"})),
            ["1", "4"]
        );
    }

    #[test]
    fn missing_oxygen_reading_passes_floor() {
        assert_eq!(run(json!({"min_oxygen": 95})), ["2", "3", "4"]);
        assert_eq!(run(json!({"min_oxygen": "95"})), ["2", "3", "4"]);
    }

    #[test]
    fn missing_heart_rate_passes_ceiling() {
        assert_eq!(run(json!({"max_heart_rate": 100})), ["2", "3", "4"]);
        assert_eq!(run(json!({"max_heart_rate": 100.0})), ["2", "3", "4"]);
    }

    #[test]
    fn filters_combine_conjunctively() {
        assert_eq!(
            run(json!({"category": "icu", "risk_threshold": 50, "min_oxygen": 90})),
            ["4"]
        );
    }

    #[test]
    fn normalize_reports_typed_constraints() {
        let spec = FilterArgs::from_json(&json!({
            "category": "ICU",
            "risk_threshold": 85,
            "min_oxygen": 92,
            "max_heart_rate": "110",
            "unrelated": 5
        }))
        .normalize();

        assert_eq!(
            spec,
            FilterSpec {
                category: Some("icu".to_string()),
                min_risk: Some(0.85),
                min_oxygen: Some(92),
                max_heart_rate: Some(110),
            }
        );
    }

    #[test]
    fn non_object_arguments_impose_nothing() {
        assert!(FilterArgs::from_json(&json!("ICU")).normalize().is_unconstrained());
        assert!(FilterArgs::from_json(&Value::Null).normalize().is_unconstrained());
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let spec = FilterArgs::from_json(&json!({"category": "ICU"})).normalize();
        assert!(apply(&[], &spec).is_empty());
    }

    #[test]
    fn coercion_errors_describe_the_value() {
        let err = coerce_int(&json!("ninety")).unwrap_err();
        assert_eq!(err.to_string(), "cannot read \"ninety\" as an integer");
    }
}
