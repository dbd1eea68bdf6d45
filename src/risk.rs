use crate::models::{CohortStats, DatasetStats, PatientRecord};

/// Risk score at or above which a patient counts as high-risk.
pub const HIGH_RISK_THRESHOLD: f64 = 0.7;

pub fn is_high_risk(record: &PatientRecord) -> bool {
    record.risk_score >= HIGH_RISK_THRESHOLD
}

/// Callers send thresholds as either a fraction or a percentage.
pub fn scale_threshold(raw: f64) -> f64 {
    if raw > 1.0 {
        raw / 100.0
    } else {
        raw
    }
}

pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

pub fn cohort_stats<'a, I>(records: I) -> CohortStats
where
    I: IntoIterator<Item = &'a PatientRecord>,
{
    let (count, total, high_risk_count) = tally(records);
    CohortStats {
        avg_risk: average(total, count),
        high_risk_count,
    }
}

pub fn dataset_stats<'a, I>(records: I) -> DatasetStats
where
    I: IntoIterator<Item = &'a PatientRecord>,
{
    let (count, total, high_risk) = tally(records);
    DatasetStats {
        total_records: count,
        high_risk,
        avg_risk: average(total, count),
    }
}

fn tally<'a, I>(records: I) -> (usize, f64, usize)
where
    I: IntoIterator<Item = &'a PatientRecord>,
{
    records
        .into_iter()
        .fold((0usize, 0.0f64, 0usize), |(count, total, high), record| {
            (
                count + 1,
                total + record.risk_score,
                high + usize::from(is_high_risk(record)),
            )
        })
}

fn average(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        round3(total / count as f64)
    }
}
