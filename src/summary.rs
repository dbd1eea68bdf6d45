use std::cmp::Ordering;
use std::collections::HashMap;

use crate::models::{CategorySummary, PatientRecord};
use crate::risk;

/// Groups records by department, highest average risk first.
pub fn summarize_by_category<'a, I>(records: I) -> Vec<CategorySummary>
where
    I: IntoIterator<Item = &'a PatientRecord>,
{
    let mut map: HashMap<&str, (usize, f64, usize)> = HashMap::new();

    for record in records {
        let entry = map.entry(record.department.as_str()).or_insert((0, 0.0, 0));
        entry.0 += 1;
        entry.1 += record.risk_score;
        if risk::is_high_risk(record) {
            entry.2 += 1;
        }
    }

    // every group holds at least one record, so count is never zero
    let mut summaries: Vec<CategorySummary> = map
        .into_iter()
        .map(|(category, (count, total_risk, high_risk_count))| CategorySummary {
            category: category.to_string(),
            count,
            avg_risk: risk::round3(total_risk / count as f64),
            high_risk_count,
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.avg_risk
            .partial_cmp(&a.avg_risk)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.category.cmp(&b.category))
    });
    summaries
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(department: &str, risk: f64) -> PatientRecord {
        PatientRecord::new("p", department, risk)
    }

    #[test]
    fn groups_and_sorts_by_average_risk() {
        let records = vec![
            record("General", 0.2),
            record("ICU", 0.9),
            record("ICU", 0.7),
            record("General", 0.4),
            record("ER", 0.75),
        ];

        let summary = summarize_by_category(&records);
        let order: Vec<&str> = summary.iter().map(|s| s.category.as_str()).collect();
        assert_eq!(order, ["ICU", "ER", "General"]);

        assert_eq!(summary[0].count, 2);
        assert_eq!(summary[0].avg_risk, 0.8);
        assert_eq!(summary[0].high_risk_count, 2);
        assert_eq!(summary[2].count, 2);
        assert_eq!(summary[2].avg_risk, 0.3);
        assert_eq!(summary[2].high_risk_count, 0);
    }

    #[test]
    fn ties_break_by_category_name() {
        let records = vec![record("Oncology", 0.5), record("Cardiology", 0.5), record("ER", 0.5)];
        let summary = summarize_by_category(&records);
        let order: Vec<&str> = summary.iter().map(|s| s.category.as_str()).collect();
        assert_eq!(order, ["Cardiology", "ER", "Oncology"]);
    }

    #[test]
    fn counts_sum_to_input_size() {
        let records: Vec<PatientRecord> = (0..50)
            .map(|i| record(["ICU", "ER", "General"][i % 3], (i % 10) as f64 / 10.0))
            .collect();
        let summary = summarize_by_category(&records);
        assert_eq!(summary.iter().map(|s| s.count).sum::<usize>(), 50);
        assert_eq!(
            summary.iter().map(|s| s.high_risk_count).sum::<usize>(),
            records.iter().filter(|r| r.risk_score >= 0.7).count()
        );
    }

    #[test]
    fn empty_input_has_no_categories() {
        assert!(summarize_by_category(&Vec::<PatientRecord>::new()).is_empty());
    }
}
