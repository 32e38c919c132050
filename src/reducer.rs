//! Metric reduction
//!
//! Collapses irregularly-timed raw records for one metric into a single value
//! per calendar date. Dates are UTC days everywhere in the crate; use
//! [`calendar_date`] rather than truncating instants by hand.

use chrono::{DateTime, NaiveDate, Utc};
use std::collections::BTreeMap;

use crate::types::{DailyMetricMap, MetricKind, RawMetricRecord, ReductionMode};

/// Calendar date key of an instant (UTC day)
pub fn calendar_date(instant: &DateTime<Utc>) -> NaiveDate {
    instant.date_naive()
}

/// Reducer for per-metric daily values
pub struct MetricReducer;

impl MetricReducer {
    /// Reduce `records` into one value per date using `mode`.
    ///
    /// Records without a value are ignored entirely, so a date whose records
    /// all lack a value is left out of the result. `Last` depends on input
    /// order; callers pass records chronologically.
    pub fn reduce(records: &[RawMetricRecord], mode: ReductionMode) -> DailyMetricMap {
        let mut by_date: BTreeMap<NaiveDate, DayValues> = BTreeMap::new();

        for record in records {
            let Some(value) = record.value else {
                continue;
            };
            by_date
                .entry(calendar_date(&record.start_time))
                .or_default()
                .push(value);
        }

        by_date
            .into_iter()
            .filter_map(|(date, values)| values.reduce(mode).map(|v| (date, v)))
            .collect()
    }

    /// Reduce using the fixed mode of `kind`.
    ///
    /// Returns an empty map for sleep, which is handled by
    /// [`crate::sleep::SleepCalculator`].
    pub fn reduce_kind(kind: MetricKind, records: &[RawMetricRecord]) -> DailyMetricMap {
        match kind.reduction_mode() {
            Some(mode) => Self::reduce(records, mode),
            None => DailyMetricMap::new(),
        }
    }
}

/// Values collected for a single day
#[derive(Default)]
struct DayValues {
    sum: f64,
    count: usize,
    last: Option<f64>,
}

impl DayValues {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
        self.last = Some(value);
    }

    fn reduce(&self, mode: ReductionMode) -> Option<f64> {
        if self.count == 0 {
            return None;
        }
        match mode {
            ReductionMode::Sum => Some(self.sum),
            ReductionMode::Average => Some(self.sum / self.count as f64),
            ReductionMode::Last => self.last,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn at(ts: &str, value: f64) -> RawMetricRecord {
        RawMetricRecord::point(ts.parse().unwrap(), value)
    }

    fn empty_at(ts: &str) -> RawMetricRecord {
        RawMetricRecord {
            start_time: ts.parse().unwrap(),
            end_time: None,
            value: None,
        }
    }

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn sample_records() -> Vec<RawMetricRecord> {
        vec![
            at("2024-01-01T08:00:00Z", 1000.0),
            at("2024-01-01T12:30:00Z", 2500.0),
            at("2024-01-01T21:15:00Z", 500.0),
            at("2024-01-02T09:00:00Z", 4000.0),
        ]
    }

    #[test]
    fn test_sum_groups_by_date() {
        let result = MetricReducer::reduce(&sample_records(), ReductionMode::Sum);

        assert_eq!(result.len(), 2);
        assert_eq!(result[&date("2024-01-01")], 4000.0);
        assert_eq!(result[&date("2024-01-02")], 4000.0);
    }

    #[test]
    fn test_average_is_unweighted_mean() {
        let records = vec![
            at("2024-01-01T08:00:00Z", 60.0),
            at("2024-01-01T08:01:00Z", 70.0),
            at("2024-01-01T20:00:00Z", 95.0),
        ];

        let result = MetricReducer::reduce(&records, ReductionMode::Average);
        assert_eq!(result[&date("2024-01-01")], 75.0);
    }

    #[test]
    fn test_last_takes_final_record_of_day() {
        let records = vec![
            at("2024-01-01T07:00:00Z", 70.9),
            at("2024-01-01T19:00:00Z", 70.2),
            at("2024-01-02T07:00:00Z", 70.5),
        ];

        let result = MetricReducer::reduce(&records, ReductionMode::Last);
        assert_eq!(result[&date("2024-01-01")], 70.2);
        assert_eq!(result[&date("2024-01-02")], 70.5);
    }

    #[test]
    fn test_absent_values_are_not_zeros() {
        let records = vec![
            at("2024-01-01T08:00:00Z", 80.0),
            empty_at("2024-01-01T09:00:00Z"),
            at("2024-01-01T10:00:00Z", 60.0),
        ];

        let result = MetricReducer::reduce(&records, ReductionMode::Average);
        assert_eq!(result[&date("2024-01-01")], 70.0);
    }

    #[test]
    fn test_date_with_only_absent_values_is_omitted() {
        let records = vec![
            empty_at("2024-01-01T08:00:00Z"),
            at("2024-01-02T08:00:00Z", 10.0),
        ];

        let result = MetricReducer::reduce(&records, ReductionMode::Sum);
        assert!(!result.contains_key(&date("2024-01-01")));
        assert_eq!(result.len(), 1);
    }

    #[test]
    fn test_empty_input_yields_empty_map() {
        for mode in [ReductionMode::Sum, ReductionMode::Average, ReductionMode::Last] {
            assert!(MetricReducer::reduce(&[], mode).is_empty());
        }
    }

    #[test]
    fn test_grouping_uses_utc_day() {
        // 23:30 at UTC-05:00 is already the next UTC day
        let record = RawMetricRecord::point(
            DateTime::parse_from_rfc3339("2024-01-01T23:30:00-05:00")
                .unwrap()
                .with_timezone(&Utc),
            100.0,
        );

        let result = MetricReducer::reduce(&[record], ReductionMode::Sum);
        assert!(result.contains_key(&date("2024-01-02")));
    }

    #[test]
    fn test_reduce_kind_uses_fixed_modes() {
        let records = sample_records();

        let steps = MetricReducer::reduce_kind(MetricKind::Steps, &records);
        assert_eq!(steps[&date("2024-01-01")], 4000.0);

        let weight = MetricReducer::reduce_kind(MetricKind::Weight, &records);
        assert_eq!(weight[&date("2024-01-01")], 500.0);

        assert!(MetricReducer::reduce_kind(MetricKind::Sleep, &records).is_empty());
    }
}
