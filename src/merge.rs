//! Daily merge
//!
//! Unions the per-metric daily maps into one [`UnifiedDailyRecord`] per date,
//! newest first.

use chrono::NaiveDate;
use std::collections::BTreeSet;

use crate::types::{round_whole, DailyMaps, UnifiedDailyRecord};

/// Merger for per-metric daily maps
pub struct DailyMerger;

impl DailyMerger {
    /// Merge `maps` into records sorted by date, most recent first.
    ///
    /// Steps, heart rate and calories are rounded to whole numbers; weight
    /// keeps its source precision. A metric missing for a date stays `None`.
    pub fn merge(maps: &DailyMaps) -> Vec<UnifiedDailyRecord> {
        let dates: BTreeSet<NaiveDate> = maps
            .steps
            .keys()
            .chain(maps.heart_rate.keys())
            .chain(maps.calories.keys())
            .chain(maps.sleep_minutes.keys())
            .chain(maps.weight.keys())
            .copied()
            .collect();

        dates
            .into_iter()
            .rev()
            .map(|date| UnifiedDailyRecord {
                steps: maps.steps.get(&date).map(|v| round_whole(*v)),
                heart_rate: maps.heart_rate.get(&date).map(|v| round_whole(*v)),
                calories: maps.calories.get(&date).map(|v| round_whole(*v)),
                sleep_minutes: maps.sleep_minutes.get(&date).copied(),
                weight_kg: maps.weight.get(&date).copied(),
                ..UnifiedDailyRecord::new(date)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_weight_only_input() {
        let mut maps = DailyMaps::default();
        maps.weight.insert(date("2024-01-01"), 70.2);
        maps.weight.insert(date("2024-01-02"), 70.5);

        let records = DailyMerger::merge(&maps);

        let mut newest = UnifiedDailyRecord::new(date("2024-01-02"));
        newest.weight_kg = Some(70.5);
        let mut oldest = UnifiedDailyRecord::new(date("2024-01-01"));
        oldest.weight_kg = Some(70.2);

        assert_eq!(records, vec![newest, oldest]);
    }

    #[test]
    fn test_dates_are_union_sorted_descending() {
        let mut maps = DailyMaps::default();
        maps.steps.insert(date("2024-01-03"), 100.0);
        maps.steps.insert(date("2024-01-01"), 100.0);
        maps.heart_rate.insert(date("2024-01-01"), 72.0);
        maps.calories.insert(date("2024-01-05"), 2100.0);
        maps.sleep_minutes.insert(date("2024-01-02"), 420);
        maps.weight.insert(date("2024-01-03"), 68.0);

        let dates: Vec<NaiveDate> = DailyMerger::merge(&maps)
            .into_iter()
            .map(|r| r.record_date)
            .collect();

        assert_eq!(
            dates,
            vec![
                date("2024-01-05"),
                date("2024-01-03"),
                date("2024-01-02"),
                date("2024-01-01"),
            ]
        );
    }

    #[test]
    fn test_rounding_per_metric() {
        let mut maps = DailyMaps::default();
        let day = date("2024-01-01");
        maps.steps.insert(day, 8499.5);
        maps.heart_rate.insert(day, 71.4);
        maps.calories.insert(day, 2199.6);
        maps.weight.insert(day, 70.25);

        let record = &DailyMerger::merge(&maps)[0];
        assert_eq!(record.steps, Some(8500));
        assert_eq!(record.heart_rate, Some(71));
        assert_eq!(record.calories, Some(2200));
        assert_eq!(record.weight_kg, Some(70.25));
        assert_eq!(record.sleep_minutes, None);
    }

    #[test]
    fn test_zero_values_are_kept() {
        let mut maps = DailyMaps::default();
        maps.steps.insert(date("2024-01-01"), 0.0);
        maps.sleep_minutes.insert(date("2024-01-01"), 0);

        let record = &DailyMerger::merge(&maps)[0];
        assert_eq!(record.steps, Some(0));
        assert_eq!(record.sleep_minutes, Some(0));
        assert_eq!(record.heart_rate, None);
    }

    #[test]
    fn test_empty_maps_give_empty_list() {
        assert!(DailyMerger::merge(&DailyMaps::default()).is_empty());
    }

    #[test]
    fn test_merged_records_are_not_user_scoped() {
        let mut maps = DailyMaps::default();
        maps.steps.insert(date("2024-01-01"), 10.0);

        let record = &DailyMerger::merge(&maps)[0];
        assert!(!record.is_user_scoped());
        assert!(!record.is_synced());
    }
}
