//! Health Connect export source
//!
//! Reads a JSON export of the device health store, keyed by record type
//! (`Steps`, `HeartRate`, `TotalCaloriesBurned`, `SleepSession`, `Weight`),
//! and maps each record type onto [`RawMetricRecord`].
//!
//! A heart-rate record with `samples` yields one raw record per sample and
//! its top-level `beatsPerMinute` is not used. Without samples the record
//! itself becomes a single raw record.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use super::HealthRecordSource;
use crate::error::SourceError;
use crate::types::{DateRange, MetricKind, RawMetricRecord};

const KG_PER_POUND: f64 = 0.453_592_37;

/// Health Connect export loaded in memory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HealthConnectExport {
    #[serde(rename = "Steps", default)]
    steps: Vec<StepsRecord>,
    #[serde(rename = "HeartRate", default)]
    heart_rate: Vec<HeartRateRecord>,
    #[serde(rename = "TotalCaloriesBurned", default)]
    calories: Vec<CaloriesRecord>,
    #[serde(rename = "SleepSession", default)]
    sleep: Vec<SleepSessionRecord>,
    #[serde(rename = "Weight", default)]
    weight: Vec<WeightRecord>,
}

impl HealthConnectExport {
    /// Parse an export from a JSON string
    pub fn from_json(json: &str) -> Result<Self, SourceError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Load an export from a file
    pub fn from_path(path: &Path) -> Result<Self, SourceError> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Number of source records of `kind` (heart-rate records, not samples)
    pub fn record_count(&self, kind: MetricKind) -> usize {
        match kind {
            MetricKind::Steps => self.steps.len(),
            MetricKind::HeartRate => self.heart_rate.len(),
            MetricKind::Calories => self.calories.len(),
            MetricKind::Sleep => self.sleep.len(),
            MetricKind::Weight => self.weight.len(),
        }
    }

    pub fn total_records(&self) -> usize {
        MetricKind::ALL.iter().map(|k| self.record_count(*k)).sum()
    }

    /// Normalize every record of `kind`, in export order
    pub fn raw_records(&self, kind: MetricKind) -> Vec<RawMetricRecord> {
        match kind {
            MetricKind::Steps => self
                .steps
                .iter()
                .map(|r| RawMetricRecord {
                    start_time: r.start_time,
                    end_time: None,
                    value: r.count,
                })
                .collect(),
            MetricKind::HeartRate => self.heart_rate.iter().flat_map(heart_rate_records).collect(),
            MetricKind::Calories => self
                .calories
                .iter()
                .map(|r| RawMetricRecord {
                    start_time: r.start_time,
                    end_time: None,
                    value: r.energy.as_ref().and_then(Energy::kilocalories),
                })
                .collect(),
            MetricKind::Sleep => self
                .sleep
                .iter()
                .map(|r| RawMetricRecord {
                    start_time: r.start_time,
                    end_time: r.end_time,
                    value: None,
                })
                .collect(),
            MetricKind::Weight => self
                .weight
                .iter()
                .map(|r| RawMetricRecord {
                    start_time: r.time,
                    end_time: None,
                    value: r.weight.as_ref().and_then(Mass::kilograms),
                })
                .collect(),
        }
    }

    /// Check every record and report counts plus anything the aggregation
    /// will ignore
    pub fn validate(&self) -> ExportReport {
        let mut report = ExportReport::default();

        for kind in MetricKind::ALL {
            report.counts.insert(kind, self.record_count(kind));
        }

        for (index, r) in self.steps.iter().enumerate() {
            if r.count.is_none() {
                report.push(MetricKind::Steps, index, "missing count");
            }
        }
        for (index, r) in self.heart_rate.iter().enumerate() {
            if r.samples.is_empty() {
                if r.beats_per_minute.is_none() {
                    report.push(MetricKind::HeartRate, index, "missing beatsPerMinute and samples");
                }
                continue;
            }
            if r.beats_per_minute.is_some() {
                report.push(
                    MetricKind::HeartRate,
                    index,
                    "beatsPerMinute ignored because samples are present",
                );
            }
            for (sample, s) in r.samples.iter().enumerate() {
                if s.beats_per_minute.is_none() {
                    report.push(
                        MetricKind::HeartRate,
                        index,
                        format!("sample {sample} missing beatsPerMinute"),
                    );
                }
            }
        }
        for (index, r) in self.calories.iter().enumerate() {
            if r.energy.as_ref().and_then(Energy::kilocalories).is_none() {
                report.push(MetricKind::Calories, index, "missing or unreadable energy");
            }
        }
        for (index, r) in self.sleep.iter().enumerate() {
            match r.end_time {
                None => report.push(MetricKind::Sleep, index, "missing endTime"),
                Some(end) if end < r.start_time => {
                    report.push(MetricKind::Sleep, index, "endTime is before startTime")
                }
                Some(_) => {}
            }
        }
        for (index, r) in self.weight.iter().enumerate() {
            if r.weight.as_ref().and_then(Mass::kilograms).is_none() {
                report.push(MetricKind::Weight, index, "missing or unreadable weight");
            }
        }

        report
    }
}

#[async_trait]
impl HealthRecordSource for HealthConnectExport {
    async fn read_records(
        &self,
        kind: MetricKind,
        range: &DateRange,
    ) -> Result<Vec<RawMetricRecord>, SourceError> {
        Ok(self
            .raw_records(kind)
            .into_iter()
            .filter(|r| range.contains(&r.start_time))
            .collect())
    }
}

fn heart_rate_records(record: &HeartRateRecord) -> Vec<RawMetricRecord> {
    if record.samples.is_empty() {
        return vec![RawMetricRecord {
            start_time: record.start_time,
            end_time: None,
            value: record.beats_per_minute,
        }];
    }
    record
        .samples
        .iter()
        .map(|s| RawMetricRecord {
            start_time: s.time,
            end_time: None,
            value: s.beats_per_minute,
        })
        .collect()
}

/// Validation summary for an export
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportReport {
    /// Source records per metric kind
    pub counts: BTreeMap<MetricKind, usize>,
    /// Records the aggregation will skip or ignore
    pub issues: Vec<ExportIssue>,
}

impl ExportReport {
    fn push(&mut self, kind: MetricKind, index: usize, message: impl Into<String>) {
        self.issues.push(ExportIssue {
            kind,
            index,
            message: message.into(),
        });
    }

    pub fn total_records(&self) -> usize {
        self.counts.values().sum()
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }
}

/// One problem found in an export
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExportIssue {
    pub kind: MetricKind,
    pub index: usize,
    pub message: String,
}

// Health Connect record structures

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct StepsRecord {
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    count: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartRateRecord {
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    beats_per_minute: Option<f64>,
    #[serde(default)]
    samples: Vec<HeartRateSample>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct HeartRateSample {
    time: DateTime<Utc>,
    beats_per_minute: Option<f64>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct CaloriesRecord {
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
    energy: Option<Energy>,
}

/// Energy is either a bare kilocalorie number or a unit object
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(untagged)]
enum Energy {
    Kilocalories(f64),
    Measured(EnergyMeasure),
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct EnergyMeasure {
    in_kilocalories: Option<f64>,
    in_calories: Option<f64>,
}

impl Energy {
    fn kilocalories(&self) -> Option<f64> {
        match self {
            Energy::Kilocalories(kcal) => Some(*kcal),
            Energy::Measured(m) => m.in_kilocalories.or(m.in_calories.map(|c| c / 1000.0)),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct SleepSessionRecord {
    start_time: DateTime<Utc>,
    end_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct WeightRecord {
    #[serde(alias = "startTime")]
    time: DateTime<Utc>,
    weight: Option<Mass>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct Mass {
    in_kilograms: Option<f64>,
    in_pounds: Option<f64>,
}

impl Mass {
    fn kilograms(&self) -> Option<f64> {
        self.in_kilograms
            .or(self.in_pounds.map(|lbs| lbs * KG_PER_POUND))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample_export_json() -> &'static str {
        r#"{
            "Steps": [
                { "startTime": "2024-01-15T08:00:00Z", "endTime": "2024-01-15T09:00:00Z", "count": 3200 },
                { "startTime": "2024-01-15T17:00:00Z", "endTime": "2024-01-15T18:00:00Z", "count": 5300 }
            ],
            "HeartRate": [
                {
                    "startTime": "2024-01-15T08:00:00Z",
                    "endTime": "2024-01-15T08:10:00Z",
                    "samples": [
                        { "time": "2024-01-15T08:00:00Z", "beatsPerMinute": 70 },
                        { "time": "2024-01-15T08:05:00Z", "beatsPerMinute": 80 }
                    ]
                },
                { "startTime": "2024-01-16T08:00:00Z", "endTime": "2024-01-16T08:01:00Z", "beatsPerMinute": 64 }
            ],
            "TotalCaloriesBurned": [
                { "startTime": "2024-01-15T00:00:00Z", "endTime": "2024-01-15T12:00:00Z", "energy": { "inKilocalories": 1100.4 } },
                { "startTime": "2024-01-15T12:00:00Z", "endTime": "2024-01-16T00:00:00Z", "energy": 1099.8 }
            ],
            "SleepSession": [
                { "startTime": "2024-01-15T23:30:00Z", "endTime": "2024-01-16T06:00:00Z" }
            ],
            "Weight": [
                { "time": "2024-01-16T07:00:00Z", "weight": { "inKilograms": 70.5 } }
            ]
        }"#
    }

    fn range() -> DateRange {
        DateRange::from_dates(
            NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_parse_export() {
        let export = HealthConnectExport::from_json(sample_export_json()).unwrap();

        assert_eq!(export.record_count(MetricKind::Steps), 2);
        assert_eq!(export.record_count(MetricKind::HeartRate), 2);
        assert_eq!(export.total_records(), 8);
    }

    #[test]
    fn test_heart_rate_samples_become_records() {
        let export = HealthConnectExport::from_json(sample_export_json()).unwrap();
        let records = export.raw_records(MetricKind::HeartRate);

        let values: Vec<Option<f64>> = records.iter().map(|r| r.value).collect();
        assert_eq!(values, vec![Some(70.0), Some(80.0), Some(64.0)]);
    }

    #[test]
    fn test_energy_accepts_number_or_object() {
        let export = HealthConnectExport::from_json(sample_export_json()).unwrap();
        let values: Vec<Option<f64>> = export
            .raw_records(MetricKind::Calories)
            .iter()
            .map(|r| r.value)
            .collect();

        assert_eq!(values, vec![Some(1100.4), Some(1099.8)]);
    }

    #[test]
    fn test_weight_uses_time_and_pounds_fallback() {
        let json = r#"{
            "Weight": [
                { "time": "2024-01-01T07:00:00Z", "weight": { "inPounds": 100 } },
                { "startTime": "2024-01-02T07:00:00Z", "weight": { "inKilograms": 70.2 } }
            ]
        }"#;
        let export = HealthConnectExport::from_json(json).unwrap();
        let records = export.raw_records(MetricKind::Weight);

        assert!((records[0].value.unwrap() - 45.359237).abs() < 1e-9);
        assert_eq!(records[1].value, Some(70.2));
        assert_eq!(records[1].start_time.to_rfc3339(), "2024-01-02T07:00:00+00:00");
    }

    #[test]
    fn test_missing_record_types_read_empty() {
        let export = HealthConnectExport::from_json("{}").unwrap();
        for kind in MetricKind::ALL {
            assert!(export.raw_records(kind).is_empty());
        }
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(
            HealthConnectExport::from_json("not json"),
            Err(SourceError::Json(_))
        ));
    }

    #[test]
    fn test_validate_flags_ignored_records() {
        let json = r#"{
            "Steps": [{ "startTime": "2024-01-01T08:00:00Z" }],
            "SleepSession": [
                { "startTime": "2024-01-02T06:00:00Z", "endTime": "2024-01-01T23:00:00Z" },
                { "startTime": "2024-01-03T23:00:00Z" }
            ]
        }"#;
        let report = HealthConnectExport::from_json(json).unwrap().validate();

        assert_eq!(report.total_records(), 3);
        assert!(!report.is_clean());
        let messages: Vec<&str> = report.issues.iter().map(|i| i.message.as_str()).collect();
        assert_eq!(
            messages,
            vec!["missing count", "endTime is before startTime", "missing endTime"]
        );
    }

    #[test]
    fn test_validate_flags_heart_rate_samples() {
        let json = r#"{
            "HeartRate": [
                {
                    "startTime": "2024-01-01T08:00:00Z",
                    "beatsPerMinute": 66,
                    "samples": [
                        { "time": "2024-01-01T08:00:00Z", "beatsPerMinute": 70 },
                        { "time": "2024-01-01T08:05:00Z" }
                    ]
                },
                { "startTime": "2024-01-02T08:00:00Z" }
            ]
        }"#;
        let export = HealthConnectExport::from_json(json).unwrap();
        let report = export.validate();

        let issues: Vec<(usize, &str)> = report
            .issues
            .iter()
            .map(|i| (i.index, i.message.as_str()))
            .collect();
        assert_eq!(
            issues,
            vec![
                (0, "beatsPerMinute ignored because samples are present"),
                (0, "sample 1 missing beatsPerMinute"),
                (1, "missing beatsPerMinute and samples"),
            ]
        );

        // Samples win over the top-level value
        let values: Vec<Option<f64>> = export
            .raw_records(MetricKind::HeartRate)
            .iter()
            .map(|r| r.value)
            .collect();
        assert_eq!(values, vec![Some(70.0), None, None]);
    }

    #[test]
    fn test_sample_export_is_clean() {
        let report = HealthConnectExport::from_json(sample_export_json())
            .unwrap()
            .validate();
        assert!(report.is_clean());
    }

    #[tokio::test]
    async fn test_read_records_filters_range() {
        let export = HealthConnectExport::from_json(sample_export_json()).unwrap();
        let narrow = DateRange::from_dates(
            NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 16).unwrap(),
        )
        .unwrap();

        let all = export.read_records(MetricKind::HeartRate, &range()).await.unwrap();
        let narrowed = export.read_records(MetricKind::HeartRate, &narrow).await.unwrap();

        assert_eq!(all.len(), 3);
        assert_eq!(narrowed.len(), 1);
    }
}
