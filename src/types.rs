//! Core types for the Health Sync engine
//!
//! This module defines the data structures that flow through aggregation:
//! raw metric records, per-metric daily maps, and unified daily records.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

use crate::error::SyncError;

/// The five health metrics tracked by the engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    Steps,
    HeartRate,
    Calories,
    Sleep,
    Weight,
}

impl MetricKind {
    /// Every metric kind, in fetch order
    pub const ALL: [MetricKind; 5] = [
        MetricKind::Steps,
        MetricKind::HeartRate,
        MetricKind::Calories,
        MetricKind::Sleep,
        MetricKind::Weight,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Steps => "steps",
            MetricKind::HeartRate => "heart_rate",
            MetricKind::Calories => "calories",
            MetricKind::Sleep => "sleep",
            MetricKind::Weight => "weight",
        }
    }

    /// Record type name used by the device health store
    pub fn record_type(&self) -> &'static str {
        match self {
            MetricKind::Steps => "Steps",
            MetricKind::HeartRate => "HeartRate",
            MetricKind::Calories => "TotalCaloriesBurned",
            MetricKind::Sleep => "SleepSession",
            MetricKind::Weight => "Weight",
        }
    }

    /// Fixed reduction mode for this metric.
    ///
    /// Sleep has no point values to reduce; its sessions go through the
    /// sleep duration calculator instead.
    pub fn reduction_mode(&self) -> Option<ReductionMode> {
        match self {
            MetricKind::Steps => Some(ReductionMode::Sum),
            MetricKind::HeartRate => Some(ReductionMode::Average),
            MetricKind::Calories => Some(ReductionMode::Sum),
            MetricKind::Sleep => None,
            MetricKind::Weight => Some(ReductionMode::Last),
        }
    }
}

/// Strategy used to collapse same-day values into one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReductionMode {
    /// Arithmetic sum of all values for the day
    Sum,
    /// Unweighted arithmetic mean of all values for the day
    Average,
    /// Value of the last record seen for the day, in input order
    Last,
}

/// One observation from the raw record source, normalized across metric kinds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMetricRecord {
    /// Observation (or session) start time (UTC)
    pub start_time: DateTime<Utc>,
    /// Session end time (UTC), sleep only
    pub end_time: Option<DateTime<Utc>>,
    /// Metric payload: step count, bpm, kcal or kg
    pub value: Option<f64>,
}

impl RawMetricRecord {
    /// A point observation carrying a value
    pub fn point(start_time: DateTime<Utc>, value: f64) -> Self {
        Self {
            start_time,
            end_time: None,
            value: Some(value),
        }
    }

    /// A session spanning `start_time..end_time` with no value
    pub fn session(start_time: DateTime<Utc>, end_time: DateTime<Utc>) -> Self {
        Self {
            start_time,
            end_time: Some(end_time),
            value: None,
        }
    }
}

/// Calendar date to reduced value for one metric
pub type DailyMetricMap = BTreeMap<NaiveDate, f64>;

/// Calendar date to whole sleep minutes
pub type DailySleepMap = BTreeMap<NaiveDate, i64>;

/// Per-metric daily maps produced by one aggregation run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyMaps {
    pub steps: DailyMetricMap,
    pub heart_rate: DailyMetricMap,
    pub calories: DailyMetricMap,
    pub sleep_minutes: DailySleepMap,
    pub weight: DailyMetricMap,
}

impl DailyMaps {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
            && self.heart_rate.is_empty()
            && self.calories.is_empty()
            && self.sleep_minutes.is_empty()
            && self.weight.is_empty()
    }
}

/// Merged per-date record combining all tracked metrics plus sync metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnifiedDailyRecord {
    /// Calendar date this record covers (YYYY-MM-DD)
    pub record_date: NaiveDate,
    /// Total steps
    #[serde(default, deserialize_with = "whole_number")]
    pub steps: Option<i64>,
    /// Average heart rate (bpm)
    #[serde(default, deserialize_with = "whole_number")]
    pub heart_rate: Option<i64>,
    /// Total calories burned (kcal)
    #[serde(default, deserialize_with = "whole_number")]
    pub calories: Option<i64>,
    /// Total sleep (minutes)
    #[serde(default, deserialize_with = "whole_number")]
    pub sleep_minutes: Option<i64>,
    /// Last weight reading of the day (kg)
    #[serde(default)]
    pub weight_kg: Option<f64>,
    /// Owner of the record, attached by the caller before publishing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Set by the remote service once the record reached Notion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_to_notion: Option<bool>,
    /// When the remote service synced the record
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub synced_at: Option<DateTime<Utc>>,
}

impl UnifiedDailyRecord {
    /// An empty record for `date` with every metric absent
    pub fn new(record_date: NaiveDate) -> Self {
        Self {
            record_date,
            steps: None,
            heart_rate: None,
            calories: None,
            sleep_minutes: None,
            weight_kg: None,
            user_id: None,
            synced_to_notion: None,
            synced_at: None,
        }
    }

    /// Attach the owning user id
    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn is_user_scoped(&self) -> bool {
        self.user_id.as_deref().is_some_and(|id| !id.trim().is_empty())
    }

    pub fn is_synced(&self) -> bool {
        self.synced_to_notion == Some(true)
    }

    /// Whether at least one metric carries data
    pub fn has_metrics(&self) -> bool {
        self.steps.is_some()
            || self.heart_rate.is_some()
            || self.calories.is_some()
            || self.sleep_minutes.is_some()
            || self.weight_kg.is_some()
    }
}

/// Round to the nearest integer, halves away from zero
pub fn round_whole(value: f64) -> i64 {
    value.round() as i64
}

/// Integer metric that may arrive as a fractional number, e.g. calories
/// entered by hand on the server side
fn whole_number<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Number {
        Whole(i64),
        Fractional(f64),
    }

    Ok(Option::<Number>::deserialize(deserializer)?.map(|n| match n {
        Number::Whole(v) => v,
        Number::Fractional(v) => round_whole(v),
    }))
}

/// Attach `user_id` to every record of an aggregated batch
pub fn assign_user(records: Vec<UnifiedDailyRecord>, user_id: &str) -> Vec<UnifiedDailyRecord> {
    let user_id = user_id.trim();
    records
        .into_iter()
        .map(|record| record.with_user(user_id))
        .collect()
}

/// Inclusive range of instants used to query the raw record source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, SyncError> {
        if start > end {
            return Err(SyncError::InvalidDateRange {
                start: start.to_rfc3339(),
                end: end.to_rfc3339(),
            });
        }
        Ok(Self { start, end })
    }

    /// Cover whole UTC days from the start of `start` to the end of `end`
    pub fn from_dates(start: NaiveDate, end: NaiveDate) -> Result<Self, SyncError> {
        if start > end {
            return Err(SyncError::InvalidDateRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        let day_end = NaiveTime::from_hms_milli_opt(23, 59, 59, 999).unwrap_or(NaiveTime::MIN);
        Ok(Self {
            start: Utc.from_utc_datetime(&start.and_time(NaiveTime::MIN)),
            end: Utc.from_utc_datetime(&end.and_time(day_end)),
        })
    }

    pub fn contains(&self, instant: &DateTime<Utc>) -> bool {
        *instant >= self.start && *instant <= self.end
    }
}

/// Parse a `YYYY-MM-DD` calendar date
pub fn parse_date(value: &str) -> Result<NaiveDate, SyncError> {
    NaiveDate::parse_from_str(value.trim(), "%Y-%m-%d")
        .map_err(|e| SyncError::DateParseError(format!("{value}: {e}")))
}
