//! Aggregation pipeline
//!
//! This module provides the public aggregation API. It fetches the five raw
//! metric streams concurrently, reduces each into a daily map, and merges the
//! maps into unified daily records.

use tracing::{debug, info, warn};

use crate::error::{SourceError, SyncError};
use crate::merge::DailyMerger;
use crate::reducer::MetricReducer;
use crate::sleep::SleepCalculator;
use crate::source::HealthRecordSource;
use crate::types::{DailyMaps, DateRange, MetricKind, RawMetricRecord, UnifiedDailyRecord};

/// Raw records for every metric kind of one aggregation run
#[derive(Debug, Clone, Default)]
pub struct RawRecordSet {
    pub steps: Vec<RawMetricRecord>,
    pub heart_rate: Vec<RawMetricRecord>,
    pub calories: Vec<RawMetricRecord>,
    pub sleep: Vec<RawMetricRecord>,
    pub weight: Vec<RawMetricRecord>,
}

impl RawRecordSet {
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
            && self.heart_rate.is_empty()
            && self.calories.is_empty()
            && self.sleep.is_empty()
            && self.weight.is_empty()
    }

    pub fn get_mut(&mut self, kind: MetricKind) -> &mut Vec<RawMetricRecord> {
        match kind {
            MetricKind::Steps => &mut self.steps,
            MetricKind::HeartRate => &mut self.heart_rate,
            MetricKind::Calories => &mut self.calories,
            MetricKind::Sleep => &mut self.sleep,
            MetricKind::Weight => &mut self.weight,
        }
    }
}

/// Reduce and merge an in-memory record set into daily records.
///
/// Pipeline stages:
/// 1. Sort each stream by start time so last-value reduction is stable
/// 2. MetricReducer - per-metric daily values
/// 3. SleepCalculator - per-night minutes
/// 4. DailyMerger - unified records, newest first
pub fn aggregate_records(mut raw: RawRecordSet) -> Vec<UnifiedDailyRecord> {
    for kind in MetricKind::ALL {
        raw.get_mut(kind).sort_by_key(|r| r.start_time);
    }

    let maps = DailyMaps {
        steps: MetricReducer::reduce_kind(MetricKind::Steps, &raw.steps),
        heart_rate: MetricReducer::reduce_kind(MetricKind::HeartRate, &raw.heart_rate),
        calories: MetricReducer::reduce_kind(MetricKind::Calories, &raw.calories),
        sleep_minutes: SleepCalculator::minutes_by_date(&raw.sleep),
        weight: MetricReducer::reduce_kind(MetricKind::Weight, &raw.weight),
    };

    DailyMerger::merge(&maps)
}

/// Aggregates records from a raw record source
pub struct Aggregator<S> {
    source: S,
}

impl<S: HealthRecordSource> Aggregator<S> {
    pub fn new(source: S) -> Self {
        Self { source }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    /// Make sure the source exists and grants read access to every metric.
    ///
    /// Unlike reads, permission failures are surfaced to the caller.
    pub async fn authorize(&self) -> Result<Vec<MetricKind>, SyncError> {
        if !self.source.is_available().await {
            return Err(SourceError::Unavailable.into());
        }

        let granted = self.source.request_permissions(&MetricKind::ALL).await?;
        if granted.is_empty() {
            return Err(SourceError::PermissionDenied.into());
        }

        info!(granted = granted.len(), "health record permissions granted");
        Ok(granted)
    }

    /// Fetch every metric for `range` and aggregate into daily records.
    ///
    /// A metric whose read fails is treated as having no records; the
    /// returned list is sorted newest first and may be empty.
    pub async fn aggregate(&self, range: &DateRange) -> Vec<UnifiedDailyRecord> {
        let raw = self.fetch_all(range).await;

        if raw.is_empty() {
            info!(start = %range.start, end = %range.end, "no health records in range");
            return Vec::new();
        }

        let records = aggregate_records(raw);
        info!(days = records.len(), "aggregated daily records");
        records
    }

    /// Fetch the five metric streams concurrently
    pub async fn fetch_all(&self, range: &DateRange) -> RawRecordSet {
        let (steps, heart_rate, calories, sleep, weight) = tokio::join!(
            self.fetch_or_empty(MetricKind::Steps, range),
            self.fetch_or_empty(MetricKind::HeartRate, range),
            self.fetch_or_empty(MetricKind::Calories, range),
            self.fetch_or_empty(MetricKind::Sleep, range),
            self.fetch_or_empty(MetricKind::Weight, range),
        );

        RawRecordSet {
            steps,
            heart_rate,
            calories,
            sleep,
            weight,
        }
    }

    async fn fetch_or_empty(&self, kind: MetricKind, range: &DateRange) -> Vec<RawMetricRecord> {
        match self.source.read_records(kind, range).await {
            Ok(records) => {
                debug!(metric = kind.as_str(), count = records.len(), "fetched raw records");
                records
            }
            Err(e) => {
                warn!(
                    metric = kind.as_str(),
                    error = %e,
                    "metric source failed, treating as empty"
                );
                Vec::new()
            }
        }
    }
}
