//! In-memory record source

use async_trait::async_trait;
use std::collections::HashMap;

use super::HealthRecordSource;
use crate::error::SourceError;
use crate::types::{DateRange, MetricKind, RawMetricRecord};

/// Record source backed by per-kind vectors held in memory
#[derive(Debug, Clone)]
pub struct InMemorySource {
    records: HashMap<MetricKind, Vec<RawMetricRecord>>,
    available: bool,
}

impl Default for InMemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySource {
    pub fn new() -> Self {
        Self {
            records: HashMap::new(),
            available: true,
        }
    }

    /// A source that reports the store as missing and refuses every read
    pub fn unavailable() -> Self {
        Self {
            records: HashMap::new(),
            available: false,
        }
    }

    pub fn with_records(mut self, kind: MetricKind, records: Vec<RawMetricRecord>) -> Self {
        self.records.entry(kind).or_default().extend(records);
        self
    }

    pub fn push(&mut self, kind: MetricKind, record: RawMetricRecord) {
        self.records.entry(kind).or_default().push(record);
    }
}

#[async_trait]
impl HealthRecordSource for InMemorySource {
    async fn is_available(&self) -> bool {
        self.available
    }

    async fn read_records(
        &self,
        kind: MetricKind,
        range: &DateRange,
    ) -> Result<Vec<RawMetricRecord>, SourceError> {
        if !self.available {
            return Err(SourceError::Unavailable);
        }
        Ok(self
            .records
            .get(&kind)
            .map(|records| {
                records
                    .iter()
                    .filter(|r| range.contains(&r.start_time))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
