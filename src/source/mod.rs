//! Raw health record sources
//!
//! This module defines the boundary to the device health store. Sources hand
//! back normalized [`RawMetricRecord`]s for one metric kind at a time.

mod health_connect;
mod memory;

pub use health_connect::{ExportIssue, ExportReport, HealthConnectExport};
pub use memory::InMemorySource;

use async_trait::async_trait;

use crate::error::SourceError;
use crate::types::{DateRange, MetricKind, RawMetricRecord};

/// Trait for raw health record sources
#[async_trait]
pub trait HealthRecordSource: Send + Sync {
    /// Whether the underlying store can be used on this device
    async fn is_available(&self) -> bool {
        true
    }

    /// Ask for read access to `kinds`, returning the kinds granted.
    ///
    /// Failures here are real errors and propagate to the caller.
    async fn request_permissions(
        &self,
        kinds: &[MetricKind],
    ) -> Result<Vec<MetricKind>, SourceError> {
        Ok(kinds.to_vec())
    }

    /// Read raw records of `kind` whose start lies within `range`
    async fn read_records(
        &self,
        kind: MetricKind,
        range: &DateRange,
    ) -> Result<Vec<RawMetricRecord>, SourceError>;
}
