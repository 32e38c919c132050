//! Health Sync - daily aggregation and sync engine for on-device health records
//!
//! Health Sync turns raw timestamped health observations into one record per
//! calendar day and pushes those records to a remote store:
//! source read → per-metric reduction → sleep attribution → merge → publish.
//!
//! ## Modules
//!
//! - **Aggregation**: [`pipeline::Aggregator`] fetches steps, heart rate,
//!   calories, sleep and weight concurrently and merges them into
//!   [`UnifiedDailyRecord`]s, newest first
//! - **Availability**: [`availability::AvailabilityProber`] classifies the
//!   remote service as online, starting, offline or error
//! - **Publishing**: [`publisher::BatchPublisher`] submits records one by one
//!   and reports per-record outcomes

pub mod api;
pub mod availability;
pub mod config;
pub mod error;
pub mod logging;
pub mod merge;
pub mod pipeline;
pub mod publisher;
pub mod reducer;
pub mod sleep;
pub mod source;
pub mod types;

pub use api::{HealthApi, HttpHealthApi, SyncReceipt};
pub use availability::{
    AvailabilityProber, AvailabilityStatus, AvailabilityStore, ServiceAvailability,
};
pub use config::{ProbePolicy, SyncConfig};
pub use error::{ApiError, SourceError, SyncError};
pub use pipeline::{aggregate_records, Aggregator, RawRecordSet};
pub use publisher::{BatchPublisher, BatchReport, PublishStatus, RecordOutcome};
pub use source::{HealthConnectExport, HealthRecordSource, InMemorySource};
pub use types::{DateRange, MetricKind, RawMetricRecord, UnifiedDailyRecord};

/// Crate version reported by the CLI and in logs
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name reported by the CLI
pub const PRODUCER_NAME: &str = "health-sync";
