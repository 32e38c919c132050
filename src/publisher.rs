//! Batch publishing of daily records
//!
//! Records are submitted one at a time. A failed submission is logged and
//! recorded in the [`BatchReport`]; it never stops the rest of the batch.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::api::HealthApi;
use crate::error::ApiError;
use crate::types::UnifiedDailyRecord;

/// Result of submitting one record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PublishStatus {
    Synced {
        #[serde(rename = "syncedAt", skip_serializing_if = "Option::is_none")]
        synced_at: Option<DateTime<Utc>>,
    },
    Failed {
        error: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub record_date: NaiveDate,
    #[serde(flatten)]
    pub status: PublishStatus,
}

impl RecordOutcome {
    pub fn is_synced(&self) -> bool {
        matches!(self.status, PublishStatus::Synced { .. })
    }
}

/// Per-record outcomes of one publish call, in input order
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchReport {
    pub batch_id: Uuid,
    pub outcomes: Vec<RecordOutcome>,
}

impl BatchReport {
    pub fn success_count(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_synced()).count()
    }

    pub fn total_count(&self) -> usize {
        self.outcomes.len()
    }

    /// `(success_count, total_count)`
    pub fn counts(&self) -> (usize, usize) {
        (self.success_count(), self.total_count())
    }

    pub fn failure_count(&self) -> usize {
        self.total_count() - self.success_count()
    }

    pub fn is_complete(&self) -> bool {
        self.failure_count() == 0
    }

    pub fn failed_dates(&self) -> Vec<NaiveDate> {
        self.outcomes
            .iter()
            .filter(|o| !o.is_synced())
            .map(|o| o.record_date)
            .collect()
    }

    /// The records of `records` that failed in this batch, for a later retry.
    ///
    /// `records` must be the slice that was published.
    pub fn retry_candidates(&self, records: &[UnifiedDailyRecord]) -> Vec<UnifiedDailyRecord> {
        records
            .iter()
            .zip(&self.outcomes)
            .filter(|(_, outcome)| !outcome.is_synced())
            .map(|(record, _)| record.clone())
            .collect()
    }

    /// Mark the successfully published records as synced
    pub fn apply_to(&self, records: &mut [UnifiedDailyRecord]) {
        let now = Utc::now();
        for (record, outcome) in records.iter_mut().zip(&self.outcomes) {
            if let PublishStatus::Synced { synced_at } = &outcome.status {
                record.synced_to_notion = Some(true);
                record.synced_at = Some(synced_at.unwrap_or(now));
            }
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "Successfully synced {}/{} records",
            self.success_count(),
            self.total_count()
        )
    }
}

/// Publishes daily records through a [`HealthApi`]
pub struct BatchPublisher<A: ?Sized> {
    api: Arc<A>,
}

impl<A: HealthApi + ?Sized> BatchPublisher<A> {
    pub fn new(api: Arc<A>) -> Self {
        Self { api }
    }

    /// Submit every record sequentially and report each outcome
    pub async fn publish(&self, records: &[UnifiedDailyRecord]) -> BatchReport {
        let batch_id = Uuid::new_v4();
        info!(%batch_id, records = records.len(), "publishing daily records");

        let mut outcomes = Vec::with_capacity(records.len());
        for record in records {
            let status = match self.submit(record).await {
                Ok(synced_at) => {
                    debug!(%batch_id, date = %record.record_date, "record synced");
                    PublishStatus::Synced { synced_at }
                }
                Err(e) => {
                    warn!(
                        %batch_id,
                        date = %record.record_date,
                        error = %e,
                        "failed to sync record"
                    );
                    PublishStatus::Failed {
                        error: e.to_string(),
                    }
                }
            };
            outcomes.push(RecordOutcome {
                record_date: record.record_date,
                status,
            });
        }

        let report = BatchReport { batch_id, outcomes };
        info!(
            %batch_id,
            synced = report.success_count(),
            total = report.total_count(),
            "{}",
            report.summary()
        );
        report
    }

    async fn submit(&self, record: &UnifiedDailyRecord) -> Result<Option<DateTime<Utc>>, ApiError> {
        if !record.is_user_scoped() {
            return Err(ApiError::MissingUserId(record.record_date));
        }
        let receipt = self.api.sync_record(record).await?;
        Ok(receipt.synced_at())
    }
}
