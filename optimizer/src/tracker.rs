//! Durable per-worker progress records.
//!
//! Every worker owns one row of `processor_tracking`. The row tells other workers whether it runs
//! and has processed anything, and holds the resume point of page and diff processors. Watermarks
//! only move forward, both in [`ProcessorTrackingRecord::apply`] and in the Postgres upsert.

use std::time::Duration;

use chrono::{DateTime, Utc};
use config::shared::RetryConfig;
use postgres::tracking::{ProcessorTrackingRow, TrackingUpsert};

use crate::environment::EnvironmentInfo;
use crate::error::OptimizerResult;
use crate::retry::{TRANSIENT_ERROR_KINDS, retry_with_backoff};
use crate::store::base::OptimizerStore;
use crate::types::{Database, ProcessorId, UnknownProcessorId};

#[derive(Debug, Clone, PartialEq)]
pub struct ProcessorTrackingRecord {
    pub processor: ProcessorId,
    pub optimizer_version: Option<String>,
    pub optimizer_machine_name: Option<String>,
    pub entities_last_processed_utc: Option<DateTime<Utc>>,
    pub adapter_db_last_id: Option<i64>,
    pub adapter_db_last_geotab_id: Option<String>,
    pub adapter_db_last_record_creation_time_utc: Option<DateTime<Utc>>,
    pub last_queried_utc: Option<DateTime<Utc>>,
    pub entities_have_been_processed: bool,
}

impl ProcessorTrackingRecord {
    pub fn new(processor: ProcessorId) -> Self {
        Self {
            processor,
            optimizer_version: None,
            optimizer_machine_name: None,
            entities_last_processed_utc: None,
            adapter_db_last_id: None,
            adapter_db_last_geotab_id: None,
            adapter_db_last_record_creation_time_utc: None,
            last_queried_utc: None,
            entities_have_been_processed: false,
        }
    }

    /// Applies an iteration result without ever moving a timestamp or the last id backwards.
    pub fn apply(&mut self, update: &TrackingUpdate) {
        self.last_queried_utc = max_option(self.last_queried_utc, Some(update.last_queried_utc));

        if update.entities_processed {
            self.entities_last_processed_utc =
                max_option(self.entities_last_processed_utc, Some(update.last_queried_utc));
            self.entities_have_been_processed = true;
        }

        if let Some(last_id) = update.last_processed_id {
            if self.adapter_db_last_id.is_none_or(|current| last_id >= current) {
                self.adapter_db_last_id = Some(last_id);
                self.adapter_db_last_geotab_id = update.last_processed_geotab_id.clone();
            }
        }

        self.adapter_db_last_record_creation_time_utc = max_option(
            self.adapter_db_last_record_creation_time_utc,
            update.last_processed_created_utc,
        );
    }

    /// Returns `true` when the worker queried its source within `max_inactivity` of `now`.
    pub fn is_running(&self, now: DateTime<Utc>, max_inactivity: Duration) -> bool {
        let Some(last_queried_utc) = self.last_queried_utc else {
            return false;
        };

        match (now - last_queried_utc).to_std() {
            Ok(elapsed) => elapsed <= max_inactivity,
            // A timestamp in the future comes from clock skew, the worker is active.
            Err(_) => true,
        }
    }
}

fn max_option<T: Ord>(current: Option<T>, new: Option<T>) -> Option<T> {
    match (current, new) {
        (Some(current), Some(new)) => Some(current.max(new)),
        (current, new) => current.or(new),
    }
}

impl TryFrom<ProcessorTrackingRow> for ProcessorTrackingRecord {
    type Error = UnknownProcessorId;

    fn try_from(row: ProcessorTrackingRow) -> Result<Self, Self::Error> {
        Ok(Self {
            processor: row.processor.parse()?,
            optimizer_version: row.optimizer_version,
            optimizer_machine_name: row.optimizer_machine_name,
            entities_last_processed_utc: row.entities_last_processed_utc,
            adapter_db_last_id: row.adapter_db_last_id,
            adapter_db_last_geotab_id: row.adapter_db_last_geotab_id,
            adapter_db_last_record_creation_time_utc: row.adapter_db_last_record_creation_time_utc,
            last_queried_utc: row.last_queried_utc,
            entities_have_been_processed: row.entities_have_been_processed,
        })
    }
}

/// Outcome of one worker iteration.
///
/// An empty iteration still refreshes `last_queried_utc`, which is how other workers see that
/// this one is running.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackingUpdate {
    pub processor: ProcessorId,
    pub last_queried_utc: DateTime<Utc>,
    pub last_processed_id: Option<i64>,
    pub last_processed_created_utc: Option<DateTime<Utc>>,
    pub last_processed_geotab_id: Option<String>,
    pub entities_processed: bool,
}

impl TrackingUpdate {
    /// An iteration that found nothing to do.
    pub fn queried(processor: ProcessorId, last_queried_utc: DateTime<Utc>) -> Self {
        Self {
            processor,
            last_queried_utc,
            last_processed_id: None,
            last_processed_created_utc: None,
            last_processed_geotab_id: None,
            entities_processed: false,
        }
    }

    pub fn as_upsert(&self) -> TrackingUpsert<'_> {
        TrackingUpsert {
            processor: self.processor.as_static_str(),
            last_queried_utc: self.last_queried_utc,
            entities_last_processed_utc: self
                .entities_processed
                .then_some(self.last_queried_utc),
            adapter_db_last_id: self.last_processed_id,
            adapter_db_last_geotab_id: self.last_processed_geotab_id.as_deref(),
            adapter_db_last_record_creation_time_utc: self.last_processed_created_utc,
            entities_have_been_processed: self.entities_processed,
        }
    }
}

/// Typed access to the tracking records with every call retried on transient failures.
#[derive(Debug, Clone)]
pub struct ProcessorTracker<O> {
    store: O,
    retry: RetryConfig,
}

impl<O> ProcessorTracker<O>
where
    O: OptimizerStore,
{
    pub fn new(store: O, retry: RetryConfig) -> Self {
        Self { store, retry }
    }

    pub async fn get_tracking_list(&self) -> OptimizerResult<Vec<ProcessorTrackingRecord>> {
        retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Optimizer, || {
            self.store.tracking_records()
        })
        .await
    }

    pub async fn get_tracking_record(
        &self,
        processor: ProcessorId,
    ) -> OptimizerResult<Option<ProcessorTrackingRecord>> {
        retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Optimizer, || {
            self.store.tracking_record(processor)
        })
        .await
    }

    /// When `processor` last processed at least one entity.
    pub async fn entities_last_processed(
        &self,
        processor: ProcessorId,
    ) -> OptimizerResult<Option<DateTime<Utc>>> {
        let record = self.get_tracking_record(processor).await?;

        Ok(record.and_then(|record| record.entities_last_processed_utc))
    }

    pub async fn has_processed_entities(&self, processor: ProcessorId) -> OptimizerResult<bool> {
        let record = self.get_tracking_record(processor).await?;

        Ok(record.is_some_and(|record| record.entities_have_been_processed))
    }

    /// Writes an iteration result in its own transaction.
    ///
    /// ETL processors write their watermark inside the batch transaction instead, see
    /// [`crate::persister::EntityPersister`].
    pub async fn update_tracking_record(&self, update: &TrackingUpdate) -> OptimizerResult<()> {
        retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Optimizer, || {
            self.store.update_tracking(update)
        })
        .await
    }

    pub async fn record_environment(
        &self,
        processor: ProcessorId,
        environment: &EnvironmentInfo,
    ) -> OptimizerResult<()> {
        retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Optimizer, || {
            self.store.record_environment(processor, environment)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration as TimeDelta, TimeZone};

    use super::*;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + TimeDelta::minutes(minutes)
    }

    fn batch(minutes: i64, last_id: i64) -> TrackingUpdate {
        TrackingUpdate {
            processor: ProcessorId::LogRecordProcessor,
            last_queried_utc: at(minutes),
            last_processed_id: Some(last_id),
            last_processed_created_utc: Some(at(minutes - 1)),
            last_processed_geotab_id: Some(format!("b{last_id}")),
            entities_processed: true,
        }
    }

    #[test]
    fn watermark_never_moves_backwards() {
        let mut record = ProcessorTrackingRecord::new(ProcessorId::LogRecordProcessor);

        record.apply(&batch(10, 50));
        record.apply(&batch(5, 20));

        assert_eq!(record.adapter_db_last_id, Some(50));
        assert_eq!(record.adapter_db_last_geotab_id.as_deref(), Some("b50"));
        assert_eq!(record.adapter_db_last_record_creation_time_utc, Some(at(9)));
        assert_eq!(record.last_queried_utc, Some(at(10)));
    }

    #[test]
    fn empty_iterations_only_refresh_the_query_time() {
        let mut record = ProcessorTrackingRecord::new(ProcessorId::DeviceProcessor);
        record.apply(&batch(10, 50));

        record.apply(&TrackingUpdate::queried(ProcessorId::DeviceProcessor, at(30)));

        assert_eq!(record.last_queried_utc, Some(at(30)));
        assert_eq!(record.entities_last_processed_utc, Some(at(10)));
        assert_eq!(record.adapter_db_last_id, Some(50));
        assert!(record.entities_have_been_processed);
    }

    #[test]
    fn running_means_queried_recently() {
        let mut record = ProcessorTrackingRecord::new(ProcessorId::DeviceProcessor);
        assert!(!record.is_running(at(0), Duration::from_secs(60)));

        record.apply(&TrackingUpdate::queried(ProcessorId::DeviceProcessor, at(0)));

        assert!(record.is_running(at(1), Duration::from_secs(60)));
        assert!(!record.is_running(at(2), Duration::from_secs(60)));
    }

    #[test]
    fn upsert_only_sets_processed_time_for_productive_iterations() {
        let update = TrackingUpdate::queried(ProcessorId::UserProcessor, at(3));
        let upsert = update.as_upsert();

        assert_eq!(upsert.processor, "UserProcessor");
        assert_eq!(upsert.entities_last_processed_utc, None);
        assert!(!upsert.entities_have_been_processed);
    }
}
