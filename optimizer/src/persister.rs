//! Atomic hand-over of a batch from the Adapter database to the Optimizer database.

use config::shared::RetryConfig;
use futures::future::try_join;
use tracing::debug;

use crate::error::OptimizerResult;
use crate::retry::{TRANSIENT_ERROR_KINDS, retry_with_backoff};
use crate::store::base::{
    AdapterStore, AdapterUnitOfWork, OptimizerStore, OptimizerUnitOfWork, UnitOfWork,
};
use crate::tracker::TrackingUpdate;
use crate::types::{Database, SourceTable, TargetRecord};

/// Source rows to delete once their targets are written.
#[derive(Debug, Clone, Copy)]
pub struct SourceDeletes<'a> {
    pub table: SourceTable,
    pub ids: &'a [i64],
}

/// Writes target rows together with the tracking update of the iteration and deletes the
/// migrated source rows.
///
/// Both transactions are prepared concurrently. The Optimizer transaction commits first, so a
/// failure in between leaves the source rows in place and the next attempt rewrites targets that
/// already exist. Target writes are idempotent on the natural key, which makes that replay
/// harmless.
#[derive(Debug, Clone)]
pub struct EntityPersister<A, O> {
    adapter: A,
    optimizer: O,
    retry: RetryConfig,
}

impl<A, O> EntityPersister<A, O>
where
    A: AdapterStore,
    O: OptimizerStore,
{
    pub fn new(adapter: A, optimizer: O, retry: RetryConfig) -> Self {
        Self {
            adapter,
            optimizer,
            retry,
        }
    }

    /// Persists a batch, retrying the whole hand-over on transient failures.
    ///
    /// Returns how many target rows were written.
    pub async fn persist<T: TargetRecord>(
        &self,
        rows: &[T],
        tracking: &TrackingUpdate,
        deletes: Option<SourceDeletes<'_>>,
    ) -> OptimizerResult<u64> {
        retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Optimizer, || {
            self.persist_once(rows, tracking, deletes)
        })
        .await
    }

    async fn persist_once<T: TargetRecord>(
        &self,
        rows: &[T],
        tracking: &TrackingUpdate,
        deletes: Option<SourceDeletes<'_>>,
    ) -> OptimizerResult<u64> {
        let deletes = deletes.filter(|deletes| !deletes.ids.is_empty());

        let begin_adapter = async {
            match deletes {
                Some(_) => self.adapter.begin().await.map(Some),
                None => Ok(None),
            }
        };
        let (mut optimizer_uow, mut adapter_uow) =
            try_join(self.optimizer.begin(), begin_adapter).await?;

        let write_targets = async {
            let written = optimizer_uow.write_rows(rows).await?;
            optimizer_uow.update_tracking(tracking).await?;
            OptimizerResult::Ok(written)
        };
        let delete_sources = async {
            match (adapter_uow.as_mut(), deletes) {
                (Some(uow), Some(deletes)) => uow.delete_rows(deletes.table, deletes.ids).await,
                _ => Ok(0),
            }
        };
        let (written, deleted) = try_join(write_targets, delete_sources).await?;

        optimizer_uow.commit().await?;
        if let Some(adapter_uow) = adapter_uow {
            adapter_uow.commit().await?;
        }

        debug!(
            processor = %tracking.processor,
            table = %T::TABLE,
            written,
            deleted,
            "batch persisted"
        );

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::error::ErrorKind;
    use crate::store::memory::{MemoryAdapterStore, MemoryOptimizerStore};
    use crate::types::{AdapterLogRecord, OptimizerLogRecord, ProcessorId};

    fn retry(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 1,
            backoff_factor: 1.0,
        }
    }

    fn source(id: i64) -> AdapterLogRecord {
        let at = Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, id as u32).unwrap();
        AdapterLogRecord {
            id,
            geotab_id: format!("b{id}"),
            date_time: at,
            device_id: "b1".to_owned(),
            latitude: 0.0,
            longitude: 0.0,
            speed: 0.0,
            record_creation_time_utc: at,
        }
    }

    fn target(record: &AdapterLogRecord) -> OptimizerLogRecord {
        OptimizerLogRecord {
            geotab_id: record.geotab_id.clone(),
            date_time: record.date_time,
            device_id: 1,
            latitude: record.latitude,
            longitude: record.longitude,
            speed: record.speed,
            record_creation_time_utc: record.record_creation_time_utc,
        }
    }

    #[tokio::test]
    async fn failed_source_commit_is_retried_without_duplicating_targets() {
        let adapter = MemoryAdapterStore::new();
        let optimizer = MemoryOptimizerStore::new();
        let sources = vec![source(1), source(2)];
        adapter.insert_rows(&sources).await.unwrap();
        adapter.fail_next_commits(1).await;

        let persister = EntityPersister::new(adapter.clone(), optimizer.clone(), retry(3));
        let targets: Vec<_> = sources.iter().map(target).collect();
        let update = TrackingUpdate::queried(ProcessorId::LogRecordProcessor, Utc::now());

        persister
            .persist(
                &targets,
                &update,
                Some(SourceDeletes {
                    table: SourceTable::LogRecords,
                    ids: &[1, 2],
                }),
            )
            .await
            .unwrap();

        assert_eq!(optimizer.rows::<OptimizerLogRecord>().await.unwrap().len(), 2);
        assert!(adapter.rows::<AdapterLogRecord>().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn nothing_is_written_when_the_optimizer_commit_keeps_failing() {
        let adapter = MemoryAdapterStore::new();
        let optimizer = MemoryOptimizerStore::new();
        adapter.insert_rows(&[source(1)]).await.unwrap();
        optimizer.fail_next_commits(5).await;

        let persister = EntityPersister::new(adapter.clone(), optimizer.clone(), retry(2));
        let update = TrackingUpdate::queried(ProcessorId::LogRecordProcessor, Utc::now());

        let err = persister
            .persist(
                &[target(&source(1))],
                &update,
                Some(SourceDeletes {
                    table: SourceTable::LogRecords,
                    ids: &[1],
                }),
            )
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::OptimizerDatabaseUnavailable);
        assert_eq!(adapter.rows::<AdapterLogRecord>().await.unwrap().len(), 1);
        assert!(optimizer.tracking_records().await.unwrap().is_empty());
    }
}
