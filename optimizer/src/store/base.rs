use std::future::Future;

use chrono::{DateTime, Utc};

use crate::enrichment::{DriverCandidate, DriverUpdate, PositionCandidate, PositionUpdate};
use crate::environment::EnvironmentInfo;
use crate::error::OptimizerResult;
use crate::tracker::{ProcessorTrackingRecord, TrackingUpdate};
use crate::types::{
    ChangeTrackedRecord, EnrichedTable, KeyRow, PagedSourceRecord, ProcessorId, SourceTable,
    TargetRecord, TargetTable,
};

/// A transaction against one database.
///
/// Dropping a unit of work without committing it discards everything it did.
pub trait UnitOfWork: Send {
    fn commit(self) -> impl Future<Output = OptimizerResult<()>> + Send;

    fn rollback(self) -> impl Future<Output = OptimizerResult<()>> + Send;
}

/// Read access to the Adapter database plus deletion of migrated rows.
///
/// Implementations are cloned into every worker and must share their connections.
pub trait AdapterStore: Clone + Send + Sync + 'static {
    type UnitOfWork: AdapterUnitOfWork;

    /// Succeeds when the database accepts queries.
    fn probe(&self) -> impl Future<Output = OptimizerResult<()>> + Send;

    /// Returns up to `limit` rows ordered by `(date_time, id)`, skipping `excluded_ids`.
    fn fetch_page<R: PagedSourceRecord>(
        &self,
        limit: usize,
        excluded_ids: &[i64],
    ) -> impl Future<Output = OptimizerResult<Vec<R>>> + Send;

    /// Returns rows changed at or after `since`, or every row when `since` is `None`, ordered by
    /// `(record_last_changed_utc, id)`.
    fn fetch_changed_since<R: ChangeTrackedRecord>(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> impl Future<Output = OptimizerResult<Vec<R>>> + Send;

    fn begin(&self) -> impl Future<Output = OptimizerResult<Self::UnitOfWork>> + Send;
}

pub trait AdapterUnitOfWork: UnitOfWork {
    /// Deletes rows by surrogate id and returns how many existed.
    fn delete_rows(
        &mut self,
        table: SourceTable,
        ids: &[i64],
    ) -> impl Future<Output = OptimizerResult<u64>> + Send;
}

/// Access to the Optimizer database.
///
/// Implementations are cloned into every worker and must share their connections.
pub trait OptimizerStore: Clone + Send + Sync + 'static {
    type UnitOfWork: OptimizerUnitOfWork;

    /// Succeeds when the database accepts queries.
    fn probe(&self) -> impl Future<Output = OptimizerResult<()>> + Send;

    fn begin(&self) -> impl Future<Output = OptimizerResult<Self::UnitOfWork>> + Send;

    /// Returns the natural and surrogate keys of `table` with an id above `after_id`, or of the
    /// whole table when `after_id` is `None`, ordered by id.
    fn load_keys(
        &self,
        table: TargetTable,
        after_id: Option<i64>,
    ) -> impl Future<Output = OptimizerResult<Vec<KeyRow>>> + Send;

    /// Inserts dimension rows for the natural keys not present yet, in a transaction of its own.
    ///
    /// Returns how many rows were created.
    fn insert_missing_keys(
        &self,
        table: TargetTable,
        keys: &[String],
    ) -> impl Future<Output = OptimizerResult<u64>> + Send;

    /// Tracking records of every known worker. Rows of unknown workers are skipped.
    fn tracking_records(
        &self,
    ) -> impl Future<Output = OptimizerResult<Vec<ProcessorTrackingRecord>>> + Send;

    fn tracking_record(
        &self,
        processor: ProcessorId,
    ) -> impl Future<Output = OptimizerResult<Option<ProcessorTrackingRecord>>> + Send;

    /// Applies `update` in a transaction of its own.
    fn update_tracking(
        &self,
        update: &TrackingUpdate,
    ) -> impl Future<Output = OptimizerResult<()>> + Send;

    /// Stamps the tracking record of `processor` with the running version and host, creating
    /// the record when missing.
    fn record_environment(
        &self,
        processor: ProcessorId,
        environment: &EnvironmentInfo,
    ) -> impl Future<Output = OptimizerResult<()>> + Send;

    /// Rows of `table` whose position can be decided now, oldest first.
    ///
    /// A row qualifies when it was not processed yet and either a position sample of its device
    /// exists at or after it, or it is older than every position sample.
    fn position_candidates(
        &self,
        table: EnrichedTable,
        limit: usize,
    ) -> impl Future<Output = OptimizerResult<Vec<PositionCandidate>>> + Send;

    /// Rows of `table` whose driver can be decided now, oldest first.
    ///
    /// A row qualifies when it was not processed yet and either a driver change of its device
    /// exists at or after it, or it is older than every driver change.
    fn driver_candidates(
        &self,
        table: EnrichedTable,
        limit: usize,
    ) -> impl Future<Output = OptimizerResult<Vec<DriverCandidate>>> + Send;
}

pub trait OptimizerUnitOfWork: UnitOfWork {
    /// Writes rows according to [`TargetRecord::WRITE_MODE`] and returns how many were
    /// inserted or updated.
    fn write_rows<T: TargetRecord>(
        &mut self,
        rows: &[T],
    ) -> impl Future<Output = OptimizerResult<u64>> + Send;

    fn update_tracking(
        &mut self,
        update: &TrackingUpdate,
    ) -> impl Future<Output = OptimizerResult<()>> + Send;

    /// Stores position outcomes and marks the rows as processed.
    fn apply_position_updates(
        &mut self,
        table: EnrichedTable,
        updates: &[PositionUpdate],
    ) -> impl Future<Output = OptimizerResult<u64>> + Send;

    /// Stores driver outcomes and marks the rows as processed.
    fn apply_driver_updates(
        &mut self,
        table: EnrichedTable,
        updates: &[DriverUpdate],
    ) -> impl Future<Output = OptimizerResult<u64>> + Send;
}
