//! How ETL processors select the next batch of source rows.
//!
//! Append-only tables are drained page by page: migrated rows are deleted from the Adapter
//! database, so the oldest rows left are always the next page. Change-tracked tables are never
//! deleted from and are diffed against a mirror of the whole table instead, resuming after the
//! newest change already migrated.

use std::collections::BTreeMap;
use std::future::Future;
use std::ops::Bound;

use chrono::{DateTime, Utc};
use config::shared::RetryConfig;
use tracing::{debug, warn};

use crate::cache::Cache;
use crate::cache::object::ObjectCache;
use crate::error::OptimizerResult;
use crate::retry::{TRANSIENT_ERROR_KINDS, retry_with_backoff};
use crate::store::base::AdapterStore;
use crate::tracker::ProcessorTrackingRecord;
use crate::types::{ChangeTrackedRecord, Database, PagedSourceRecord, SourceRecord};

/// Rows selected for one iteration.
#[derive(Debug, Clone)]
pub struct Batch<R> {
    pub rows: Vec<R>,
    /// Rows newly read from the source, the count throttling is based on.
    pub fetched: usize,
}

/// Progress recorded in the tracking record after a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumePoint {
    pub id: i64,
    pub geotab_id: String,
    pub created_utc: DateTime<Utc>,
}

pub trait BatchSource: Send + Sync + 'static {
    type Row: SourceRecord;

    /// Whether migrated rows are deleted from the Adapter database.
    const DELETES_MIGRATED: bool;

    /// Restores the source from the tracking record of its processor.
    fn start(
        &mut self,
        tracking: Option<&ProcessorTrackingRecord>,
    ) -> impl Future<Output = OptimizerResult<()>> + Send;

    fn fetch(
        &mut self,
        batch_size: usize,
    ) -> impl Future<Output = OptimizerResult<Batch<Self::Row>>> + Send;

    /// Keeps a row whose references could not be resolved for a later iteration.
    fn defer(&mut self, row: Self::Row);

    fn resume_point(&self, batch: &[Self::Row], migrated: &[&Self::Row]) -> Option<ResumePoint>;

    /// Called once the batch has been persisted.
    fn committed(&mut self, batch: &[Self::Row]);
}

/// Upper bound of rows a [`PageSource`] keeps deferred.
pub const MAX_DEFERRED_ROWS: usize = 10_000;

/// Drains an append-only table in `(date_time, id)` order.
///
/// Deferred rows stay in the Adapter database. They are excluded from the page query so they do
/// not fill every page, and fill the part of a batch the fresh page leaves empty, in rotation, so
/// a batch never holds more than `batch_size` rows. Rows evicted from a full deferred set, and
/// all of them after a restart, come back through the page query.
#[derive(Debug)]
pub struct PageSource<R, A> {
    adapter: A,
    retry: RetryConfig,
    deferred: BTreeMap<i64, R>,
    max_deferred: usize,
    /// Id of the last deferred row offered again, where the next rotation starts.
    cursor: Option<i64>,
}

impl<R, A> PageSource<R, A>
where
    R: PagedSourceRecord,
    A: AdapterStore,
{
    pub fn new(adapter: A, retry: RetryConfig) -> Self {
        Self {
            adapter,
            retry,
            deferred: BTreeMap::new(),
            max_deferred: MAX_DEFERRED_ROWS,
            cursor: None,
        }
    }

    pub fn with_max_deferred(mut self, max_deferred: usize) -> Self {
        self.max_deferred = max_deferred.max(1);
        self
    }

    pub fn deferred_len(&self) -> usize {
        self.deferred.len()
    }

    /// Removes up to `limit` deferred rows, continuing after the rows offered last time.
    fn take_deferred(&mut self, limit: usize) -> Vec<R> {
        if limit == 0 || self.deferred.is_empty() {
            return Vec::new();
        }

        let ids: Vec<i64> = match self.cursor {
            Some(cursor) => self
                .deferred
                .range((Bound::Excluded(cursor), Bound::Unbounded))
                .chain(self.deferred.range(..=cursor))
                .map(|(id, _)| *id)
                .take(limit)
                .collect(),
            None => self.deferred.keys().copied().take(limit).collect(),
        };

        if let Some(last) = ids.last() {
            self.cursor = Some(*last);
        }

        ids.iter()
            .filter_map(|id| self.deferred.remove(id))
            .collect()
    }
}

impl<R, A> BatchSource for PageSource<R, A>
where
    R: PagedSourceRecord,
    A: AdapterStore,
{
    type Row = R;

    const DELETES_MIGRATED: bool = true;

    async fn start(&mut self, _tracking: Option<&ProcessorTrackingRecord>) -> OptimizerResult<()> {
        Ok(())
    }

    async fn fetch(&mut self, batch_size: usize) -> OptimizerResult<Batch<R>> {
        let excluded: Vec<i64> = self.deferred.keys().copied().collect();
        let fresh = retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Adapter, || {
            self.adapter.fetch_page::<R>(batch_size, &excluded)
        })
        .await?;

        let fetched = fresh.len();
        let mut rows = self.take_deferred(batch_size.saturating_sub(fetched));
        rows.extend(fresh);

        Ok(Batch { rows, fetched })
    }

    fn defer(&mut self, row: R) {
        self.deferred.insert(row.id(), row);

        while self.deferred.len() > self.max_deferred {
            if let Some((id, _)) = self.deferred.pop_first() {
                warn!(
                    table = R::TABLE.as_str(),
                    id,
                    max_deferred = self.max_deferred,
                    "too many deferred rows, returning the oldest to the page scan"
                );
            }
        }
    }

    fn resume_point(&self, _batch: &[R], migrated: &[&R]) -> Option<ResumePoint> {
        let last = migrated.iter().max_by_key(|row| row.id())?;
        let created_utc = migrated
            .iter()
            .map(|row| row.record_creation_time_utc())
            .max()?;

        Some(ResumePoint {
            id: last.id(),
            geotab_id: last.geotab_id().to_owned(),
            created_utc,
        })
    }

    fn committed(&mut self, _batch: &[R]) {}
}

/// Diffs a change-tracked table through its full-mirror cache.
///
/// The watermark is the change timestamp of the newest row migrated. It is persisted in the
/// `adapter_db_last_record_creation_time_utc` column of the tracking record, which the diff
/// processors have no other use for.
#[derive(Debug)]
pub struct DiffSource<R, A> {
    cache: ObjectCache<R, A>,
    watermark: Option<DateTime<Utc>>,
}

impl<R, A> DiffSource<R, A>
where
    R: ChangeTrackedRecord,
    A: AdapterStore,
{
    pub fn new(cache: ObjectCache<R, A>) -> Self {
        Self {
            cache,
            watermark: None,
        }
    }

    pub fn watermark(&self) -> Option<DateTime<Utc>> {
        self.watermark
    }
}

/// Shortens `rows`, ordered by change timestamp, to about `batch_size` rows.
///
/// Rows sharing the change timestamp of the last kept row are kept too: the next batch starts
/// strictly after that timestamp and would otherwise skip them.
pub fn truncate_keeping_ties<R: ChangeTrackedRecord>(rows: &mut Vec<R>, batch_size: usize) {
    if batch_size == 0 || rows.len() <= batch_size {
        return;
    }

    let boundary = rows[batch_size - 1].record_last_changed_utc();
    let keep = rows
        .iter()
        .take_while(|row| row.record_last_changed_utc() <= boundary)
        .count();
    rows.truncate(keep);
}

impl<R, A> BatchSource for DiffSource<R, A>
where
    R: ChangeTrackedRecord,
    A: AdapterStore,
{
    type Row = R;

    const DELETES_MIGRATED: bool = false;

    async fn start(&mut self, tracking: Option<&ProcessorTrackingRecord>) -> OptimizerResult<()> {
        self.watermark = tracking.and_then(|record| record.adapter_db_last_record_creation_time_utc);
        debug!(table = R::TABLE.as_str(), watermark = ?self.watermark, "diff source resumed");

        self.cache.initialize().await
    }

    async fn fetch(&mut self, batch_size: usize) -> OptimizerResult<Batch<R>> {
        self.cache.update(false).await?;

        let mut rows = self.cache.get_objects(self.watermark).await;
        truncate_keeping_ties(&mut rows, batch_size);
        let fetched = rows.len();

        Ok(Batch { rows, fetched })
    }

    fn defer(&mut self, row: R) {
        debug!(
            table = R::TABLE.as_str(),
            geotab_id = row.geotab_id(),
            "unresolved row of a change-tracked table is retried on its next change"
        );
    }

    fn resume_point(&self, batch: &[R], _migrated: &[&R]) -> Option<ResumePoint> {
        let last = batch.last()?;

        Some(ResumePoint {
            id: last.id(),
            geotab_id: last.geotab_id().to_owned(),
            created_utc: last.record_last_changed_utc(),
        })
    }

    fn committed(&mut self, batch: &[R]) {
        if let Some(last) = batch.last() {
            self.watermark = self.watermark.max(Some(last.record_last_changed_utc()));
        }
    }
}
