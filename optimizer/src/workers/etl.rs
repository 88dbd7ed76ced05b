use std::marker::PhantomData;

use chrono::Utc;
use config::shared::{OperationMode, ProcessorConfig};
use futures::FutureExt;
use futures::future::{BoxFuture, try_join_all};
use tracing::{debug, info, warn};

use crate::cache::{Cache, ReferenceCaches};
use crate::error::OptimizerResult;
use crate::mapping::{DimensionKeys, EntityMapper, MissingReferences, References, map_row};
use crate::persister::{EntityPersister, SourceDeletes};
use crate::store::base::{AdapterStore, OptimizerStore};
use crate::tracker::{ProcessorTracker, TrackingUpdate};
use crate::types::{ProcessorId, SourceRecord, TargetRecord};
use crate::workers::base::{IterationOutcome, Worker, should_throttle};
use crate::workers::strategy::{Batch, BatchSource};

/// Migrates one Adapter table into one Optimizer table.
///
/// The mapper `M` decides what a row becomes and the source `S` which rows are read and whether
/// they are deleted afterwards. Everything else, from reference resolution to throttling, is
/// shared by the eight processors.
pub struct EtlProcessor<M, S, A, O> {
    id: ProcessorId,
    config: ProcessorConfig,
    prerequisites: Vec<ProcessorId>,
    source: S,
    caches: ReferenceCaches<O>,
    persister: EntityPersister<A, O>,
    tracker: ProcessorTracker<O>,
    _mapper: PhantomData<fn() -> M>,
}

impl<M, S, A, O> EtlProcessor<M, S, A, O>
where
    M: EntityMapper,
    S: BatchSource<Row = M::Source>,
    A: AdapterStore,
    O: OptimizerStore,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: ProcessorId,
        config: ProcessorConfig,
        prerequisites: Vec<ProcessorId>,
        source: S,
        caches: ReferenceCaches<O>,
        persister: EntityPersister<A, O>,
        tracker: ProcessorTracker<O>,
    ) -> Self {
        Self {
            id,
            config,
            prerequisites,
            source,
            caches,
            persister,
            tracker,
            _mapper: PhantomData,
        }
    }

    /// Initializes every cache the mapper reads, concurrently.
    async fn initialize_caches(&self) -> OptimizerResult<()> {
        let mut pending: Vec<BoxFuture<'_, OptimizerResult<()>>> = Vec::new();

        for kind in M::ENTITIES {
            pending.push(self.caches.entity(*kind).initialize().boxed());
        }
        for kind in M::DIMENSIONS {
            pending.push(self.caches.dimension(*kind).initialize().boxed());
        }
        if let Some(cache) = self.caches.populated_by(<M::Target as TargetRecord>::TABLE) {
            pending.push(cache.initialize().boxed());
        }

        try_join_all(pending).await?;

        Ok(())
    }

    /// Creates the dimension rows `rows` reference and snapshots the entity caches.
    async fn references(&self, rows: &[M::Source]) -> OptimizerResult<References> {
        let mut keys = DimensionKeys::default();
        for row in rows {
            M::dimension_keys(row, &mut keys);
        }

        let mut references = References::default();
        for (kind, keys) in keys.iter() {
            let ids = self.caches.dimension(*kind).get_or_create(keys).await?;
            references.with_dimensions(*kind, ids);
        }
        for kind in M::ENTITIES {
            let ids = self.caches.entity(*kind).snapshot().await;
            references.with_entities(*kind, ids);
        }

        Ok(references)
    }

    async fn refresh_entities(&self) -> OptimizerResult<()> {
        let pending: Vec<BoxFuture<'_, OptimizerResult<()>>> = M::ENTITIES
            .iter()
            .map(|kind| self.caches.entity(*kind).update(false).boxed())
            .collect();

        try_join_all(pending).await?;

        Ok(())
    }

    /// Maps every row, giving rows with missing entities a second chance after one incremental
    /// refresh of the entity caches.
    async fn map_rows(
        &self,
        rows: &[M::Source],
    ) -> OptimizerResult<Vec<Result<M::Target, MissingReferences>>> {
        let references = self.references(rows).await?;
        let mut results: Vec<_> = rows
            .iter()
            .map(|row| map_row::<M>(row, &references))
            .collect();

        let entity_misses = results
            .iter()
            .any(|result| matches!(result, Err(missing) if missing.has_entities()));
        if !entity_misses {
            return Ok(results);
        }

        debug!(processor = %self.id, "unknown entities referenced, refreshing entity caches");
        self.refresh_entities().await?;
        let references = self.references(rows).await?;
        for (row, result) in rows.iter().zip(results.iter_mut()) {
            if result.is_err() {
                *result = map_row::<M>(row, &references);
            }
        }

        Ok(results)
    }
}

impl<M, S, A, O> Worker for EtlProcessor<M, S, A, O>
where
    M: EntityMapper,
    S: BatchSource<Row = M::Source>,
    A: AdapterStore,
    O: OptimizerStore,
{
    fn id(&self) -> ProcessorId {
        self.id
    }

    fn prerequisites(&self) -> Vec<ProcessorId> {
        self.prerequisites.clone()
    }

    fn mode(&self) -> OperationMode {
        self.config.mode
    }

    async fn start(&mut self) -> OptimizerResult<()> {
        let record = self.tracker.get_tracking_record(self.id).await?;

        self.source.start(record.as_ref()).await
    }

    async fn run_iteration(&mut self) -> OptimizerResult<IterationOutcome> {
        self.initialize_caches().await?;

        let queried_utc = Utc::now();
        let Batch { rows, fetched } = self.source.fetch(self.config.batch_size).await?;
        let results = self.map_rows(&rows).await?;

        let mut targets = Vec::with_capacity(rows.len());
        let mut migrated = Vec::with_capacity(rows.len());
        let mut deferred = Vec::new();
        for (row, result) in rows.iter().zip(results) {
            match result {
                Ok(target) => {
                    targets.push(target);
                    migrated.push(row);
                }
                Err(missing) => {
                    warn!(
                        processor = %self.id,
                        id = row.id(),
                        geotab_id = row.geotab_id(),
                        %missing,
                        "skipping row with unresolved references"
                    );
                    deferred.push(row.clone());
                }
            }
        }

        let resume_point = self.source.resume_point(&rows, &migrated);
        let tracking = TrackingUpdate {
            processor: self.id,
            last_queried_utc: queried_utc,
            last_processed_id: resume_point.as_ref().map(|point| point.id),
            last_processed_created_utc: resume_point.as_ref().map(|point| point.created_utc),
            last_processed_geotab_id: resume_point.map(|point| point.geotab_id),
            entities_processed: !targets.is_empty(),
        };

        let migrated_ids: Vec<i64> = migrated.iter().map(|row| row.id()).collect();
        let deletes = S::DELETES_MIGRATED.then_some(SourceDeletes {
            table: <M::Source as SourceRecord>::TABLE,
            ids: &migrated_ids,
        });
        let written = self.persister.persist(&targets, &tracking, deletes).await?;

        self.source.committed(&rows);
        let deferred_count = deferred.len();
        for row in deferred {
            self.source.defer(row);
        }

        if !targets.is_empty() {
            if let Some(cache) = self.caches.populated_by(<M::Target as TargetRecord>::TABLE) {
                cache.update(true).await?;
            }
        }

        if !rows.is_empty() {
            info!(
                processor = %self.id,
                fetched,
                migrated = targets.len(),
                written,
                deferred = deferred_count,
                "batch migrated"
            );
        }

        if should_throttle(fetched, self.config.throttle_threshold) {
            Ok(IterationOutcome::Sleep(self.config.execution_interval()))
        } else {
            Ok(IterationOutcome::Continue)
        }
    }
}
