//! Workers filling the derived position and driver columns of fault and status data.

use std::collections::BTreeMap;
use std::time::Duration;

use chrono::Utc;
use config::shared::{EnrichmentOptimizerConfig, OperationMode, RetryConfig};
use tokio::time::Instant;
use tracing::{debug, info};

use crate::enrichment::driver::resolve_driver;
use crate::enrichment::interpolation::resolve_position;
use crate::enrichment::{DriverOutcome, DriverUpdate, PositionOutcome, PositionUpdate};
use crate::error::OptimizerResult;
use crate::retry::{TRANSIENT_ERROR_KINDS, retry_with_backoff};
use crate::store::base::{OptimizerStore, OptimizerUnitOfWork, UnitOfWork};
use crate::tracker::TrackingUpdate;
use crate::types::{Database, EnrichedTable, ProcessorId};
use crate::workers::base::{IterationOutcome, Worker, should_throttle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subtask {
    Position,
    Driver,
}

/// Interpolates positions and carries drivers forward for one enriched table.
///
/// The two sub-tasks throttle independently. The worker only sleeps when neither of them is due.
#[derive(Debug)]
pub struct EnrichmentOptimizer<O> {
    id: ProcessorId,
    table: EnrichedTable,
    config: EnrichmentOptimizerConfig,
    store: O,
    retry: RetryConfig,
    next_position_poll: Instant,
    next_driver_poll: Instant,
}

impl<O> EnrichmentOptimizer<O>
where
    O: OptimizerStore,
{
    pub fn new(
        table: EnrichedTable,
        config: EnrichmentOptimizerConfig,
        store: O,
        retry: RetryConfig,
    ) -> Self {
        let id = match table {
            EnrichedTable::FaultData => ProcessorId::FaultDataOptimizer,
            EnrichedTable::StatusData => ProcessorId::StatusDataOptimizer,
        };
        let now = Instant::now();

        Self {
            id,
            table,
            config,
            store,
            retry,
            next_position_poll: now,
            next_driver_poll: now,
        }
    }

    fn enabled(&self, subtask: Subtask) -> bool {
        match subtask {
            Subtask::Position => self.config.position.enabled,
            Subtask::Driver => self.config.driver_id.enabled,
        }
    }

    fn next_poll(&mut self, subtask: Subtask) -> &mut Instant {
        match subtask {
            Subtask::Position => &mut self.next_position_poll,
            Subtask::Driver => &mut self.next_driver_poll,
        }
    }

    /// Runs one sub-task and returns how many candidates it found.
    async fn run_subtask(&self, subtask: Subtask) -> OptimizerResult<usize> {
        match subtask {
            Subtask::Position => self.enrich_positions().await,
            Subtask::Driver => self.enrich_drivers().await,
        }
    }

    async fn enrich_positions(&self) -> OptimizerResult<usize> {
        let queried_utc = Utc::now();
        let candidates =
            retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Optimizer, || {
                self.store
                    .position_candidates(self.table, self.config.batch_size)
            })
            .await?;

        let updates: Vec<PositionUpdate> = candidates
            .iter()
            .map(|candidate| PositionUpdate {
                id: candidate.id,
                outcome: resolve_position(candidate, &self.config.position),
            })
            .collect();

        let mut tracking = TrackingUpdate::queried(self.id, queried_utc);
        tracking.entities_processed = !updates.is_empty();
        retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Optimizer, || {
            self.store_positions(&updates, &tracking)
        })
        .await?;

        if !updates.is_empty() {
            let mut unresolved: BTreeMap<i16, usize> = BTreeMap::new();
            for update in &updates {
                if let PositionOutcome::Unresolvable(reason) = update.outcome {
                    *unresolved.entry(reason.code()).or_default() += 1;
                }
            }

            info!(
                processor = %self.id,
                table = self.table.as_str(),
                processed = updates.len(),
                ?unresolved,
                "positions enriched"
            );
        }

        Ok(candidates.len())
    }

    async fn store_positions(
        &self,
        updates: &[PositionUpdate],
        tracking: &TrackingUpdate,
    ) -> OptimizerResult<()> {
        let mut uow = self.store.begin().await?;
        uow.apply_position_updates(self.table, updates).await?;
        uow.update_tracking(tracking).await?;

        uow.commit().await
    }

    async fn enrich_drivers(&self) -> OptimizerResult<usize> {
        let queried_utc = Utc::now();
        let candidates =
            retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Optimizer, || {
                self.store.driver_candidates(self.table, self.config.batch_size)
            })
            .await?;

        let updates: Vec<DriverUpdate> = candidates
            .iter()
            .map(|candidate| DriverUpdate {
                id: candidate.id,
                outcome: resolve_driver(candidate),
            })
            .collect();

        let mut tracking = TrackingUpdate::queried(self.id, queried_utc);
        tracking.entities_processed = !updates.is_empty();
        retry_with_backoff(&self.retry, TRANSIENT_ERROR_KINDS, Database::Optimizer, || {
            self.store_drivers(&updates, &tracking)
        })
        .await?;

        if !updates.is_empty() {
            let assigned = updates
                .iter()
                .filter(|update| matches!(update.outcome, DriverOutcome::Assigned(_)))
                .count();

            info!(
                processor = %self.id,
                table = self.table.as_str(),
                processed = updates.len(),
                assigned,
                "drivers enriched"
            );
        }

        Ok(candidates.len())
    }

    async fn store_drivers(
        &self,
        updates: &[DriverUpdate],
        tracking: &TrackingUpdate,
    ) -> OptimizerResult<()> {
        let mut uow = self.store.begin().await?;
        uow.apply_driver_updates(self.table, updates).await?;
        uow.update_tracking(tracking).await?;

        uow.commit().await
    }
}

impl<O> Worker for EnrichmentOptimizer<O>
where
    O: OptimizerStore,
{
    fn id(&self) -> ProcessorId {
        self.id
    }

    /// The processor filling the table, plus the processors of the samples each enabled
    /// sub-task reads.
    fn prerequisites(&self) -> Vec<ProcessorId> {
        let mut prerequisites = vec![match self.table {
            EnrichedTable::FaultData => ProcessorId::FaultDataProcessor,
            EnrichedTable::StatusData => ProcessorId::StatusDataProcessor,
        }];

        if self.config.position.enabled {
            prerequisites.push(ProcessorId::LogRecordProcessor);
        }
        if self.config.driver_id.enabled {
            prerequisites.push(ProcessorId::DriverChangeProcessor);
        }

        prerequisites
    }

    fn mode(&self) -> OperationMode {
        self.config.mode
    }

    async fn start(&mut self) -> OptimizerResult<()> {
        let now = Instant::now();
        self.next_position_poll = now;
        self.next_driver_poll = now;

        Ok(())
    }

    async fn run_iteration(&mut self) -> OptimizerResult<IterationOutcome> {
        let interval = self.config.execution_interval();
        let mut next_due: Option<Instant> = None;

        for subtask in [Subtask::Position, Subtask::Driver] {
            if !self.enabled(subtask) {
                continue;
            }

            if Instant::now() >= *self.next_poll(subtask) {
                let found = self.run_subtask(subtask).await?;

                if should_throttle(found, self.config.throttle_threshold) {
                    debug!(processor = %self.id, ?subtask, found, "sub-task throttled");
                    *self.next_poll(subtask) = Instant::now() + interval;
                }
            }

            let due = *self.next_poll(subtask);
            next_due = Some(next_due.map_or(due, |next| next.min(due)));
        }

        let Some(next_due) = next_due else {
            return Ok(IterationOutcome::Sleep(interval));
        };

        let wait = next_due.saturating_duration_since(Instant::now());
        if wait == Duration::ZERO {
            Ok(IterationOutcome::Continue)
        } else {
            Ok(IterationOutcome::Sleep(wait))
        }
    }
}
