//! Prerequisite gate.
//!
//! A worker only runs once every worker it depends on has a tracking record, queried its source
//! recently and processed at least one entity. The gate polls the tracking table rather than
//! in-process state so the workers stay deployable as separate processes.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use config::shared::PrerequisiteConfig;
use tracing::{info, warn};

use crate::bail;
use crate::concurrency::shutdown::ShutdownRx;
use crate::error::{ErrorKind, OptimizerResult};
use crate::store::base::OptimizerStore;
use crate::tracker::{ProcessorTracker, ProcessorTrackingRecord};
use crate::types::ProcessorId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrerequisiteProblem {
    NeverRan,
    NotRunning,
    NoEntitiesProcessed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrerequisiteIssue {
    pub processor: ProcessorId,
    pub problem: PrerequisiteProblem,
}

impl fmt::Display for PrerequisiteIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let problem = match self.problem {
            PrerequisiteProblem::NeverRan => "has never run",
            PrerequisiteProblem::NotRunning => "is not currently running",
            PrerequisiteProblem::NoEntitiesProcessed => "has not processed any entities yet",
        };

        write!(f, "{} {}", self.processor, problem)
    }
}

/// Lists every unmet condition of every prerequisite.
pub fn evaluate_prerequisites(
    records: &[ProcessorTrackingRecord],
    prerequisites: &[ProcessorId],
    now: DateTime<Utc>,
    max_inactivity: Duration,
) -> Vec<PrerequisiteIssue> {
    let mut issues = Vec::new();

    for &processor in prerequisites {
        let Some(record) = records.iter().find(|record| record.processor == processor) else {
            issues.push(PrerequisiteIssue {
                processor,
                problem: PrerequisiteProblem::NeverRan,
            });
            continue;
        };

        if !record.is_running(now, max_inactivity) {
            issues.push(PrerequisiteIssue {
                processor,
                problem: PrerequisiteProblem::NotRunning,
            });
        }

        if !record.entities_have_been_processed {
            issues.push(PrerequisiteIssue {
                processor,
                problem: PrerequisiteProblem::NoEntitiesProcessed,
            });
        }
    }

    issues
}

#[derive(Debug, Clone)]
pub struct PrerequisiteGate<O> {
    tracker: ProcessorTracker<O>,
    config: PrerequisiteConfig,
}

impl<O> PrerequisiteGate<O>
where
    O: OptimizerStore,
{
    pub fn new(tracker: ProcessorTracker<O>, config: PrerequisiteConfig) -> Self {
        Self { tracker, config }
    }

    /// Returns once every prerequisite of `worker` is satisfied.
    ///
    /// Fails with [`ErrorKind::OperationCanceled`] when shutdown is requested while waiting.
    pub async fn wait_until_satisfied(
        &self,
        worker: ProcessorId,
        prerequisites: &[ProcessorId],
        shutdown_rx: &mut ShutdownRx,
    ) -> OptimizerResult<()> {
        if prerequisites.is_empty() {
            return Ok(());
        }

        let mut waited = false;

        loop {
            let records = self.tracker.get_tracking_list().await?;
            let issues = evaluate_prerequisites(
                &records,
                prerequisites,
                Utc::now(),
                self.config.max_inactivity(),
            );

            if issues.is_empty() {
                if waited {
                    info!(processor = %worker, "prerequisites are satisfied, resuming");
                }

                return Ok(());
            }

            let issues = issues
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(", ");
            warn!(
                processor = %worker,
                %issues,
                retry_in_ms = self.config.check_interval_ms,
                "waiting for prerequisites"
            );
            waited = true;

            if shutdown_rx.sleep(self.config.check_interval()).await {
                bail!(
                    ErrorKind::OperationCanceled,
                    "Shutdown requested while waiting for prerequisites"
                );
            }
        }
    }
}
