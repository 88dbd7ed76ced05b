//! Startup validation and connectivity recovery.
//!
//! The orchestrator is the only worker that runs before the service is ready. It validates the
//! environment against the tracking records, raises the readiness signal and, while a worker
//! reported a database as unavailable, probes that database until it answers again.

use std::time::Duration;

use chrono::Utc;
use config::shared::{DataOptimizerConfig, EnvironmentValidationConfig, OrchestratorConfig};
use futures::future::try_join;
use tracing::{debug, error, info, warn};

use crate::concurrency::connectivity::{ConnectivityMonitor, WaitingReason};
use crate::concurrency::shutdown::ShutdownRx;
use crate::concurrency::signal::{ReadinessTx, raise};
use crate::environment::{EnvironmentInfo, validate_environment};
use crate::error::OptimizerResult;
use crate::store::base::{AdapterStore, OptimizerStore};
use crate::tracker::{ProcessorTracker, TrackingUpdate};
use crate::types::{Database, ProcessorId};
use crate::workers::policy::{ErrorHandlingPolicy, build_error_handling_policy};

#[derive(Debug)]
pub struct Orchestrator<A, O> {
    adapter: A,
    optimizer: O,
    tracker: ProcessorTracker<O>,
    config: OrchestratorConfig,
    validation: EnvironmentValidationConfig,
    environment: EnvironmentInfo,
    connectivity: ConnectivityMonitor,
    readiness_tx: ReadinessTx,
    shutdown_rx: ShutdownRx,
}

impl<A, O> Orchestrator<A, O>
where
    A: AdapterStore,
    O: OptimizerStore,
{
    pub fn new(
        config: &DataOptimizerConfig,
        adapter: A,
        optimizer: O,
        environment: EnvironmentInfo,
        connectivity: ConnectivityMonitor,
        readiness_tx: ReadinessTx,
        shutdown_rx: ShutdownRx,
    ) -> Self {
        Self {
            tracker: ProcessorTracker::new(optimizer.clone(), config.retry.clone()),
            adapter,
            optimizer,
            config: config.orchestrator.clone(),
            validation: config.environment_validation.clone(),
            environment,
            connectivity,
            readiness_tx,
            shutdown_rx,
        }
    }

    /// Runs until shutdown. Fails when initialization hits a fatal error, most notably a failed
    /// environment validation.
    pub async fn run(mut self) -> OptimizerResult<()> {
        info!(
            version = %self.environment.version,
            machine_name = %self.environment.machine_name,
            "starting orchestrator"
        );

        loop {
            if self.shutdown_rx.is_shutdown() {
                break;
            }

            let mut shutdown_rx = self.shutdown_rx.clone();
            let step = tokio::select! {
                biased;

                _ = shutdown_rx.wait_for_shutdown() => break,
                step = self.step() => step,
            };

            let wait = match step {
                Ok(wait) => wait,
                Err(err) => {
                    error!(error = %err, "orchestrator failed");
                    return Err(err);
                }
            };

            if self.shutdown_rx.sleep(wait).await {
                break;
            }
        }

        info!("orchestrator stopped");

        Ok(())
    }

    /// Handles the current connectivity state and returns how long to wait before the next step.
    async fn step(&self) -> OptimizerResult<Duration> {
        let state = self.connectivity.current();

        match state.reason {
            WaitingReason::ApplicationNotInitialized => match self.initialize().await {
                Ok(()) => Ok(self.config.idle_interval()),
                Err(err) => match build_error_handling_policy(&err) {
                    ErrorHandlingPolicy::Connectivity(database) => {
                        warn!(
                            %database,
                            error = %err,
                            retry_in_ms = self.config.connectivity_probe_interval_ms,
                            "database unavailable during initialization"
                        );
                        Ok(self.config.connectivity_probe_interval())
                    }
                    ErrorHandlingPolicy::Cancellation => Ok(Duration::ZERO),
                    ErrorHandlingPolicy::Fatal => Err(err),
                },
            },
            WaitingReason::AdapterDatabaseNotAvailable
            | WaitingReason::OptimizerDatabaseNotAvailable => {
                let Some(database) = state.reason.database() else {
                    return Ok(self.config.connectivity_probe_interval());
                };

                match self.probe(database).await {
                    Ok(()) => {
                        info!(%database, "database is reachable again");
                        self.connectivity.set_normal();
                        Ok(self.config.idle_interval())
                    }
                    Err(err) => {
                        debug!(%database, error = %err, "database still unavailable");
                        Ok(self.config.connectivity_probe_interval())
                    }
                }
            }
            WaitingReason::NoReason => {
                self.heartbeat().await;
                Ok(self.config.idle_interval())
            }
        }
    }

    async fn probe(&self, database: Database) -> OptimizerResult<()> {
        match database {
            Database::Adapter => self.adapter.probe().await,
            Database::Optimizer => self.optimizer.probe().await,
        }
    }

    /// Validates the environment and marks the service as ready.
    async fn initialize(&self) -> OptimizerResult<()> {
        try_join(self.adapter.probe(), self.optimizer.probe()).await?;

        let records = self.tracker.get_tracking_list().await?;
        validate_environment(&records, &self.environment, &self.validation)?;

        self.tracker
            .record_environment(ProcessorId::Orchestrator, &self.environment)
            .await?;
        let mut update = TrackingUpdate::queried(ProcessorId::Orchestrator, Utc::now());
        update.entities_processed = true;
        self.tracker.update_tracking_record(&update).await?;

        self.connectivity.set_normal();
        raise(&self.readiness_tx);
        info!(
            known_processors = records.len(),
            "environment validated, the service is ready"
        );

        Ok(())
    }

    /// Refreshes the orchestrator tracking record so it shows up as running.
    async fn heartbeat(&self) {
        let update = TrackingUpdate::queried(ProcessorId::Orchestrator, Utc::now());

        if let Err(err) = self.tracker.update_tracking_record(&update).await {
            if let ErrorHandlingPolicy::Connectivity(database) = build_error_handling_policy(&err) {
                self.connectivity
                    .report_unavailable(database, ProcessorId::Orchestrator.as_static_str());
            } else {
                warn!(error = %err, "failed to refresh the orchestrator tracking record");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::shutdown::create_shutdown_channel;
    use crate::concurrency::signal::create_readiness_signal;
    use crate::error::ErrorKind;
    use crate::store::memory::{MemoryAdapterStore, MemoryOptimizerStore};
    use crate::test_utils::config::test_config;
    use crate::tracker::ProcessorTrackingRecord;

    #[tokio::test]
    async fn initialization_raises_readiness_and_normal_state() {
        let optimizer = MemoryOptimizerStore::new();
        let connectivity = ConnectivityMonitor::new();
        let (readiness_tx, readiness_rx) = create_readiness_signal();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let orchestrator = Orchestrator::new(
            &test_config(),
            MemoryAdapterStore::new(),
            optimizer.clone(),
            EnvironmentInfo::new("1.0.0", "host-a"),
            connectivity.clone(),
            readiness_tx,
            shutdown_rx,
        );

        orchestrator.step().await.unwrap();

        assert!(*readiness_rx.borrow());
        assert!(!connectivity.current().is_waiting());
        let record = optimizer
            .tracking_record(ProcessorId::Orchestrator)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.optimizer_machine_name.as_deref(), Some("host-a"));
        assert!(record.entities_have_been_processed);
    }

    #[tokio::test]
    async fn foreign_tracking_records_are_fatal() {
        let optimizer = MemoryOptimizerStore::new();
        let mut record = ProcessorTrackingRecord::new(ProcessorId::DeviceProcessor);
        record.optimizer_machine_name = Some("host-b".to_owned());
        optimizer.put_tracking_record(record).await;

        let connectivity = ConnectivityMonitor::new();
        let (readiness_tx, readiness_rx) = create_readiness_signal();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let orchestrator = Orchestrator::new(
            &test_config(),
            MemoryAdapterStore::new(),
            optimizer,
            EnvironmentInfo::new("1.0.0", "host-a"),
            connectivity.clone(),
            readiness_tx,
            shutdown_rx,
        );

        let err = orchestrator.run().await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::EnvironmentValidationFailed);
        assert!(!*readiness_rx.borrow());
        assert!(connectivity.current().is_waiting());
    }

    #[tokio::test]
    async fn unreachable_database_is_probed_until_it_answers() {
        let adapter = MemoryAdapterStore::new();
        let connectivity = ConnectivityMonitor::new();
        let (readiness_tx, _readiness_rx) = create_readiness_signal();
        let (_shutdown_tx, shutdown_rx) = create_shutdown_channel();
        let orchestrator = Orchestrator::new(
            &test_config(),
            adapter.clone(),
            MemoryOptimizerStore::new(),
            EnvironmentInfo::new("1.0.0", "host-a"),
            connectivity.clone(),
            readiness_tx,
            shutdown_rx,
        );
        orchestrator.step().await.unwrap();

        adapter.set_available(false).await;
        connectivity.report_unavailable(Database::Adapter, "test");
        let wait = orchestrator.step().await.unwrap();
        assert_eq!(wait, test_config().orchestrator.connectivity_probe_interval());
        assert!(connectivity.current().is_waiting());

        adapter.set_available(true).await;
        orchestrator.step().await.unwrap();
        assert!(!connectivity.current().is_waiting());
    }
}
