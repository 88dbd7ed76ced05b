use config::shared::DataOptimizerConfig;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::concurrency::connectivity::ConnectivityMonitor;
use crate::concurrency::shutdown::{ShutdownTx, create_shutdown_channel};
use crate::concurrency::signal::create_readiness_signal;
use crate::environment::EnvironmentInfo;
use crate::error::{OptimizerError, OptimizerResult};
use crate::gate::PrerequisiteGate;
use crate::store::base::{AdapterStore, OptimizerStore};
use crate::tracker::ProcessorTracker;
use crate::types::{EnrichedTable, ProcessorId};
use crate::workers::base::Worker;
use crate::workers::driver::{WorkerContext, run_worker};
use crate::workers::enrichment::EnrichmentOptimizer;
use crate::workers::orchestrator::Orchestrator;
use crate::workers::processors::ProcessorFactory;

type WorkerTasks = JoinSet<(ProcessorId, OptimizerResult<()>)>;

#[derive(Debug)]
enum PipelineState {
    NotStarted,
    Started { tasks: WorkerTasks },
}

/// The whole service: the orchestrator, the eight processors and the two enrichment optimizers
/// running concurrently against one pair of databases.
///
/// The first worker failing with a fatal error shuts every other worker down.
#[derive(Debug)]
pub struct DataOptimizer<A, O> {
    config: DataOptimizerConfig,
    adapter: A,
    optimizer: O,
    environment: EnvironmentInfo,
    connectivity: ConnectivityMonitor,
    state: PipelineState,
    shutdown_tx: ShutdownTx,
}

impl<A, O> DataOptimizer<A, O>
where
    A: AdapterStore,
    O: OptimizerStore,
{
    pub fn new(
        config: DataOptimizerConfig,
        adapter: A,
        optimizer: O,
        environment: EnvironmentInfo,
    ) -> Self {
        let (shutdown_tx, _) = create_shutdown_channel();

        Self {
            config,
            adapter,
            optimizer,
            environment,
            connectivity: ConnectivityMonitor::new(),
            state: PipelineState::NotStarted,
            shutdown_tx,
        }
    }

    pub fn shutdown_tx(&self) -> ShutdownTx {
        self.shutdown_tx.clone()
    }

    pub fn connectivity(&self) -> ConnectivityMonitor {
        self.connectivity.clone()
    }

    /// Spawns every enabled worker. Workers other than the orchestrator idle until it has
    /// validated the environment.
    pub async fn start(&mut self) -> OptimizerResult<()> {
        info!(
            version = %self.environment.version,
            machine_name = %self.environment.machine_name,
            "starting data optimizer"
        );

        let (readiness_tx, readiness_rx) = create_readiness_signal();
        let mut tasks = JoinSet::new();

        let orchestrator = Orchestrator::new(
            &self.config,
            self.adapter.clone(),
            self.optimizer.clone(),
            self.environment.clone(),
            self.connectivity.clone(),
            readiness_tx,
            self.shutdown_tx.subscribe(),
        );
        tasks.spawn(async move { (ProcessorId::Orchestrator, orchestrator.run().await) });

        let tracker = ProcessorTracker::new(self.optimizer.clone(), self.config.retry.clone());
        let context = WorkerContext {
            connectivity: self.connectivity.clone(),
            readiness_rx,
            shutdown_rx: self.shutdown_tx.subscribe(),
            gate: PrerequisiteGate::new(tracker.clone(), self.config.prerequisites.clone()),
            tracker,
            environment: self.environment.clone(),
        };

        let factory = ProcessorFactory::new(
            self.adapter.clone(),
            self.optimizer.clone(),
            self.config.retry.clone(),
        );
        let processors = &self.config.processors;

        spawn_if(
            &mut tasks,
            processors.device.enabled,
            factory.device(&processors.device),
            &context,
        );
        spawn_if(
            &mut tasks,
            processors.user.enabled,
            factory.user(&processors.user),
            &context,
        );
        spawn_if(
            &mut tasks,
            processors.diagnostic.enabled,
            factory.diagnostic(&processors.diagnostic),
            &context,
        );
        spawn_if(
            &mut tasks,
            processors.log_record.enabled,
            factory.log_record(&processors.log_record),
            &context,
        );
        spawn_if(
            &mut tasks,
            processors.status_data.enabled,
            factory.status_data(&processors.status_data),
            &context,
        );
        spawn_if(
            &mut tasks,
            processors.fault_data.enabled,
            factory.fault_data(&processors.fault_data),
            &context,
        );
        spawn_if(
            &mut tasks,
            processors.binary_data.enabled,
            factory.binary_data(&processors.binary_data),
            &context,
        );
        spawn_if(
            &mut tasks,
            processors.driver_change.enabled,
            factory.driver_change(&processors.driver_change),
            &context,
        );

        for (table, config) in [
            (EnrichedTable::FaultData, &self.config.fault_data_optimizer),
            (EnrichedTable::StatusData, &self.config.status_data_optimizer),
        ] {
            let optimizer = EnrichmentOptimizer::new(
                table,
                config.clone(),
                self.optimizer.clone(),
                self.config.retry.clone(),
            );
            spawn_if(&mut tasks, config.enabled, optimizer, &context);
        }

        info!(workers = tasks.len(), "data optimizer started");
        self.state = PipelineState::Started { tasks };

        Ok(())
    }

    /// Waits for every worker to end and returns the failures of all of them.
    pub async fn wait(self) -> OptimizerResult<()> {
        let PipelineState::Started { mut tasks } = self.state else {
            info!("data optimizer was not started, nothing to wait for");

            return Ok(());
        };

        let mut errors: Vec<OptimizerError> = Vec::new();

        while let Some(joined) = tasks.join_next().await {
            let err = match joined {
                Ok((id, Ok(()))) => {
                    info!(processor = %id, "worker ended");
                    continue;
                }
                Ok((id, Err(err))) => {
                    error!(processor = %id, error = %err, "worker failed");
                    err
                }
                Err(join_err) => {
                    error!(error = %join_err, "worker task panicked");
                    OptimizerError::from(join_err)
                }
            };
            errors.push(err);

            // Nobody listening means every worker already ended.
            let _ = self.shutdown_tx.shutdown();
        }

        if !errors.is_empty() {
            return Err(errors.into());
        }

        info!("data optimizer stopped");

        Ok(())
    }

    pub fn shutdown(&self) {
        info!("shutting down the data optimizer");

        if let Err(err) = self.shutdown_tx.shutdown() {
            error!(error = %err, "failed to send the shutdown signal to the workers");
        }
    }

    pub async fn shutdown_and_wait(self) -> OptimizerResult<()> {
        self.shutdown();
        self.wait().await
    }
}

fn spawn_if<W, O>(tasks: &mut WorkerTasks, enabled: bool, worker: W, context: &WorkerContext<O>)
where
    W: Worker,
    O: OptimizerStore,
{
    let id = worker.id();
    if !enabled {
        info!(processor = %id, "worker disabled by configuration");
        return;
    }

    let context = context.clone();
    tasks.spawn(async move { (id, run_worker(worker, context).await) });
}
