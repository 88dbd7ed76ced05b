//! The loop every migration and enrichment worker runs in.

use std::time::Duration;

use chrono::Utc;
use config::shared::OperationMode;
use tracing::{error, info, warn};

use crate::concurrency::connectivity::ConnectivityMonitor;
use crate::concurrency::shutdown::ShutdownRx;
use crate::concurrency::signal::{ReadinessRx, wait_until_ready};
use crate::environment::EnvironmentInfo;
use crate::error::{ErrorKind, OptimizerError, OptimizerResult};
use crate::gate::PrerequisiteGate;
use crate::optimizer_error;
use crate::schedule::time_until_window;
use crate::store::base::OptimizerStore;
use crate::tracker::ProcessorTracker;
use crate::types::ProcessorId;
use crate::workers::base::{IterationOutcome, Worker};
use crate::workers::policy::{ErrorHandlingPolicy, build_error_handling_policy};

/// Pause between two connectivity checks while the service waits for a database.
const WAITING_RECHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Shared services a worker loop needs.
#[derive(Debug, Clone)]
pub struct WorkerContext<O> {
    pub connectivity: ConnectivityMonitor,
    pub readiness_rx: ReadinessRx,
    pub shutdown_rx: ShutdownRx,
    pub gate: PrerequisiteGate<O>,
    pub tracker: ProcessorTracker<O>,
    pub environment: EnvironmentInfo,
}

/// Result of handling an error that escaped the worker.
enum Recovery {
    Resume,
    Stop,
}

/// Runs `worker` until shutdown or a fatal error.
///
/// Connectivity errors never end the loop. They move the service into the waiting state, and
/// the loop pauses until the orchestrator reports the database reachable again. Only errors
/// classified as fatal are returned.
pub async fn run_worker<W, O>(mut worker: W, context: WorkerContext<O>) -> OptimizerResult<()>
where
    W: Worker,
    O: OptimizerStore,
{
    let WorkerContext {
        connectivity,
        mut readiness_rx,
        mut shutdown_rx,
        gate,
        tracker,
        environment,
    } = context;
    let id = worker.id();
    let prerequisites = worker.prerequisites();
    let mode = worker.mode();
    let mut gate_shutdown_rx = shutdown_rx.clone();

    let ready = tokio::select! {
        biased;

        _ = shutdown_rx.wait_for_shutdown() => false,
        ready = wait_until_ready(&mut readiness_rx) => ready,
    };
    if !ready {
        info!(processor = %id, "shutdown requested before the service became ready");
        return Ok(());
    }

    info!(processor = %id, "starting worker");

    loop {
        if shutdown_rx.is_shutdown() {
            return Ok(());
        }

        if connectivity.current().is_waiting() {
            if shutdown_rx.sleep(WAITING_RECHECK_INTERVAL).await {
                return Ok(());
            }
            continue;
        }

        let started = async {
            tracker.record_environment(id, &environment).await?;
            worker.start().await
        };
        let result = tokio::select! {
            biased;

            _ = shutdown_rx.wait_for_shutdown() => Err(canceled()),
            result = started => result,
        };

        match result {
            Ok(()) => break,
            Err(err) => match recover(&connectivity, &mut shutdown_rx, id, err).await? {
                Recovery::Resume => continue,
                Recovery::Stop => return Ok(()),
            },
        }
    }

    let result = run_loop(
        &mut worker,
        &connectivity,
        &mut shutdown_rx,
        &mut gate_shutdown_rx,
        &gate,
        &prerequisites,
        mode,
    )
    .await;

    worker.stop().await;
    match &result {
        Ok(()) => info!(processor = %id, "worker stopped"),
        Err(err) => error!(processor = %id, error = %err, "worker failed"),
    }

    result
}

async fn run_loop<W, O>(
    worker: &mut W,
    connectivity: &ConnectivityMonitor,
    shutdown_rx: &mut ShutdownRx,
    gate_shutdown_rx: &mut ShutdownRx,
    gate: &PrerequisiteGate<O>,
    prerequisites: &[ProcessorId],
    mode: OperationMode,
) -> OptimizerResult<()>
where
    W: Worker,
    O: OptimizerStore,
{
    let id = worker.id();

    loop {
        if shutdown_rx.is_shutdown() {
            return Ok(());
        }

        if let Some(wait) = time_until_window(&mode, Utc::now()) {
            info!(processor = %id, wait_secs = wait.as_secs(), "outside of the scheduled window");
            if shutdown_rx.sleep(wait).await {
                return Ok(());
            }
            continue;
        }

        if connectivity.current().is_waiting() {
            if shutdown_rx.sleep(WAITING_RECHECK_INTERVAL).await {
                return Ok(());
            }
            continue;
        }

        let iteration = async {
            gate.wait_until_satisfied(id, prerequisites, gate_shutdown_rx)
                .await?;
            if connectivity.current().is_waiting() {
                return Ok(IterationOutcome::Sleep(WAITING_RECHECK_INTERVAL));
            }

            worker.run_iteration().await
        };
        let result = tokio::select! {
            biased;

            _ = shutdown_rx.wait_for_shutdown() => Err(canceled()),
            result = iteration => result,
        };

        match result {
            Ok(IterationOutcome::Continue) => {}
            Ok(IterationOutcome::Sleep(duration)) => {
                if shutdown_rx.sleep(duration).await {
                    return Ok(());
                }
            }
            Err(err) => match recover(connectivity, shutdown_rx, id, err).await? {
                Recovery::Resume => {}
                Recovery::Stop => return Ok(()),
            },
        }
    }
}

fn canceled() -> OptimizerError {
    optimizer_error!(
        ErrorKind::OperationCanceled,
        "Shutdown requested while the worker was busy"
    )
}

/// Applies the error handling policy. Fatal errors are returned.
async fn recover(
    connectivity: &ConnectivityMonitor,
    shutdown_rx: &mut ShutdownRx,
    id: ProcessorId,
    err: OptimizerError,
) -> OptimizerResult<Recovery> {
    match build_error_handling_policy(&err) {
        ErrorHandlingPolicy::Connectivity(database) => {
            warn!(processor = %id, %database, error = %err, "database unavailable, pausing worker");
            connectivity.report_unavailable(database, id.as_static_str());

            if shutdown_rx.sleep(WAITING_RECHECK_INTERVAL).await {
                return Ok(Recovery::Stop);
            }

            Ok(Recovery::Resume)
        }
        ErrorHandlingPolicy::Cancellation => {
            warn!(processor = %id, "worker canceled");
            Ok(Recovery::Stop)
        }
        ErrorHandlingPolicy::Fatal => Err(err),
    }
}
