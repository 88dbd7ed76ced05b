use std::future::Future;
use std::time::Duration;

use config::shared::OperationMode;

use crate::error::OptimizerResult;
use crate::types::ProcessorId;

/// What the worker loop does after a successful iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IterationOutcome {
    /// Run the next iteration right away.
    Continue,
    /// The iteration found little work, sleep before the next one.
    Sleep(Duration),
}

/// A long-running unit of work driven by [`crate::workers::driver::run_worker`].
///
/// The driver owns the loop: it waits for readiness, honors the operation mode, pauses while a
/// database is unavailable and checks prerequisites before every iteration. Implementations only
/// describe a single iteration.
pub trait Worker: Send + 'static {
    fn id(&self) -> ProcessorId;

    /// Workers that must be running and have processed entities before this one iterates.
    fn prerequisites(&self) -> Vec<ProcessorId>;

    fn mode(&self) -> OperationMode;

    /// Prepares the worker, for example loads its resume point. Called once before the first
    /// iteration and again after a failed start.
    fn start(&mut self) -> impl Future<Output = OptimizerResult<()>> + Send;

    fn run_iteration(&mut self) -> impl Future<Output = OptimizerResult<IterationOutcome>> + Send;

    /// Called once when the loop ends, whatever the reason.
    fn stop(&mut self) -> impl Future<Output = ()> + Send {
        async {}
    }
}

/// Whether a worker that fetched `fetched` rows should sleep before its next iteration.
///
/// A full batch means a backlog, so the worker keeps going.
pub fn should_throttle(fetched: usize, throttle_threshold: usize) -> bool {
    fetched < throttle_threshold
}
