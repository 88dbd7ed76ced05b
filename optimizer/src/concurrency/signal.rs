//! Readiness signal raised by the orchestrator.
//!
//! Every worker except the orchestrator waits for it before its first iteration. The signal is
//! level triggered, so a worker started after readiness was raised does not wait at all.

use tokio::sync::watch;

pub type ReadinessTx = watch::Sender<bool>;

pub type ReadinessRx = watch::Receiver<bool>;

/// Creates a readiness channel in the "not ready" state.
pub fn create_readiness_signal() -> (ReadinessTx, ReadinessRx) {
    watch::channel(false)
}

/// Marks the application as initialized.
pub fn raise(tx: &ReadinessTx) {
    tx.send_replace(true);
}

/// Waits until the application is initialized.
///
/// Returns `false` if the sending side was dropped before readiness was raised.
pub async fn wait_until_ready(rx: &mut ReadinessRx) -> bool {
    rx.wait_for(|ready| *ready).await.is_ok()
}
