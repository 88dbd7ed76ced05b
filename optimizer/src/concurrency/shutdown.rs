use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

/// Sending side of the shutdown signal.
///
/// Cloning is cheap; every clone signals the same receivers.
#[derive(Debug, Clone)]
pub struct ShutdownTx(Arc<watch::Sender<bool>>);

impl ShutdownTx {
    /// Asks every worker to stop at its next cancellation point.
    pub fn shutdown(&self) -> Result<(), watch::error::SendError<bool>> {
        self.0.send(true)
    }

    /// Creates a receiver. Receivers created after [`ShutdownTx::shutdown`] observe the
    /// shutdown immediately.
    pub fn subscribe(&self) -> ShutdownRx {
        ShutdownRx(self.0.subscribe())
    }
}

/// Receiving side of the shutdown signal.
#[derive(Debug, Clone)]
pub struct ShutdownRx(watch::Receiver<bool>);

impl ShutdownRx {
    /// Returns `true` once shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        *self.0.borrow()
    }

    /// Resolves once shutdown was requested or the sender is gone.
    pub async fn wait_for_shutdown(&mut self) {
        let _ = self.0.wait_for(|shutdown| *shutdown).await;
    }

    /// Sleeps for `duration` unless shutdown is requested first.
    ///
    /// Returns `true` when the sleep was interrupted by shutdown.
    pub async fn sleep(&mut self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.wait_for_shutdown() => true,
            _ = tokio::time::sleep(duration) => self.is_shutdown(),
        }
    }
}

/// Creates a new shutdown channel in the running state.
pub fn create_shutdown_channel() -> (ShutdownTx, ShutdownRx) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTx(Arc::new(tx)), ShutdownRx(rx))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn late_subscribers_observe_shutdown() {
        let (tx, rx) = create_shutdown_channel();
        assert!(!rx.is_shutdown());

        tx.shutdown().unwrap();

        let mut late = tx.subscribe();
        assert!(late.is_shutdown());
        late.wait_for_shutdown().await;
    }

    #[tokio::test]
    async fn sleep_is_interrupted_by_shutdown() {
        let (tx, mut rx) = create_shutdown_channel();

        let sleeper = tokio::spawn(async move { rx.sleep(Duration::from_secs(3600)).await });
        tokio::task::yield_now().await;
        tx.shutdown().unwrap();

        assert!(sleeper.await.unwrap());
    }
}
