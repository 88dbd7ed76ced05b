use std::future::Future;
use std::time::Duration;

use tokio::time::{Instant, sleep};

/// Default time a condition gets to become true.
///
/// Worker loops in tests run with intervals of a few milliseconds up to a second, nothing should
/// take longer than this.
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(20);

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls `condition` until it returns `true`.
///
/// # Panics
///
/// Panics when [`DEFAULT_WAIT_TIMEOUT`] elapses first, so a test fails instead of hanging.
pub async fn wait_until<F, Fut>(description: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + DEFAULT_WAIT_TIMEOUT;

    loop {
        if condition().await {
            return;
        }

        if Instant::now() >= deadline {
            panic!("timed out after {DEFAULT_WAIT_TIMEOUT:?} waiting until {description}");
        }

        sleep(POLL_INTERVAL).await;
    }
}
