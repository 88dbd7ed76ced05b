use std::future::Future;
use std::time::Duration;

use config::shared::RetryConfig;
use rand::Rng;
use tracing::warn;

use crate::error::{ErrorKind, OptimizerError, OptimizerResult};
use crate::optimizer_error;
use crate::types::Database;

/// Error kinds every database transaction is retried on.
pub const TRANSIENT_ERROR_KINDS: &[ErrorKind] = &[
    ErrorKind::AdapterDatabaseUnavailable,
    ErrorKind::OptimizerDatabaseUnavailable,
    ErrorKind::AdapterTransactionConflict,
    ErrorKind::OptimizerTransactionConflict,
];

/// Delay before attempt `attempt + 1`, growing exponentially up to the configured maximum with up
/// to 30% random jitter on top.
pub fn calculate_backoff(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
    let base_delay_ms = config.initial_delay_ms as f64 * config.backoff_factor.powi(exponent);
    let capped_delay_ms = base_delay_ms.min(config.max_delay_ms as f64);

    let jitter_factor = rand::rng().random::<f64>() * 0.3;
    Duration::from_millis((capped_delay_ms * (1.0 + jitter_factor)) as u64)
}

/// Runs `operation` until it succeeds, fails with a kind outside `retryable` or runs out of
/// attempts.
///
/// When attempts run out the last error is converted into the connectivity error of the database
/// it came from, or of `database` when the error does not name one. Workers turn that error into
/// a connectivity state transition instead of crashing.
pub async fn retry_with_backoff<T, F, Fut>(
    config: &RetryConfig,
    retryable: &[ErrorKind],
    database: Database,
    mut operation: F,
) -> OptimizerResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = OptimizerResult<T>>,
{
    let mut attempt = 0;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !retryable.contains(&err.kind()) {
            return Err(err);
        }

        if attempt >= config.max_attempts {
            return Err(exhausted(err, database, attempt));
        }

        let delay = calculate_backoff(config, attempt);
        warn!(
            %database,
            error_kind = ?err.kind(),
            attempt,
            delay_ms = delay.as_millis() as u64,
            "transient database error, retrying after backoff"
        );

        tokio::time::sleep(delay).await;
    }
}

fn exhausted(err: OptimizerError, fallback: Database, attempts: u32) -> OptimizerError {
    let kind = err.kind();
    if matches!(
        kind,
        ErrorKind::AdapterDatabaseUnavailable | ErrorKind::OptimizerDatabaseUnavailable
    ) {
        return err;
    }

    let database = kind.database().unwrap_or(fallback);
    optimizer_error!(
        ErrorKind::unavailable(database),
        "Database operation kept failing after retries",
        format!("gave up after {attempts} attempts, last error kind was {kind:?}"),
        source: err
    )
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use super::*;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay_ms: 1,
            max_delay_ms: 2,
            backoff_factor: 2.0,
        }
    }

    #[test]
    fn backoff_grows_and_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay_ms: 100,
            max_delay_ms: 1_000,
            backoff_factor: 2.0,
        };

        let first = calculate_backoff(&config, 1);
        assert!(first >= Duration::from_millis(100) && first <= Duration::from_millis(130));

        let third = calculate_backoff(&config, 3);
        assert!(third >= Duration::from_millis(400) && third <= Duration::from_millis(520));

        let capped = calculate_backoff(&config, 9);
        assert!(capped >= Duration::from_millis(1_000) && capped <= Duration::from_millis(1_300));
    }

    #[tokio::test]
    async fn transient_errors_are_retried_until_success() {
        let calls = Arc::new(AtomicU32::new(0));

        let result = retry_with_backoff(
            &fast_config(5),
            TRANSIENT_ERROR_KINDS,
            Database::Optimizer,
            || {
                let calls = calls.clone();
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(optimizer_error!(
                            ErrorKind::OptimizerTransactionConflict,
                            "conflict"
                        ))
                    } else {
                        Ok(42)
                    }
                }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_errors_fail_immediately() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: OptimizerResult<()> = retry_with_backoff(
            &fast_config(5),
            TRANSIENT_ERROR_KINDS,
            Database::Adapter,
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(optimizer_error!(ErrorKind::AdapterQueryFailed, "bad query"))
                }
            },
        )
        .await;

        assert_eq!(result.unwrap_err().kind(), ErrorKind::AdapterQueryFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_conflicts_become_connectivity_errors() {
        let calls = Arc::new(AtomicU32::new(0));

        let result: OptimizerResult<()> = retry_with_backoff(
            &fast_config(3),
            TRANSIENT_ERROR_KINDS,
            Database::Optimizer,
            || {
                let calls = calls.clone();
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(optimizer_error!(
                        ErrorKind::AdapterTransactionConflict,
                        "conflict"
                    ))
                }
            },
        )
        .await;

        assert_eq!(
            result.unwrap_err().kind(),
            ErrorKind::AdapterDatabaseUnavailable
        );
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}
