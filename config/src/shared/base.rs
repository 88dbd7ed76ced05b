use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// TLS is enabled but no trusted root certificates are provided.
    #[error("Invalid TLS config: `trusted_root_certs` must be set when `enabled` is true")]
    MissingTrustedRootCerts,
    /// A database pool must allow at least one connection.
    #[error("`max_connections` cannot be zero")]
    MaxConnectionsZero,
    /// Retry attempts cannot be zero.
    #[error("`retry.max_attempts` cannot be zero")]
    RetryMaxAttemptsZero,
    /// The retry backoff factor must not shrink delays.
    #[error("`retry.backoff_factor` must be at least 1.0, got {0}")]
    RetryBackoffFactorTooSmall(f64),
    /// A worker batch size cannot be zero.
    #[error("`{0}.batch_size` cannot be zero")]
    BatchSizeZero(&'static str),
    /// A worker execution interval cannot be zero.
    #[error("`{0}.execution_interval_secs` cannot be zero")]
    ExecutionIntervalZero(&'static str),
    /// The throttle threshold cannot exceed the batch size, otherwise the worker always throttles.
    #[error("`{0}.throttle_threshold` cannot be greater than `batch_size`")]
    ThrottleThresholdAboveBatchSize(&'static str),
    /// Scheduled run durations must be within one day.
    #[error("`{0}.mode.run_duration_secs` must be between 1 and 86400")]
    InvalidRunDuration(&'static str),
    /// An interval used by the coordination layer cannot be zero.
    #[error("`{0}` cannot be zero")]
    IntervalZero(&'static str),
    /// An enrichment optimizer is enabled without any sub-task enabled.
    #[error("`{0}` is enabled but neither `position` nor `driver_id` enrichment is enabled")]
    NoEnrichmentEnabled(&'static str),
}
