use std::time::Duration;

use chrono::NaiveTime;
use serde::Deserialize;

use crate::shared::ValidationError;

/// Number of seconds in one day, the upper bound of a scheduled run.
const SECONDS_PER_DAY: u64 = 86_400;

/// How a worker decides when it is allowed to run.
#[derive(Clone, Copy, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OperationMode {
    /// The worker runs at all times.
    #[default]
    Continuous,
    /// The worker runs once a day, starting at `daily_start_time` (UTC) for `run_duration_secs`.
    ///
    /// A window may cross midnight.
    Scheduled {
        daily_start_time: NaiveTime,
        run_duration_secs: u64,
    },
}

impl OperationMode {
    pub fn validate(&self, section: &'static str) -> Result<(), ValidationError> {
        match self {
            OperationMode::Scheduled {
                run_duration_secs, ..
            } if *run_duration_secs == 0 || *run_duration_secs > SECONDS_PER_DAY => {
                Err(ValidationError::InvalidRunDuration(section))
            }
            _ => Ok(()),
        }
    }
}

/// Settings shared by every ETL processor.
#[derive(Clone, Debug, Deserialize)]
pub struct ProcessorConfig {
    /// Whether the processor is started at all.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Continuous or scheduled operation.
    #[serde(default)]
    pub mode: OperationMode,
    /// Sleep applied after an iteration that found less than `throttle_threshold` rows.
    #[serde(default = "default_execution_interval_secs")]
    pub execution_interval_secs: u64,
    /// Maximum number of rows fetched per iteration.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// Batches smaller than this make the processor sleep for the execution interval.
    #[serde(default = "default_throttle_threshold")]
    pub throttle_threshold: usize,
}

pub(crate) fn default_enabled() -> bool {
    true
}

pub(crate) fn default_execution_interval_secs() -> u64 {
    60
}

pub(crate) fn default_batch_size() -> usize {
    5_000
}

pub(crate) fn default_throttle_threshold() -> usize {
    1_000
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            mode: OperationMode::default(),
            execution_interval_secs: default_execution_interval_secs(),
            batch_size: default_batch_size(),
            throttle_threshold: default_throttle_threshold(),
        }
    }
}

impl ProcessorConfig {
    pub fn execution_interval(&self) -> Duration {
        Duration::from_secs(self.execution_interval_secs)
    }

    pub fn validate(&self, section: &'static str) -> Result<(), ValidationError> {
        validate_batching(
            section,
            self.batch_size,
            self.throttle_threshold,
            self.execution_interval_secs,
        )?;
        self.mode.validate(section)
    }
}

pub(crate) fn validate_batching(
    section: &'static str,
    batch_size: usize,
    throttle_threshold: usize,
    execution_interval_secs: u64,
) -> Result<(), ValidationError> {
    if batch_size == 0 {
        return Err(ValidationError::BatchSizeZero(section));
    }

    if execution_interval_secs == 0 {
        return Err(ValidationError::ExecutionIntervalZero(section));
    }

    if throttle_threshold > batch_size {
        return Err(ValidationError::ThrottleThresholdAboveBatchSize(section));
    }

    Ok(())
}

/// Settings of the eight ETL processors, one section per entity.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ProcessorsConfig {
    #[serde(default)]
    pub binary_data: ProcessorConfig,
    #[serde(default)]
    pub device: ProcessorConfig,
    #[serde(default)]
    pub diagnostic: ProcessorConfig,
    #[serde(default)]
    pub driver_change: ProcessorConfig,
    #[serde(default)]
    pub fault_data: ProcessorConfig,
    #[serde(default)]
    pub log_record: ProcessorConfig,
    #[serde(default)]
    pub status_data: ProcessorConfig,
    #[serde(default)]
    pub user: ProcessorConfig,
}

impl ProcessorsConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.binary_data.validate("processors.binary_data")?;
        self.device.validate("processors.device")?;
        self.diagnostic.validate("processors.diagnostic")?;
        self.driver_change.validate("processors.driver_change")?;
        self.fault_data.validate("processors.fault_data")?;
        self.log_record.validate("processors.log_record")?;
        self.status_data.validate("processors.status_data")?;
        self.user.validate("processors.user")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduled_mode_deserializes_from_tagged_map() {
        let mode: OperationMode = serde_json::from_str(
            r#"{"type": "scheduled", "daily_start_time": "22:30:00", "run_duration_secs": 7200}"#,
        )
        .unwrap();

        assert_eq!(
            mode,
            OperationMode::Scheduled {
                daily_start_time: NaiveTime::from_hms_opt(22, 30, 0).unwrap(),
                run_duration_secs: 7200,
            }
        );
    }

    #[test]
    fn throttle_threshold_above_batch_size_is_rejected() {
        let config = ProcessorConfig {
            batch_size: 10,
            throttle_threshold: 11,
            ..ProcessorConfig::default()
        };

        assert!(matches!(
            config.validate("processors.device"),
            Err(ValidationError::ThrottleThresholdAboveBatchSize("processors.device"))
        ));
    }

    #[test]
    fn run_duration_longer_than_a_day_is_rejected() {
        let config = ProcessorConfig {
            mode: OperationMode::Scheduled {
                daily_start_time: NaiveTime::MIN,
                run_duration_secs: SECONDS_PER_DAY + 1,
            },
            ..ProcessorConfig::default()
        };

        assert!(config.validate("processors.user").is_err());
    }
}
