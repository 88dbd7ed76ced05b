use std::time::Duration;

use serde::Deserialize;

use crate::load::Config;
use crate::shared::{
    EnrichmentOptimizerConfig, PgConnectionConfig, ProcessorsConfig, RetryConfig,
    ValidationError,
};

/// Top-level configuration of the data optimizer service.
#[derive(Clone, Debug, Deserialize)]
pub struct DataOptimizerConfig {
    /// Database the upstream feed lands rows into.
    pub adapter_database: PgConnectionConfig,
    /// Database the optimizer migrates and enriches rows into.
    pub optimizer_database: PgConnectionConfig,
    #[serde(default)]
    pub environment_validation: EnvironmentValidationConfig,
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,
    #[serde(default)]
    pub prerequisites: PrerequisiteConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub processors: ProcessorsConfig,
    #[serde(default)]
    pub fault_data_optimizer: EnrichmentOptimizerConfig,
    #[serde(default)]
    pub status_data_optimizer: EnrichmentOptimizerConfig,
}

impl Config for DataOptimizerConfig {
    fn validate(&self) -> Result<(), ValidationError> {
        self.adapter_database.validate()?;
        self.optimizer_database.validate()?;
        self.orchestrator.validate()?;
        self.prerequisites.validate()?;
        self.retry.validate()?;
        self.processors.validate()?;
        self.fault_data_optimizer.validate("fault_data_optimizer")?;
        self.status_data_optimizer.validate("status_data_optimizer")
    }
}

/// Guards against unsafe redeployments detected from the processor tracking records.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct EnvironmentValidationConfig {
    /// Accept tracking records written by a different host.
    #[serde(default)]
    pub allow_machine_name_change: bool,
    /// Accept tracking records written by a newer version of the service.
    #[serde(default)]
    pub allow_version_downgrade: bool,
}

/// Timing of the orchestrator loop.
#[derive(Clone, Debug, Deserialize)]
pub struct OrchestratorConfig {
    /// Interval between reachability probes while a database is unavailable.
    #[serde(default = "default_connectivity_probe_interval_ms")]
    pub connectivity_probe_interval_ms: u64,
    /// Interval between two checks of the connectivity state while everything is healthy.
    #[serde(default = "default_idle_interval_ms")]
    pub idle_interval_ms: u64,
}

fn default_connectivity_probe_interval_ms() -> u64 {
    5_000
}

fn default_idle_interval_ms() -> u64 {
    1_000
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            connectivity_probe_interval_ms: default_connectivity_probe_interval_ms(),
            idle_interval_ms: default_idle_interval_ms(),
        }
    }
}

impl OrchestratorConfig {
    pub fn connectivity_probe_interval(&self) -> Duration {
        Duration::from_millis(self.connectivity_probe_interval_ms)
    }

    pub fn idle_interval(&self) -> Duration {
        Duration::from_millis(self.idle_interval_ms)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.connectivity_probe_interval_ms == 0 {
            return Err(ValidationError::IntervalZero(
                "orchestrator.connectivity_probe_interval_ms",
            ));
        }

        if self.idle_interval_ms == 0 {
            return Err(ValidationError::IntervalZero("orchestrator.idle_interval_ms"));
        }

        Ok(())
    }
}

/// Settings of the prerequisite gate every dependent worker waits on.
#[derive(Clone, Debug, Deserialize)]
pub struct PrerequisiteConfig {
    /// Sleep between two evaluations while a prerequisite is not satisfied.
    #[serde(default = "default_check_interval_ms")]
    pub check_interval_ms: u64,
    /// A prerequisite whose last query is older than this is not considered running.
    #[serde(default = "default_max_inactivity_secs")]
    pub max_inactivity_secs: u64,
}

fn default_check_interval_ms() -> u64 {
    10_000
}

fn default_max_inactivity_secs() -> u64 {
    600
}

impl Default for PrerequisiteConfig {
    fn default() -> Self {
        Self {
            check_interval_ms: default_check_interval_ms(),
            max_inactivity_secs: default_max_inactivity_secs(),
        }
    }
}

impl PrerequisiteConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_millis(self.check_interval_ms)
    }

    pub fn max_inactivity(&self) -> Duration {
        Duration::from_secs(self.max_inactivity_secs)
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.check_interval_ms == 0 {
            return Err(ValidationError::IntervalZero("prerequisites.check_interval_ms"));
        }

        if self.max_inactivity_secs == 0 {
            return Err(ValidationError::IntervalZero(
                "prerequisites.max_inactivity_secs",
            ));
        }

        Ok(())
    }
}
