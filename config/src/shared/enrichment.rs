use std::fmt;
use std::time::Duration;

use serde::Deserialize;

use crate::shared::processor::{
    default_batch_size, default_enabled, default_execution_interval_secs,
    default_throttle_threshold, validate_batching,
};
use crate::shared::{OperationMode, ValidationError};

/// Number of named buckets a bearing is discretized into.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(try_from = "u8")]
pub enum CompassResolution {
    /// N, E, S, W.
    Four,
    /// N, NE, E, SE, S, SW, W, NW.
    Eight,
    /// The eight above plus the intermediate points such as NNE.
    Sixteen,
}

impl CompassResolution {
    /// Number of buckets in the compass rose.
    pub fn points(&self) -> usize {
        match self {
            CompassResolution::Four => 4,
            CompassResolution::Eight => 8,
            CompassResolution::Sixteen => 16,
        }
    }
}

impl TryFrom<u8> for CompassResolution {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            4 => Ok(CompassResolution::Four),
            8 => Ok(CompassResolution::Eight),
            16 => Ok(CompassResolution::Sixteen),
            other => Err(format!(
                "{other} is not a supported compass resolution, use 4, 8 or 16"
            )),
        }
    }
}

impl fmt::Display for CompassResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.points())
    }
}

/// Position interpolation toggles.
#[derive(Clone, Debug, Deserialize)]
pub struct PositionEnrichmentConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Copies the speed of the preceding position sample.
    #[serde(default = "default_enabled")]
    pub populate_speed: bool,
    /// Computes the bearing between the bracketing samples.
    #[serde(default = "default_enabled")]
    pub populate_bearing: bool,
    /// Names the bearing with a compass direction when set. Requires `populate_bearing`.
    #[serde(default = "default_compass_resolution")]
    pub compass_resolution: Option<CompassResolution>,
}

fn default_compass_resolution() -> Option<CompassResolution> {
    Some(CompassResolution::Sixteen)
}

impl Default for PositionEnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            populate_speed: default_enabled(),
            populate_bearing: default_enabled(),
            compass_resolution: default_compass_resolution(),
        }
    }
}

/// Driver id estimation toggles.
#[derive(Clone, Debug, Deserialize)]
pub struct DriverEnrichmentConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Default for DriverEnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
        }
    }
}

/// Settings of an enrichment optimizer (fault data or status data).
///
/// Each sub-task throttles on its own: a sub-task that found less than `throttle_threshold`
/// candidates is not polled again before `execution_interval_secs` elapsed.
#[derive(Clone, Debug, Deserialize)]
pub struct EnrichmentOptimizerConfig {
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub mode: OperationMode,
    #[serde(default = "default_execution_interval_secs")]
    pub execution_interval_secs: u64,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_throttle_threshold")]
    pub throttle_threshold: usize,
    #[serde(default)]
    pub position: PositionEnrichmentConfig,
    #[serde(default)]
    pub driver_id: DriverEnrichmentConfig,
}

impl Default for EnrichmentOptimizerConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            mode: OperationMode::default(),
            execution_interval_secs: default_execution_interval_secs(),
            batch_size: default_batch_size(),
            throttle_threshold: default_throttle_threshold(),
            position: PositionEnrichmentConfig::default(),
            driver_id: DriverEnrichmentConfig::default(),
        }
    }
}

impl EnrichmentOptimizerConfig {
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
        self.mode.validate(section)?;

        if self.enabled && !self.position.enabled && !self.driver_id.enabled {
            return Err(ValidationError::NoEnrichmentEnabled(section));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compass_resolution_accepts_only_supported_sizes() {
        assert_eq!(
            CompassResolution::try_from(8).unwrap(),
            CompassResolution::Eight
        );
        assert!(CompassResolution::try_from(12).is_err());
    }

    #[test]
    fn position_section_defaults_to_full_enrichment() {
        let config: EnrichmentOptimizerConfig =
            serde_json::from_str(r#"{"position": {"compass_resolution": 4}}"#).unwrap();

        assert!(config.position.enabled);
        assert!(config.position.populate_speed);
        assert_eq!(
            config.position.compass_resolution,
            Some(CompassResolution::Four)
        );
        assert!(config.driver_id.enabled);
    }

    #[test]
    fn enabled_optimizer_without_sub_tasks_is_rejected() {
        let mut config = EnrichmentOptimizerConfig::default();
        config.position.enabled = false;
        config.driver_id.enabled = false;

        assert!(matches!(
            config.validate("fault_data_optimizer"),
            Err(ValidationError::NoEnrichmentEnabled(_))
        ));
    }
}
