use std::io;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::environment::Environment;
use crate::shared::ValidationError;

/// Directory holding `base.yaml` and one overlay per environment, relative to the working
/// directory.
const CONFIGURATION_DIR: &str = "configuration";

const BASE_FILE_STEM: &str = "base";

/// Prefix and separators of environment overrides, e.g. `APP_OPTIMIZER_DATABASE__HOST`.
const ENV_PREFIX: &str = "APP";
const ENV_PREFIX_SEPARATOR: &str = "_";
const ENV_SEPARATOR: &str = "__";

/// Implemented by top-level configuration structures.
///
/// Loading fails when [`Config::validate`] rejects the deserialized value, so a running service
/// never observes an inconsistent configuration.
pub trait Config {
    /// Checks cross-field constraints that serde cannot express.
    fn validate(&self) -> Result<(), ValidationError>;
}

#[derive(Debug, Error)]
pub enum LoadConfigError {
    #[error("failed to determine the current directory: {0}")]
    CurrentDir(#[source] io::Error),

    #[error("failed to determine runtime environment: {0}")]
    Environment(#[from] io::Error),

    #[error("failed to read configuration from `{directory}`: {source}")]
    Read {
        directory: PathBuf,
        source: rust_cli_config::ConfigError,
    },

    #[error("failed to deserialize configuration: {0}")]
    Deserialization(#[source] rust_cli_config::ConfigError),

    #[error("invalid configuration: {0}")]
    Validation(#[from] ValidationError),
}

/// Loads and validates the configuration of the runtime environment from `./configuration`.
pub fn load_config<T>() -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let directory = std::env::current_dir()
        .map_err(LoadConfigError::CurrentDir)?
        .join(CONFIGURATION_DIR);
    let environment = Environment::load()?;

    load_config_from(&directory, environment)
}

/// Layers `base.yaml`, `{environment}.yaml` and the `APP_` environment overrides, in that order.
pub fn load_config_from<T>(directory: &Path, environment: Environment) -> Result<T, LoadConfigError>
where
    T: Config + DeserializeOwned,
{
    let settings = rust_cli_config::Config::builder()
        .add_source(rust_cli_config::File::from(yaml_path(directory, BASE_FILE_STEM)))
        .add_source(rust_cli_config::File::from(yaml_path(
            directory,
            environment.as_str(),
        )))
        .add_source(
            rust_cli_config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator(ENV_PREFIX_SEPARATOR)
                .separator(ENV_SEPARATOR),
        )
        .build()
        .map_err(|source| LoadConfigError::Read {
            directory: directory.to_path_buf(),
            source,
        })?;

    let config = settings
        .try_deserialize::<T>()
        .map_err(LoadConfigError::Deserialization)?;
    config.validate()?;

    Ok(config)
}

fn yaml_path(directory: &Path, stem: &str) -> PathBuf {
    directory.join(format!("{stem}.yaml"))
}
