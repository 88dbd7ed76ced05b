use config::load::load_config;
use config::shared::DataOptimizerConfig;

/// Loads the service configuration. Validation runs as part of loading.
pub fn load_data_optimizer_config() -> anyhow::Result<DataOptimizerConfig> {
    let config = load_config::<DataOptimizerConfig>()?;

    Ok(config)
}
