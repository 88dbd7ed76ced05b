//! Data optimizer service binary.
//!
//! Migrates telematics rows from the Adapter database into the Optimizer database and enriches
//! them there. Runs until it receives SIGINT or SIGTERM, or until a worker fails fatally.

use telemetry::tracing::init_tracing;
use tracing::error;

use crate::config::load_data_optimizer_config;
use crate::core::start_data_optimizer_with_config;

mod config;
mod core;
mod migrations;

fn main() -> anyhow::Result<()> {
    let config = load_data_optimizer_config()?;

    let _log_flusher = init_tracing(env!("CARGO_BIN_NAME"))?;

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(async {
            if let Err(err) = start_data_optimizer_with_config(config).await {
                error!("{err:#}");
                return Err(err);
            }

            Ok(())
        })
}
