use config::shared::{
    DataOptimizerConfig, EnrichmentOptimizerConfig, PgConnectionConfig, ProcessorsConfig,
};
use optimizer::concurrency::shutdown::ShutdownTx;
use optimizer::environment::EnvironmentInfo;
use optimizer::pipeline::DataOptimizer;
use optimizer::store::base::{AdapterStore, OptimizerStore};
use optimizer::store::postgres::{PostgresAdapterStore, PostgresOptimizerStore};
use postgres::db::create_lazy_pool;
use tokio::signal::unix::{SignalKind, signal};
use tracing::{debug, info, warn};

use crate::migrations::migrate_optimizer_database;

/// Starts the service and returns once every worker has stopped.
///
/// The Optimizer schema is migrated before any worker starts, which is the only point where an
/// unreachable database fails the process. Later outages are waited out by the workers.
pub async fn start_data_optimizer_with_config(config: DataOptimizerConfig) -> anyhow::Result<()> {
    info!("starting data optimizer service");

    log_config(&config);

    let adapter_pool = create_lazy_pool(&config.adapter_database, "data_optimizer");
    let optimizer_pool = create_lazy_pool(&config.optimizer_database, "data_optimizer");

    migrate_optimizer_database(&optimizer_pool).await?;

    let environment = current_environment()?;
    let service = DataOptimizer::new(
        config,
        PostgresAdapterStore::new(adapter_pool),
        PostgresOptimizerStore::new(optimizer_pool),
        environment,
    );

    run_until_stopped(service).await?;

    info!("data optimizer service completed");

    Ok(())
}

fn current_environment() -> anyhow::Result<EnvironmentInfo> {
    let machine_name = hostname::get()?.to_string_lossy().into_owned();

    Ok(EnvironmentInfo::new(env!("CARGO_PKG_VERSION"), machine_name))
}

fn log_config(config: &DataOptimizerConfig) {
    log_pg_connection_config("adapter", &config.adapter_database);
    log_pg_connection_config("optimizer", &config.optimizer_database);
    debug!(
        allow_machine_name_change = config.environment_validation.allow_machine_name_change,
        allow_version_downgrade = config.environment_validation.allow_version_downgrade,
        connectivity_probe_interval_ms = config.orchestrator.connectivity_probe_interval_ms,
        prerequisite_check_interval_ms = config.prerequisites.check_interval_ms,
        max_inactivity_secs = config.prerequisites.max_inactivity_secs,
        retry_max_attempts = config.retry.max_attempts,
        "service config"
    );
    log_processors_config(&config.processors);
    log_enrichment_config("fault_data_optimizer", &config.fault_data_optimizer);
    log_enrichment_config("status_data_optimizer", &config.status_data_optimizer);
}

fn log_pg_connection_config(database: &str, config: &PgConnectionConfig) {
    debug!(
        database,
        host = config.host,
        port = config.port,
        dbname = config.name,
        username = config.username,
        tls_enabled = config.tls.enabled,
        max_connections = config.max_connections,
        "postgres connection config",
    );
}

fn log_processors_config(config: &ProcessorsConfig) {
    for (processor, processor_config) in [
        ("device", &config.device),
        ("user", &config.user),
        ("diagnostic", &config.diagnostic),
        ("log_record", &config.log_record),
        ("status_data", &config.status_data),
        ("fault_data", &config.fault_data),
        ("binary_data", &config.binary_data),
        ("driver_change", &config.driver_change),
    ] {
        debug!(
            processor,
            enabled = processor_config.enabled,
            mode = ?processor_config.mode,
            batch_size = processor_config.batch_size,
            throttle_threshold = processor_config.throttle_threshold,
            execution_interval_secs = processor_config.execution_interval_secs,
            "processor config"
        );
    }
}

fn log_enrichment_config(optimizer: &str, config: &EnrichmentOptimizerConfig) {
    debug!(
        optimizer,
        enabled = config.enabled,
        mode = ?config.mode,
        batch_size = config.batch_size,
        position_enabled = config.position.enabled,
        compass_resolution = ?config.position.compass_resolution,
        driver_id_enabled = config.driver_id.enabled,
        "enrichment optimizer config"
    );
}

/// Runs the service and turns SIGINT and SIGTERM into a graceful shutdown.
#[tracing::instrument(skip(service))]
async fn run_until_stopped<A, O>(mut service: DataOptimizer<A, O>) -> anyhow::Result<()>
where
    A: AdapterStore,
    O: OptimizerStore,
{
    service.start().await?;

    let shutdown_handle = tokio::spawn(forward_shutdown_signals(service.shutdown_tx()));

    let result = service.wait().await;

    // The service may stop on its own after a fatal error, the signal listener is not needed
    // anymore in that case.
    shutdown_handle.abort();
    let _ = shutdown_handle.await;

    result?;

    Ok(())
}

async fn forward_shutdown_signals(shutdown_tx: ShutdownTx) {
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("sigint (ctrl+c) received, shutting down data optimizer");
                }
                _ = sigterm.recv() => {
                    info!("sigterm received, shutting down data optimizer");
                }
            }
        }
        Err(err) => {
            warn!(error = %err, "failed to register the sigterm handler, only ctrl+c stops the service");
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "failed to listen for ctrl+c");
                return;
            }
            info!("sigint (ctrl+c) received, shutting down data optimizer");
        }
    }

    if let Err(err) = shutdown_tx.shutdown() {
        warn!(error = ?err, "failed to send shutdown signal");
    }
}
