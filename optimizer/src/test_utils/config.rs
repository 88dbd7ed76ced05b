use config::shared::{
    DataOptimizerConfig, EnrichmentOptimizerConfig, EnvironmentValidationConfig,
    OrchestratorConfig, PgConnectionConfig, PrerequisiteConfig, ProcessorConfig,
    ProcessorsConfig, RetryConfig, TlsConfig,
};

fn test_connection(name: &str) -> PgConnectionConfig {
    PgConnectionConfig {
        host: "localhost".to_owned(),
        port: 5432,
        name: name.to_owned(),
        username: "postgres".to_owned(),
        password: None,
        tls: TlsConfig::default(),
        max_connections: 2,
    }
}

/// Retries quickly and gives up after three attempts.
pub fn test_retry_config() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        initial_delay_ms: 5,
        max_delay_ms: 20,
        backoff_factor: 2.0,
    }
}

/// A processor that sleeps `execution_interval_secs` after a batch smaller than
/// `throttle_threshold`.
pub fn test_processor_config(batch_size: usize, throttle_threshold: usize) -> ProcessorConfig {
    ProcessorConfig {
        batch_size,
        throttle_threshold,
        execution_interval_secs: 1,
        ..ProcessorConfig::default()
    }
}

pub fn test_enrichment_config() -> EnrichmentOptimizerConfig {
    EnrichmentOptimizerConfig {
        execution_interval_secs: 1,
        batch_size: 100,
        throttle_threshold: 1,
        ..EnrichmentOptimizerConfig::default()
    }
}

/// Every worker enabled, every interval short.
pub fn test_config() -> DataOptimizerConfig {
    let processor = test_processor_config(100, 1);

    DataOptimizerConfig {
        adapter_database: test_connection("adapter"),
        optimizer_database: test_connection("optimizer"),
        environment_validation: EnvironmentValidationConfig::default(),
        orchestrator: OrchestratorConfig {
            connectivity_probe_interval_ms: 20,
            idle_interval_ms: 20,
        },
        prerequisites: PrerequisiteConfig {
            check_interval_ms: 20,
            max_inactivity_secs: 600,
        },
        retry: test_retry_config(),
        processors: ProcessorsConfig {
            binary_data: processor.clone(),
            device: processor.clone(),
            diagnostic: processor.clone(),
            driver_change: processor.clone(),
            fault_data: processor.clone(),
            log_record: processor.clone(),
            status_data: processor.clone(),
            user: processor,
        },
        fault_data_optimizer: test_enrichment_config(),
        status_data_optimizer: test_enrichment_config(),
    }
}
