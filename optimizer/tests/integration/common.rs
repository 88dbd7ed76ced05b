use config::shared::DataOptimizerConfig;
use optimizer::environment::EnvironmentInfo;
use optimizer::pipeline::DataOptimizer;
use optimizer::store::base::OptimizerStore;
use optimizer::store::memory::{MemoryAdapterStore, MemoryOptimizerStore};
use optimizer::test_utils::fixtures::{device, diagnostic, user};
use optimizer::types::{ProcessorId, TargetTable};

pub const VERSION: &str = "1.4.0";
pub const MACHINE_NAME: &str = "optimizer-test-host";

pub fn test_environment() -> EnvironmentInfo {
    EnvironmentInfo::new(VERSION, MACHINE_NAME)
}

/// Starts a service on the given stores.
pub async fn start_service(
    config: DataOptimizerConfig,
    adapter: &MemoryAdapterStore,
    optimizer: &MemoryOptimizerStore,
) -> DataOptimizer<MemoryAdapterStore, MemoryOptimizerStore> {
    let mut service = DataOptimizer::new(
        config,
        adapter.clone(),
        optimizer.clone(),
        test_environment(),
    );
    service.start().await.unwrap();

    service
}

/// Seeds the entities every dependent processor waits for: devices `b1` and `b2`, diagnostic
/// `d1` and user `u1`.
pub async fn seed_entities(adapter: &MemoryAdapterStore) {
    adapter
        .insert_rows(&[device(1, "b1", 0), device(2, "b2", 0)])
        .await
        .unwrap();
    adapter.insert_rows(&[diagnostic(1, "d1", 0)]).await.unwrap();
    adapter.insert_rows(&[user(1, "u1", 0)]).await.unwrap();
}

pub async fn count(optimizer: &MemoryOptimizerStore, table: TargetTable) -> usize {
    optimizer.row_count(table).await
}

pub async fn has_processed(optimizer: &MemoryOptimizerStore, processor: ProcessorId) -> bool {
    optimizer
        .tracking_record(processor)
        .await
        .ok()
        .flatten()
        .is_some_and(|record| record.entities_have_been_processed)
}
