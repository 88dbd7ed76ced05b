use optimizer::concurrency::connectivity::{ConnectivityState, WaitingReason};
use optimizer::error::ErrorKind;
use optimizer::store::memory::{MemoryAdapterStore, MemoryOptimizerStore};
use optimizer::test_utils::config::test_config;
use optimizer::test_utils::fixtures::log_record;
use optimizer::test_utils::wait::wait_until;
use optimizer::tracker::ProcessorTrackingRecord;
use optimizer::types::{ProcessorId, TargetTable};
use telemetry::tracing::init_test_tracing;

use crate::common::{VERSION, count, seed_entities, start_service};

#[tokio::test(flavor = "multi_thread")]
async fn workers_pause_during_an_adapter_outage_and_resume_after_it() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    seed_entities(&adapter).await;
    adapter
        .insert_rows(&[log_record(1, "b1", 10, 43.0, -79.0)])
        .await
        .unwrap();

    let service = start_service(test_config(), &adapter, &optimizer).await;
    let connectivity = service.connectivity();

    wait_until("the first log record is migrated", || async {
        count(&optimizer, TargetTable::LogRecords).await == 1
    })
    .await;

    adapter.set_available(false).await;
    wait_until("a worker reports the adapter outage", || async {
        connectivity.current().reason == WaitingReason::AdapterDatabaseNotAvailable
    })
    .await;

    // Nothing is migrated while the adapter is away.
    adapter
        .insert_rows(&[log_record(2, "b1", 20, 44.0, -79.0)])
        .await
        .unwrap();
    tokio::time::sleep(std::time::Duration::from_millis(200)).await;
    assert_eq!(count(&optimizer, TargetTable::LogRecords).await, 1);

    adapter.set_available(true).await;
    wait_until("the orchestrator restores connectivity", || async {
        connectivity.current() == ConnectivityState::NORMAL
    })
    .await;
    wait_until("the second log record is migrated", || async {
        count(&optimizer, TargetTable::LogRecords).await == 2
    })
    .await;

    service.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn optimizer_outage_is_recovered_without_losing_rows() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    seed_entities(&adapter).await;

    let service = start_service(test_config(), &adapter, &optimizer).await;
    let connectivity = service.connectivity();

    wait_until("the devices are migrated", || async {
        count(&optimizer, TargetTable::Devices).await == 2
    })
    .await;

    optimizer.set_available(false).await;
    wait_until("a worker reports the optimizer outage", || async {
        connectivity.current().reason == WaitingReason::OptimizerDatabaseNotAvailable
    })
    .await;

    adapter
        .insert_rows(&[log_record(1, "b2", 10, 43.0, -79.0)])
        .await
        .unwrap();
    optimizer.set_available(true).await;

    wait_until("the log record is migrated after recovery", || async {
        count(&optimizer, TargetTable::LogRecords).await == 1
    })
    .await;
    wait_until("the connectivity state is normal", || async {
        connectivity.current() == ConnectivityState::NORMAL
    })
    .await;

    service.shutdown_and_wait().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn records_of_another_host_stop_the_service() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    seed_entities(&adapter).await;

    let mut record = ProcessorTrackingRecord::new(ProcessorId::DeviceProcessor);
    record.optimizer_version = Some(VERSION.to_owned());
    record.optimizer_machine_name = Some("another-host".to_owned());
    optimizer.put_tracking_record(record).await;

    let service = start_service(test_config(), &adapter, &optimizer).await;
    let err = service.wait().await.unwrap_err();

    assert!(err.kinds().contains(&ErrorKind::EnvironmentValidationFailed));
    assert_eq!(count(&optimizer, TargetTable::Devices).await, 0);
}
