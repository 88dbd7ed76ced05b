use optimizer::store::base::OptimizerStore;
use optimizer::store::memory::{MemoryAdapterStore, MemoryOptimizerStore};
use optimizer::test_utils::config::test_config;
use optimizer::test_utils::fixtures::{at, binary_data, device, log_record};
use optimizer::test_utils::wait::wait_until;
use optimizer::types::{
    AdapterLogRecord, OptimizerDevice, OptimizerLogRecord, ProcessorId, TargetTable,
};
use telemetry::tracing::init_test_tracing;

use crate::common::{count, seed_entities, start_service};

#[tokio::test(flavor = "multi_thread")]
async fn rows_of_unknown_devices_wait_for_their_device() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    seed_entities(&adapter).await;
    adapter
        .insert_rows(&[
            log_record(1, "b1", 10, 43.0, -79.0),
            log_record(2, "b3", 11, 44.0, -78.0),
            log_record(3, "b2", 12, 45.0, -77.0),
        ])
        .await
        .unwrap();

    let service = start_service(test_config(), &adapter, &optimizer).await;

    wait_until("the log records of known devices are migrated", || async {
        count(&optimizer, TargetTable::LogRecords).await == 2
    })
    .await;

    let remaining = adapter.rows::<AdapterLogRecord>().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].device_id, "b3");

    adapter.insert_rows(&[device(3, "b3", 30)]).await.unwrap();

    wait_until("the deferred log record is migrated", || async {
        count(&optimizer, TargetTable::LogRecords).await == 3
    })
    .await;
    wait_until("the adapter table is drained", || async {
        adapter.rows::<AdapterLogRecord>().await.unwrap().is_empty()
    })
    .await;

    service.shutdown_and_wait().await.unwrap();

    let b3 = optimizer.id_of(TargetTable::Devices, "b3").await.unwrap();
    let migrated = optimizer.rows::<OptimizerLogRecord>().await.unwrap();
    let deferred = migrated.iter().find(|row| row.geotab_id == "l2").unwrap();
    assert_eq!(deferred.device_id, b3);

    let tracking = optimizer
        .tracking_record(ProcessorId::LogRecordProcessor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tracking.adapter_db_last_id, Some(3));
    assert!(tracking.entities_have_been_processed);
}

#[tokio::test(flavor = "multi_thread")]
async fn restarting_on_already_migrated_rows_does_not_duplicate_them() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    seed_entities(&adapter).await;
    let records = [
        log_record(1, "b1", 10, 43.0, -79.0),
        log_record(2, "b1", 11, 43.1, -79.0),
    ];
    adapter.insert_rows(&records).await.unwrap();

    let service = start_service(test_config(), &adapter, &optimizer).await;
    wait_until("the log records are migrated", || async {
        adapter.rows::<AdapterLogRecord>().await.unwrap().is_empty()
    })
    .await;
    service.shutdown_and_wait().await.unwrap();
    assert_eq!(count(&optimizer, TargetTable::LogRecords).await, 2);

    // Rows whose delete was lost show up again after a restart.
    adapter.insert_rows(&records).await.unwrap();

    let service = start_service(test_config(), &adapter, &optimizer).await;
    wait_until("the replayed log records are consumed", || async {
        adapter.rows::<AdapterLogRecord>().await.unwrap().is_empty()
    })
    .await;
    service.shutdown_and_wait().await.unwrap();

    assert_eq!(count(&optimizer, TargetTable::LogRecords).await, 2);
    assert_eq!(count(&optimizer, TargetTable::Devices).await, 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_devices_are_updated_and_the_watermark_advances() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    seed_entities(&adapter).await;

    let service = start_service(test_config(), &adapter, &optimizer).await;
    wait_until("the devices are migrated", || async {
        count(&optimizer, TargetTable::Devices).await == 2
    })
    .await;

    let mut renamed = device(1, "b1", 45);
    renamed.name = "Renamed truck".to_owned();
    adapter.insert_rows(&[renamed]).await.unwrap();

    wait_until("the device change is migrated", || async {
        optimizer
            .rows::<OptimizerDevice>()
            .await
            .unwrap()
            .iter()
            .any(|device| device.name == "Renamed truck")
    })
    .await;
    service.shutdown_and_wait().await.unwrap();

    assert_eq!(count(&optimizer, TargetTable::Devices).await, 2);
    let tracking = optimizer
        .tracking_record(ProcessorId::DeviceProcessor)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tracking.adapter_db_last_record_creation_time_utc, Some(at(45)));
    assert_eq!(tracking.adapter_db_last_geotab_id.as_deref(), Some("b1"));

    // Devices are never deleted from the Adapter database.
    assert_eq!(
        adapter
            .rows::<optimizer::types::AdapterDevice>()
            .await
            .unwrap()
            .len(),
        2
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn dimensions_are_created_on_first_reference() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    seed_entities(&adapter).await;
    adapter
        .insert_rows(&[binary_data(1, "b1", 5), binary_data(2, "b2", 6)])
        .await
        .unwrap();

    let service = start_service(test_config(), &adapter, &optimizer).await;
    wait_until("the binary data is migrated", || async {
        count(&optimizer, TargetTable::BinaryData).await == 2
    })
    .await;
    service.shutdown_and_wait().await.unwrap();

    assert_eq!(count(&optimizer, TargetTable::BinaryTypes).await, 1);
    assert!(
        optimizer
            .id_of(TargetTable::Controllers, "ControllerNoneId")
            .await
            .is_some()
    );
}
