use optimizer::store::base::OptimizerStore;
use optimizer::store::memory::{MemoryAdapterStore, MemoryOptimizerStore};
use optimizer::test_utils::config::{test_processor_config, test_retry_config};
use optimizer::test_utils::fixtures::{at, log_record};
use optimizer::types::{AdapterLogRecord, OptimizerDevice, ProcessorId, TargetTable};
use optimizer::workers::base::{IterationOutcome, Worker};
use optimizer::workers::processors::ProcessorFactory;
use std::time::Duration;
use telemetry::tracing::init_test_tracing;

fn optimizer_device(geotab_id: &str) -> OptimizerDevice {
    OptimizerDevice {
        geotab_id: geotab_id.to_owned(),
        name: format!("Vehicle {geotab_id}"),
        serial_number: None,
        device_type: "GO9".to_owned(),
        license_plate: None,
        vin: None,
        active_from: None,
        active_to: None,
        record_last_changed_utc: at(0),
    }
}

#[tokio::test]
async fn full_batches_continue_and_small_batches_throttle() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    optimizer.insert_rows(&[optimizer_device("b1")]).await.unwrap();
    adapter
        .insert_rows(&[
            log_record(1, "b1", 1, 43.0, -79.0),
            log_record(2, "b1", 2, 43.0, -79.0),
            log_record(3, "b1", 3, 43.0, -79.0),
        ])
        .await
        .unwrap();

    let factory = ProcessorFactory::new(adapter.clone(), optimizer.clone(), test_retry_config());
    let mut processor = factory.log_record(&test_processor_config(2, 2));
    processor.start().await.unwrap();

    assert_eq!(
        processor.run_iteration().await.unwrap(),
        IterationOutcome::Continue
    );
    assert_eq!(
        processor.run_iteration().await.unwrap(),
        IterationOutcome::Sleep(Duration::from_secs(1))
    );
    assert_eq!(
        processor.run_iteration().await.unwrap(),
        IterationOutcome::Sleep(Duration::from_secs(1))
    );

    assert_eq!(optimizer.row_count(TargetTable::LogRecords).await, 3);
    assert!(adapter.rows::<AdapterLogRecord>().await.unwrap().is_empty());

    // Empty iterations still refresh the query time.
    let tracking = optimizer
        .tracking_record(ProcessorId::LogRecordProcessor)
        .await
        .unwrap()
        .unwrap();
    assert!(tracking.last_queried_utc >= tracking.entities_last_processed_utc);
    assert_eq!(tracking.adapter_db_last_id, Some(3));
}

#[tokio::test]
async fn deferred_rows_migrate_once_their_device_exists() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    optimizer.insert_rows(&[optimizer_device("b1")]).await.unwrap();
    adapter
        .insert_rows(&[
            log_record(1, "b9", 1, 43.0, -79.0),
            log_record(2, "b1", 2, 43.0, -79.0),
        ])
        .await
        .unwrap();

    let factory = ProcessorFactory::new(adapter.clone(), optimizer.clone(), test_retry_config());
    let mut processor = factory.log_record(&test_processor_config(10, 1));
    processor.start().await.unwrap();

    processor.run_iteration().await.unwrap();
    assert_eq!(optimizer.row_count(TargetTable::LogRecords).await, 1);
    let remaining = adapter.rows::<AdapterLogRecord>().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].device_id, "b9");

    // The deferred row is offered again without being fetched from the page query.
    processor.run_iteration().await.unwrap();
    assert_eq!(optimizer.row_count(TargetTable::LogRecords).await, 1);

    optimizer.insert_rows(&[optimizer_device("b9")]).await.unwrap();
    processor.run_iteration().await.unwrap();

    assert_eq!(optimizer.row_count(TargetTable::LogRecords).await, 2);
    assert!(adapter.rows::<AdapterLogRecord>().await.unwrap().is_empty());
}

#[tokio::test]
async fn deferred_rows_never_grow_a_batch_past_the_batch_size() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    let rows: Vec<_> = (1..=20)
        .map(|id| log_record(id, "b9", id, 43.0, -79.0))
        .collect();
    adapter.insert_rows(&rows).await.unwrap();

    let factory = ProcessorFactory::new(adapter.clone(), optimizer.clone(), test_retry_config());
    let mut processor = factory.log_record(&test_processor_config(2, 2));
    processor.start().await.unwrap();

    for _ in 0..11 {
        processor.run_iteration().await.unwrap();
    }
    assert_eq!(optimizer.row_count(TargetTable::LogRecords).await, 0);

    optimizer.insert_rows(&[optimizer_device("b9")]).await.unwrap();

    let mut migrated = 0;
    for _ in 0..10 {
        processor.run_iteration().await.unwrap();
        let total = optimizer.row_count(TargetTable::LogRecords).await;
        assert!(total - migrated <= 2, "one iteration migrated {} rows", total - migrated);
        migrated = total;
    }

    assert_eq!(migrated, 20);
    assert!(adapter.rows::<AdapterLogRecord>().await.unwrap().is_empty());
}

#[tokio::test]
async fn unreachable_adapter_surfaces_as_a_connectivity_error() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    let factory = ProcessorFactory::new(adapter.clone(), optimizer, test_retry_config());
    let mut processor = factory.log_record(&test_processor_config(10, 1));
    processor.start().await.unwrap();

    adapter.set_available(false).await;
    let err = processor.run_iteration().await.unwrap_err();

    assert_eq!(
        err.kind(),
        optimizer::error::ErrorKind::AdapterDatabaseUnavailable
    );
}
