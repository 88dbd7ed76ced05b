use optimizer::store::memory::{EnrichmentState, MemoryAdapterStore, MemoryOptimizerStore};
use optimizer::test_utils::config::test_config;
use optimizer::test_utils::fixtures::{driver_change, log_record, status_data};
use optimizer::test_utils::wait::wait_until;
use optimizer::types::{EnrichedTable, TargetTable};
use telemetry::tracing::init_test_tracing;

use crate::common::{seed_entities, start_service};

async fn state(optimizer: &MemoryOptimizerStore, geotab_id: &str) -> Option<EnrichmentState> {
    optimizer
        .enrichment_state(EnrichedTable::StatusData, geotab_id)
        .await
        .unwrap()
}

async fn fully_enriched(optimizer: &MemoryOptimizerStore, geotab_ids: &[&str]) -> bool {
    for geotab_id in geotab_ids {
        let Some(state) = state(optimizer, geotab_id).await else {
            return false;
        };
        if !state.long_lat_processed || !state.driver_id_processed {
            return false;
        }
    }

    true
}

#[tokio::test(flavor = "multi_thread")]
async fn status_data_gets_positions_and_drivers() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    seed_entities(&adapter).await;
    adapter
        .insert_rows(&[
            log_record(1, "b2", 1, 10.0, 10.0),
            log_record(2, "b1", 10, 43.0, -79.0),
            log_record(3, "b1", 20, 44.0, -79.0),
        ])
        .await
        .unwrap();
    adapter
        .insert_rows(&[
            driver_change(1, "b1", "u1", 12),
            driver_change(2, "b1", "u1", 30),
        ])
        .await
        .unwrap();
    adapter
        .insert_rows(&[
            status_data(1, "b1", "d1", 15),
            status_data(2, "b1", "d1", 5),
            status_data(3, "b1", "d1", 0),
        ])
        .await
        .unwrap();

    let service = start_service(test_config(), &adapter, &optimizer).await;

    wait_until("every status data row is enriched", || async {
        fully_enriched(&optimizer, &["s1", "s2", "s3"]).await
    })
    .await;

    service.shutdown_and_wait().await.unwrap();

    let u1 = optimizer.id_of(TargetTable::Users, "u1").await.unwrap();

    // Between the samples at minutes 10 and 20, heading north.
    let between = state(&optimizer, "s1").await.unwrap();
    assert!((between.latitude.unwrap() - 43.5).abs() < 1e-9);
    assert!((between.longitude.unwrap() + 79.0).abs() < 1e-9);
    assert_eq!(between.speed, Some(40.0));
    assert_eq!(between.direction.as_deref(), Some("N"));
    assert_eq!(between.long_lat_reason, None);
    assert_eq!(between.driver_id, Some(u1));
    assert_eq!(between.driver_id_reason, None);

    // Older than the first sample of b1, but b2 reported earlier.
    let before_device = state(&optimizer, "s2").await.unwrap();
    assert_eq!(before_device.latitude, None);
    assert_eq!(before_device.long_lat_reason, Some(2));
    assert_eq!(before_device.driver_id, None);
    assert_eq!(before_device.driver_id_reason, Some(1));

    let before_all = state(&optimizer, "s3").await.unwrap();
    assert_eq!(before_all.long_lat_reason, Some(1));
    assert_eq!(before_all.driver_id_reason, Some(1));
}

#[tokio::test(flavor = "multi_thread")]
async fn rows_newer_than_every_sample_wait_for_a_later_one() {
    init_test_tracing();

    let adapter = MemoryAdapterStore::new();
    let optimizer = MemoryOptimizerStore::new();
    seed_entities(&adapter).await;
    adapter
        .insert_rows(&[log_record(1, "b1", 10, 43.0, -79.0)])
        .await
        .unwrap();
    adapter
        .insert_rows(&[driver_change(1, "b1", "u1", 0)])
        .await
        .unwrap();
    adapter
        .insert_rows(&[status_data(1, "b1", "d1", 15)])
        .await
        .unwrap();

    let service = start_service(test_config(), &adapter, &optimizer).await;

    wait_until("the status data row is migrated", || async {
        state(&optimizer, "s1").await.is_some()
    })
    .await;
    tokio::time::sleep(std::time::Duration::from_millis(300)).await;
    assert!(!state(&optimizer, "s1").await.unwrap().long_lat_processed);

    adapter
        .insert_rows(&[log_record(2, "b1", 20, 44.0, -79.0)])
        .await
        .unwrap();
    adapter
        .insert_rows(&[driver_change(2, "b1", "u1", 20)])
        .await
        .unwrap();

    wait_until("the status data row is enriched", || async {
        fully_enriched(&optimizer, &["s1"]).await
    })
    .await;

    service.shutdown_and_wait().await.unwrap();

    let enriched = state(&optimizer, "s1").await.unwrap();
    assert!((enriched.latitude.unwrap() - 43.5).abs() < 1e-9);
    assert_eq!(
        enriched.driver_id,
        optimizer.id_of(TargetTable::Users, "u1").await
    );
}
