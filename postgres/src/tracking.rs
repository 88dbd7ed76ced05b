use chrono::{DateTime, Utc};
use sqlx::PgExecutor;
use sqlx::prelude::FromRow;

/// A row of the `processor_tracking` table.
#[derive(Debug, Clone, FromRow)]
pub struct ProcessorTrackingRow {
    pub processor: String,
    pub optimizer_version: Option<String>,
    pub optimizer_machine_name: Option<String>,
    pub entities_last_processed_utc: Option<DateTime<Utc>>,
    pub adapter_db_last_id: Option<i64>,
    pub adapter_db_last_geotab_id: Option<String>,
    pub adapter_db_last_record_creation_time_utc: Option<DateTime<Utc>>,
    pub last_queried_utc: Option<DateTime<Utc>>,
    pub entities_have_been_processed: bool,
}

/// Values written after one iteration of a worker.
///
/// `None` fields leave the stored value untouched.
#[derive(Debug, Clone)]
pub struct TrackingUpsert<'a> {
    pub processor: &'a str,
    pub last_queried_utc: DateTime<Utc>,
    pub entities_last_processed_utc: Option<DateTime<Utc>>,
    pub adapter_db_last_id: Option<i64>,
    pub adapter_db_last_geotab_id: Option<&'a str>,
    pub adapter_db_last_record_creation_time_utc: Option<DateTime<Utc>>,
    pub entities_have_been_processed: bool,
}

/// Fetches the tracking rows of every processor.
pub async fn fetch_tracking_rows<'c, E>(executor: E) -> sqlx::Result<Vec<ProcessorTrackingRow>>
where
    E: PgExecutor<'c>,
{
    sqlx::query_as::<_, ProcessorTrackingRow>(
        r#"
        select processor, optimizer_version, optimizer_machine_name, entities_last_processed_utc,
            adapter_db_last_id, adapter_db_last_geotab_id, adapter_db_last_record_creation_time_utc,
            last_queried_utc, entities_have_been_processed
        from processor_tracking
        order by processor
        "#,
    )
    .fetch_all(executor)
    .await
}

/// Fetches the tracking row of one processor.
pub async fn fetch_tracking_row<'c, E>(
    executor: E,
    processor: &str,
) -> sqlx::Result<Option<ProcessorTrackingRow>>
where
    E: PgExecutor<'c>,
{
    sqlx::query_as::<_, ProcessorTrackingRow>(
        r#"
        select processor, optimizer_version, optimizer_machine_name, entities_last_processed_utc,
            adapter_db_last_id, adapter_db_last_geotab_id, adapter_db_last_record_creation_time_utc,
            last_queried_utc, entities_have_been_processed
        from processor_tracking
        where processor = $1
        "#,
    )
    .bind(processor)
    .fetch_optional(executor)
    .await
}

/// Inserts or advances the tracking row of a processor.
///
/// Timestamps and the last processed id only move forward: `greatest` ignores nulls and keeps
/// the larger of the stored and the new value. The natural key follows the id it belongs to.
pub async fn upsert_tracking<'c, E>(executor: E, upsert: &TrackingUpsert<'_>) -> sqlx::Result<()>
where
    E: PgExecutor<'c>,
{
    sqlx::query(
        r#"
        insert into processor_tracking (
            processor, last_queried_utc, entities_last_processed_utc, adapter_db_last_id,
            adapter_db_last_geotab_id, adapter_db_last_record_creation_time_utc,
            entities_have_been_processed, record_last_changed_utc
        )
        values ($1, $2, $3, $4, $5, $6, $7, now())
        on conflict (processor) do update set
            last_queried_utc = greatest(processor_tracking.last_queried_utc, excluded.last_queried_utc),
            entities_last_processed_utc = greatest(
                processor_tracking.entities_last_processed_utc,
                excluded.entities_last_processed_utc
            ),
            adapter_db_last_geotab_id = case
                when excluded.adapter_db_last_id is not null
                    and excluded.adapter_db_last_id >= coalesce(processor_tracking.adapter_db_last_id, excluded.adapter_db_last_id)
                then excluded.adapter_db_last_geotab_id
                else processor_tracking.adapter_db_last_geotab_id
            end,
            adapter_db_last_id = greatest(processor_tracking.adapter_db_last_id, excluded.adapter_db_last_id),
            adapter_db_last_record_creation_time_utc = greatest(
                processor_tracking.adapter_db_last_record_creation_time_utc,
                excluded.adapter_db_last_record_creation_time_utc
            ),
            entities_have_been_processed =
                processor_tracking.entities_have_been_processed or excluded.entities_have_been_processed,
            record_last_changed_utc = now()
        "#,
    )
    .bind(upsert.processor)
    .bind(upsert.last_queried_utc)
    .bind(upsert.entities_last_processed_utc)
    .bind(upsert.adapter_db_last_id)
    .bind(upsert.adapter_db_last_geotab_id)
    .bind(upsert.adapter_db_last_record_creation_time_utc)
    .bind(upsert.entities_have_been_processed)
    .execute(executor)
    .await?;

    Ok(())
}

/// Records the version and host a processor is running with.
pub async fn record_environment<'c, E>(
    executor: E,
    processor: &str,
    version: &str,
    machine_name: &str,
) -> sqlx::Result<()>
where
    E: PgExecutor<'c>,
{
    sqlx::query(
        r#"
        insert into processor_tracking (
            processor, optimizer_version, optimizer_machine_name, entities_have_been_processed,
            record_last_changed_utc
        )
        values ($1, $2, $3, false, now())
        on conflict (processor) do update set
            optimizer_version = excluded.optimizer_version,
            optimizer_machine_name = excluded.optimizer_machine_name,
            record_last_changed_utc = now()
        "#,
    )
    .bind(processor)
    .bind(version)
    .bind(machine_name)
    .execute(executor)
    .await?;

    Ok(())
}
