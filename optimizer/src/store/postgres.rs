use chrono::{DateTime, Utc};
use postgres::tracking;
use sqlx::postgres::PgQueryResult;
use sqlx::{FromRow, PgPool, Postgres, QueryBuilder, Transaction};
use tracing::warn;

use crate::enrichment::{
    DriverCandidate, DriverOutcome, DriverUpdate, PositionCandidate, PositionOutcome,
    PositionSample, PositionUpdate,
};
use crate::environment::EnvironmentInfo;
use crate::error::{OptimizerError, OptimizerResult};
use crate::store::base::{
    AdapterStore, AdapterUnitOfWork, OptimizerStore, OptimizerUnitOfWork, UnitOfWork,
};
use crate::tracker::{ProcessorTrackingRecord, TrackingUpdate};
use crate::types::{
    ChangeTrackedRecord, Database, EnrichedTable, KeyRow, PagedSourceRecord, ProcessorId,
    SourceTable, TargetRecord, TargetTable, WriteMode,
};

/// Maximum number of bind parameters Postgres accepts in one statement.
const MAX_BIND_PARAMETERS: usize = 65_535;

fn adapter_error(err: sqlx::Error) -> OptimizerError {
    OptimizerError::from_sqlx(Database::Adapter, err)
}

fn optimizer_error(err: sqlx::Error) -> OptimizerError {
    OptimizerError::from_sqlx(Database::Optimizer, err)
}

/// A transaction on either database.
///
/// Dropping it without committing rolls the transaction back.
#[derive(Debug)]
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
    database: Database,
}

impl UnitOfWork for PgUnitOfWork {
    async fn commit(self) -> OptimizerResult<()> {
        let database = self.database;
        self.tx
            .commit()
            .await
            .map_err(|err| OptimizerError::from_sqlx(database, err))
    }

    async fn rollback(self) -> OptimizerResult<()> {
        let database = self.database;
        self.tx
            .rollback()
            .await
            .map_err(|err| OptimizerError::from_sqlx(database, err))
    }
}

/// Adapter database accessed through a shared pool.
#[derive(Debug, Clone)]
pub struct PostgresAdapterStore {
    pool: PgPool,
}

impl PostgresAdapterStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

impl AdapterStore for PostgresAdapterStore {
    type UnitOfWork = PgUnitOfWork;

    async fn probe(&self) -> OptimizerResult<()> {
        postgres::db::probe(&self.pool).await.map_err(adapter_error)
    }

    async fn fetch_page<R: PagedSourceRecord>(
        &self,
        limit: usize,
        excluded_ids: &[i64],
    ) -> OptimizerResult<Vec<R>> {
        let sql = format!(
            "select {} from {} where not (id = any($1)) order by date_time, id limit $2",
            R::COLUMNS.join(", "),
            R::TABLE.as_str()
        );

        sqlx::query_as::<_, R>(&sql)
            .bind(excluded_ids)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(adapter_error)
    }

    async fn fetch_changed_since<R: ChangeTrackedRecord>(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> OptimizerResult<Vec<R>> {
        let sql = format!(
            "select {} from {} where $1::timestamptz is null or record_last_changed_utc >= $1 \
             order by record_last_changed_utc, id",
            R::COLUMNS.join(", "),
            R::TABLE.as_str()
        );

        sqlx::query_as::<_, R>(&sql)
            .bind(since)
            .fetch_all(&self.pool)
            .await
            .map_err(adapter_error)
    }

    async fn begin(&self) -> OptimizerResult<PgUnitOfWork> {
        let tx = self.pool.begin().await.map_err(adapter_error)?;

        Ok(PgUnitOfWork {
            tx,
            database: Database::Adapter,
        })
    }
}

impl AdapterUnitOfWork for PgUnitOfWork {
    async fn delete_rows(&mut self, table: SourceTable, ids: &[i64]) -> OptimizerResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let sql = format!("delete from {} where id = any($1)", table.as_str());
        let result = sqlx::query(&sql)
            .bind(ids)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| OptimizerError::from_sqlx(self.database, err))?;

        Ok(result.rows_affected())
    }
}

/// Optimizer database accessed through a shared pool.
#[derive(Debug, Clone)]
pub struct PostgresOptimizerStore {
    pool: PgPool,
}

impl PostgresOptimizerStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn into_records(rows: Vec<tracking::ProcessorTrackingRow>) -> Vec<ProcessorTrackingRecord> {
    rows.into_iter()
        .filter_map(|row| match ProcessorTrackingRecord::try_from(row) {
            Ok(record) => Some(record),
            Err(err) => {
                warn!(error = %err, "ignoring tracking record of an unknown processor");
                None
            }
        })
        .collect()
}

impl OptimizerStore for PostgresOptimizerStore {
    type UnitOfWork = PgUnitOfWork;

    async fn probe(&self) -> OptimizerResult<()> {
        postgres::db::probe(&self.pool)
            .await
            .map_err(optimizer_error)
    }

    async fn begin(&self) -> OptimizerResult<PgUnitOfWork> {
        let tx = self.pool.begin().await.map_err(optimizer_error)?;

        Ok(PgUnitOfWork {
            tx,
            database: Database::Optimizer,
        })
    }

    async fn load_keys(
        &self,
        table: TargetTable,
        after_id: Option<i64>,
    ) -> OptimizerResult<Vec<KeyRow>> {
        let sql = format!(
            "select id, geotab_id from {} where $1::bigint is null or id > $1 order by id",
            table.as_str()
        );

        sqlx::query_as::<_, KeyRow>(&sql)
            .bind(after_id)
            .fetch_all(&self.pool)
            .await
            .map_err(optimizer_error)
    }

    async fn insert_missing_keys(&self, table: TargetTable, keys: &[String]) -> OptimizerResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let sql = format!(
            "insert into {} (geotab_id, record_last_changed_utc) \
             select key, now() from unnest($1::text[]) as key \
             on conflict (geotab_id) do nothing",
            table.as_str()
        );
        let result = sqlx::query(&sql)
            .bind(keys)
            .execute(&self.pool)
            .await
            .map_err(optimizer_error)?;

        Ok(result.rows_affected())
    }

    async fn tracking_records(&self) -> OptimizerResult<Vec<ProcessorTrackingRecord>> {
        let rows = tracking::fetch_tracking_rows(&self.pool)
            .await
            .map_err(optimizer_error)?;

        Ok(into_records(rows))
    }

    async fn tracking_record(
        &self,
        processor: ProcessorId,
    ) -> OptimizerResult<Option<ProcessorTrackingRecord>> {
        let row = tracking::fetch_tracking_row(&self.pool, processor.as_static_str())
            .await
            .map_err(optimizer_error)?;

        Ok(row.and_then(|row| into_records(vec![row]).pop()))
    }

    async fn update_tracking(&self, update: &TrackingUpdate) -> OptimizerResult<()> {
        tracking::upsert_tracking(&self.pool, &update.as_upsert())
            .await
            .map_err(optimizer_error)
    }

    async fn record_environment(
        &self,
        processor: ProcessorId,
        environment: &EnvironmentInfo,
    ) -> OptimizerResult<()> {
        tracking::record_environment(
            &self.pool,
            processor.as_static_str(),
            &environment.version,
            &environment.machine_name,
        )
        .await
        .map_err(optimizer_error)
    }

    async fn position_candidates(
        &self,
        table: EnrichedTable,
        limit: usize,
    ) -> OptimizerResult<Vec<PositionCandidate>> {
        let sql = format!(
            r#"
            with bounds as (select min(date_time) as first_sample_utc from log_records_t)
            select t.id, t.device_id, t.date_time,
                lag.date_time as lag_date_time, lag.latitude as lag_latitude,
                lag.longitude as lag_longitude, lag.speed as lag_speed,
                lead.date_time as lead_date_time, lead.latitude as lead_latitude,
                lead.longitude as lead_longitude, lead.speed as lead_speed,
                bounds.first_sample_utc, device.first_sample_utc as first_device_sample_utc
            from {table} t
            cross join bounds
            left join lateral (
                select l.date_time, l.latitude, l.longitude, l.speed from log_records_t l
                where l.device_id = t.device_id and l.date_time <= t.date_time
                order by l.date_time desc, l.id desc limit 1
            ) lag on true
            left join lateral (
                select l.date_time, l.latitude, l.longitude, l.speed from log_records_t l
                where l.device_id = t.device_id and l.date_time >= t.date_time
                order by l.date_time, l.id limit 1
            ) lead on true
            left join lateral (
                select min(l.date_time) as first_sample_utc from log_records_t l
                where l.device_id = t.device_id
            ) device on true
            where not t.long_lat_processed
                and (lead.date_time is not null or t.date_time < bounds.first_sample_utc)
            order by t.date_time, t.id
            limit $1
            "#,
            table = table.as_str()
        );

        let rows = sqlx::query_as::<_, PositionCandidateRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(optimizer_error)?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn driver_candidates(
        &self,
        table: EnrichedTable,
        limit: usize,
    ) -> OptimizerResult<Vec<DriverCandidate>> {
        let sql = format!(
            r#"
            with bounds as (select min(date_time) as first_change_utc from driver_changes_t)
            select t.id, t.device_id, t.date_time,
                lag.driver_id as lag_driver_id,
                bounds.first_change_utc, device.first_change_utc as first_device_change_utc
            from {table} t
            cross join bounds
            left join lateral (
                select d.driver_id from driver_changes_t d
                where d.device_id = t.device_id and d.date_time <= t.date_time
                order by d.date_time desc, d.id desc limit 1
            ) lag on true
            left join lateral (
                select min(d.date_time) as first_change_utc from driver_changes_t d
                where d.device_id = t.device_id
            ) device on true
            where not t.driver_id_processed
                and (
                    t.date_time < bounds.first_change_utc
                    or exists (
                        select 1 from driver_changes_t d
                        where d.device_id = t.device_id and d.date_time >= t.date_time
                    )
                )
            order by t.date_time, t.id
            limit $1
            "#,
            table = table.as_str()
        );

        sqlx::query_as::<_, DriverCandidateRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map(|rows| rows.into_iter().map(Into::into).collect())
            .map_err(optimizer_error)
    }
}

/// Appends the conflict clause matching the write mode of `T`.
fn push_conflict_clause<T: TargetRecord>(builder: &mut QueryBuilder<'_, Postgres>) {
    match T::WRITE_MODE {
        WriteMode::InsertIfAbsent => {
            builder.push(" on conflict (geotab_id) do nothing");
        }
        WriteMode::Upsert => {
            let assignments = T::COLUMNS
                .iter()
                .filter(|column| **column != "geotab_id")
                .map(|column| format!("{column} = excluded.{column}"))
                .collect::<Vec<_>>()
                .join(", ");
            builder.push(" on conflict (geotab_id) do update set ");
            builder.push(assignments);
        }
    }
}

impl OptimizerUnitOfWork for PgUnitOfWork {
    async fn write_rows<T: TargetRecord>(&mut self, rows: &[T]) -> OptimizerResult<u64> {
        let chunk_size = (MAX_BIND_PARAMETERS / T::COLUMNS.len()).max(1);
        let mut written = 0;

        for chunk in rows.chunks(chunk_size) {
            let mut builder = QueryBuilder::<Postgres>::new(format!(
                "insert into {} ({}) ",
                T::TABLE.as_str(),
                T::COLUMNS.join(", ")
            ));
            builder.push_values(chunk, |mut row, record| record.push_values(&mut row));
            push_conflict_clause::<T>(&mut builder);

            let result: PgQueryResult = builder
                .build()
                .execute(&mut *self.tx)
                .await
                .map_err(|err| OptimizerError::from_sqlx(self.database, err))?;
            written += result.rows_affected();
        }

        Ok(written)
    }

    async fn update_tracking(&mut self, update: &TrackingUpdate) -> OptimizerResult<()> {
        tracking::upsert_tracking(&mut *self.tx, &update.as_upsert())
            .await
            .map_err(|err| OptimizerError::from_sqlx(self.database, err))
    }

    async fn apply_position_updates(
        &mut self,
        table: EnrichedTable,
        updates: &[PositionUpdate],
    ) -> OptimizerResult<u64> {
        if updates.is_empty() {
            return Ok(0);
        }

        let columns = PositionColumns::from_updates(updates);
        let sql = format!(
            r#"
            update {} as t set
                latitude = u.latitude,
                longitude = u.longitude,
                speed = u.speed,
                bearing = u.bearing,
                direction = u.direction,
                long_lat_reason = u.reason,
                long_lat_processed = true
            from unnest($1::bigint[], $2::float8[], $3::float8[], $4::float4[], $5::float4[], $6::text[], $7::int2[])
                as u(id, latitude, longitude, speed, bearing, direction, reason)
            where t.id = u.id
            "#,
            table.as_str()
        );

        let result = sqlx::query(&sql)
            .bind(columns.ids)
            .bind(columns.latitudes)
            .bind(columns.longitudes)
            .bind(columns.speeds)
            .bind(columns.bearings)
            .bind(columns.directions)
            .bind(columns.reasons)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| OptimizerError::from_sqlx(self.database, err))?;

        Ok(result.rows_affected())
    }

    async fn apply_driver_updates(
        &mut self,
        table: EnrichedTable,
        updates: &[DriverUpdate],
    ) -> OptimizerResult<u64> {
        if updates.is_empty() {
            return Ok(0);
        }

        let mut ids = Vec::with_capacity(updates.len());
        let mut driver_ids = Vec::with_capacity(updates.len());
        let mut reasons = Vec::with_capacity(updates.len());
        for update in updates {
            ids.push(update.id);
            match update.outcome {
                DriverOutcome::Assigned(driver_id) => {
                    driver_ids.push(Some(driver_id));
                    reasons.push(None);
                }
                DriverOutcome::Unresolvable(reason) => {
                    driver_ids.push(None);
                    reasons.push(Some(reason.code()));
                }
            }
        }

        let sql = format!(
            r#"
            update {} as t set
                driver_id = u.driver_id,
                driver_id_reason = u.reason,
                driver_id_processed = true
            from unnest($1::bigint[], $2::bigint[], $3::int2[]) as u(id, driver_id, reason)
            where t.id = u.id
            "#,
            table.as_str()
        );

        let result = sqlx::query(&sql)
            .bind(ids)
            .bind(driver_ids)
            .bind(reasons)
            .execute(&mut *self.tx)
            .await
            .map_err(|err| OptimizerError::from_sqlx(self.database, err))?;

        Ok(result.rows_affected())
    }
}

/// Position outcomes split into one array per column for `unnest`.
struct PositionColumns {
    ids: Vec<i64>,
    latitudes: Vec<Option<f64>>,
    longitudes: Vec<Option<f64>>,
    speeds: Vec<Option<f32>>,
    bearings: Vec<Option<f32>>,
    directions: Vec<Option<String>>,
    reasons: Vec<Option<i16>>,
}

impl PositionColumns {
    fn from_updates(updates: &[PositionUpdate]) -> Self {
        let mut columns = PositionColumns {
            ids: Vec::with_capacity(updates.len()),
            latitudes: Vec::with_capacity(updates.len()),
            longitudes: Vec::with_capacity(updates.len()),
            speeds: Vec::with_capacity(updates.len()),
            bearings: Vec::with_capacity(updates.len()),
            directions: Vec::with_capacity(updates.len()),
            reasons: Vec::with_capacity(updates.len()),
        };

        for update in updates {
            columns.ids.push(update.id);
            match &update.outcome {
                PositionOutcome::Interpolated(position) => {
                    columns.latitudes.push(Some(position.latitude));
                    columns.longitudes.push(Some(position.longitude));
                    columns.speeds.push(position.speed);
                    columns.bearings.push(position.bearing);
                    columns
                        .directions
                        .push(position.direction.map(str::to_owned));
                    columns.reasons.push(None);
                }
                PositionOutcome::Unresolvable(reason) => {
                    columns.latitudes.push(None);
                    columns.longitudes.push(None);
                    columns.speeds.push(None);
                    columns.bearings.push(None);
                    columns.directions.push(None);
                    columns.reasons.push(Some(reason.code()));
                }
            }
        }

        columns
    }
}

#[derive(Debug, FromRow)]
struct PositionCandidateRow {
    id: i64,
    device_id: i64,
    date_time: DateTime<Utc>,
    lag_date_time: Option<DateTime<Utc>>,
    lag_latitude: Option<f64>,
    lag_longitude: Option<f64>,
    lag_speed: Option<f32>,
    lead_date_time: Option<DateTime<Utc>>,
    lead_latitude: Option<f64>,
    lead_longitude: Option<f64>,
    lead_speed: Option<f32>,
    first_sample_utc: Option<DateTime<Utc>>,
    first_device_sample_utc: Option<DateTime<Utc>>,
}

fn sample(
    date_time: Option<DateTime<Utc>>,
    latitude: Option<f64>,
    longitude: Option<f64>,
    speed: Option<f32>,
) -> Option<PositionSample> {
    Some(PositionSample {
        date_time: date_time?,
        latitude: latitude?,
        longitude: longitude?,
        speed: speed.unwrap_or_default(),
    })
}

impl From<PositionCandidateRow> for PositionCandidate {
    fn from(row: PositionCandidateRow) -> Self {
        PositionCandidate {
            id: row.id,
            device_id: row.device_id,
            date_time: row.date_time,
            lag: sample(
                row.lag_date_time,
                row.lag_latitude,
                row.lag_longitude,
                row.lag_speed,
            ),
            lead: sample(
                row.lead_date_time,
                row.lead_latitude,
                row.lead_longitude,
                row.lead_speed,
            ),
            first_sample_utc: row.first_sample_utc,
            first_device_sample_utc: row.first_device_sample_utc,
        }
    }
}

#[derive(Debug, FromRow)]
struct DriverCandidateRow {
    id: i64,
    device_id: i64,
    date_time: DateTime<Utc>,
    lag_driver_id: Option<i64>,
    first_change_utc: Option<DateTime<Utc>>,
    first_device_change_utc: Option<DateTime<Utc>>,
}

impl From<DriverCandidateRow> for DriverCandidate {
    fn from(row: DriverCandidateRow) -> Self {
        DriverCandidate {
            id: row.id,
            device_id: row.device_id,
            date_time: row.date_time,
            lag_driver_id: row.lag_driver_id,
            first_change_utc: row.first_change_utc,
            first_device_change_utc: row.first_device_change_utc,
        }
    }
}
