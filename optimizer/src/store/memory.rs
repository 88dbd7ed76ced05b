use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tokio::sync::Mutex;

use crate::bail;
use crate::enrichment::{
    DriverCandidate, DriverOutcome, DriverUpdate, PositionCandidate, PositionOutcome,
    PositionSample, PositionUpdate,
};
use crate::environment::EnvironmentInfo;
use crate::error::{ErrorKind, OptimizerResult};
use crate::store::base::{
    AdapterStore, AdapterUnitOfWork, OptimizerStore, OptimizerUnitOfWork, UnitOfWork,
};
use crate::tracker::{ProcessorTrackingRecord, TrackingUpdate};
use crate::types::{
    ChangeTrackedRecord, EnrichedTable, KeyRow, OptimizerDriverChange, OptimizerLogRecord,
    PagedSourceRecord, ProcessorId, SourceRecord, SourceTable, TargetRecord, TargetTable,
    WriteMode,
};

/// Rows of one table keyed by surrogate id, stored as JSON objects.
type Rows = BTreeMap<i64, Map<String, Value>>;

fn decode<T: DeserializeOwned>(row: &Map<String, Value>) -> OptimizerResult<T> {
    Ok(serde_json::from_value(Value::Object(row.clone()))?)
}

fn encode<T: Serialize>(value: &T) -> OptimizerResult<Map<String, Value>> {
    match serde_json::to_value(value)? {
        Value::Object(object) => Ok(object),
        _ => bail!(
            ErrorKind::SerializationError,
            "Rows must serialize to JSON objects"
        ),
    }
}

/// Inner state of [`MemoryAdapterStore`].
#[derive(Debug)]
struct AdapterInner {
    tables: BTreeMap<SourceTable, Rows>,
    available: bool,
    failing_commits: u32,
}

impl AdapterInner {
    fn ensure_available(&self) -> OptimizerResult<()> {
        if !self.available {
            bail!(
                ErrorKind::AdapterDatabaseUnavailable,
                "Adapter database is not reachable"
            );
        }

        Ok(())
    }

    fn typed_rows<R: SourceRecord>(&self) -> OptimizerResult<Vec<R>> {
        self.tables
            .get(&R::TABLE)
            .map(|rows| rows.values().map(decode).collect())
            .unwrap_or_else(|| Ok(Vec::new()))
    }
}

/// In-memory Adapter database.
///
/// Besides holding rows, it can simulate an outage with [`MemoryAdapterStore::set_available`]
/// and failing commits with [`MemoryAdapterStore::fail_next_commits`].
#[derive(Debug, Clone)]
pub struct MemoryAdapterStore {
    inner: Arc<Mutex<AdapterInner>>,
}

impl MemoryAdapterStore {
    pub fn new() -> Self {
        let inner = AdapterInner {
            tables: BTreeMap::new(),
            available: true,
            failing_commits: 0,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Inserts or replaces rows, keyed by their own id.
    pub async fn insert_rows<R: SourceRecord>(&self, rows: &[R]) -> OptimizerResult<()> {
        let mut inner = self.inner.lock().await;
        let table = inner.tables.entry(R::TABLE).or_default();
        for row in rows {
            table.insert(row.id(), encode(row)?);
        }

        Ok(())
    }

    /// Rows of the table of `R` ordered by id.
    pub async fn rows<R: SourceRecord>(&self) -> OptimizerResult<Vec<R>> {
        self.inner.lock().await.typed_rows()
    }

    pub async fn set_available(&self, available: bool) {
        self.inner.lock().await.available = available;
    }

    /// Makes the next `count` commits fail as if the connection dropped.
    pub async fn fail_next_commits(&self, count: u32) {
        self.inner.lock().await.failing_commits = count;
    }
}

impl Default for MemoryAdapterStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AdapterStore for MemoryAdapterStore {
    type UnitOfWork = MemoryAdapterUnitOfWork;

    async fn probe(&self) -> OptimizerResult<()> {
        self.inner.lock().await.ensure_available()
    }

    async fn fetch_page<R: PagedSourceRecord>(
        &self,
        limit: usize,
        excluded_ids: &[i64],
    ) -> OptimizerResult<Vec<R>> {
        let inner = self.inner.lock().await;
        inner.ensure_available()?;

        let mut rows: Vec<R> = inner
            .typed_rows::<R>()?
            .into_iter()
            .filter(|row| !excluded_ids.contains(&row.id()))
            .collect();
        rows.sort_by_key(|row| (row.date_time(), row.id()));
        rows.truncate(limit);

        Ok(rows)
    }

    async fn fetch_changed_since<R: ChangeTrackedRecord>(
        &self,
        since: Option<DateTime<Utc>>,
    ) -> OptimizerResult<Vec<R>> {
        let inner = self.inner.lock().await;
        inner.ensure_available()?;

        let mut rows: Vec<R> = inner
            .typed_rows::<R>()?
            .into_iter()
            .filter(|row| since.is_none_or(|since| row.record_last_changed_utc() >= since))
            .collect();
        rows.sort_by_key(|row| (row.record_last_changed_utc(), row.id()));

        Ok(rows)
    }

    async fn begin(&self) -> OptimizerResult<MemoryAdapterUnitOfWork> {
        self.inner.lock().await.ensure_available()?;

        Ok(MemoryAdapterUnitOfWork {
            store: self.clone(),
            deletes: Vec::new(),
        })
    }
}

/// Buffers deletions until commit.
#[derive(Debug)]
pub struct MemoryAdapterUnitOfWork {
    store: MemoryAdapterStore,
    deletes: Vec<(SourceTable, Vec<i64>)>,
}

impl UnitOfWork for MemoryAdapterUnitOfWork {
    async fn commit(self) -> OptimizerResult<()> {
        let mut inner = self.store.inner.lock().await;
        inner.ensure_available()?;

        if inner.failing_commits > 0 {
            inner.failing_commits -= 1;
            bail!(
                ErrorKind::AdapterDatabaseUnavailable,
                "Adapter database connection dropped during commit"
            );
        }

        for (table, ids) in self.deletes {
            if let Some(rows) = inner.tables.get_mut(&table) {
                for id in ids {
                    rows.remove(&id);
                }
            }
        }

        Ok(())
    }

    async fn rollback(self) -> OptimizerResult<()> {
        Ok(())
    }
}

impl AdapterUnitOfWork for MemoryAdapterUnitOfWork {
    async fn delete_rows(&mut self, table: SourceTable, ids: &[i64]) -> OptimizerResult<u64> {
        let inner = self.store.inner.lock().await;
        inner.ensure_available()?;

        let existing = inner
            .tables
            .get(&table)
            .map(|rows| ids.iter().filter(|id| rows.contains_key(id)).count())
            .unwrap_or(0);
        self.deletes.push((table, ids.to_vec()));

        Ok(existing as u64)
    }
}

/// Derived columns of an enriched row as the enrichment optimizers leave them.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentState {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub speed: Option<f32>,
    pub bearing: Option<f32>,
    pub direction: Option<String>,
    #[serde(default)]
    pub long_lat_processed: bool,
    pub long_lat_reason: Option<i16>,
    pub driver_id: Option<i64>,
    #[serde(default)]
    pub driver_id_processed: bool,
    pub driver_id_reason: Option<i16>,
}

#[derive(Debug, Deserialize)]
struct EnrichedRow {
    id: i64,
    device_id: i64,
    date_time: DateTime<Utc>,
    #[serde(flatten)]
    state: EnrichmentState,
}

/// Writes buffered by [`MemoryOptimizerUnitOfWork`].
#[derive(Debug)]
enum PendingWrite {
    Rows {
        table: TargetTable,
        mode: WriteMode,
        rows: Vec<Map<String, Value>>,
    },
    Tracking(TrackingUpdate),
    Positions {
        table: EnrichedTable,
        updates: Vec<PositionUpdate>,
    },
    Drivers {
        table: EnrichedTable,
        updates: Vec<DriverUpdate>,
    },
}

/// Inner state of [`MemoryOptimizerStore`].
#[derive(Debug)]
struct OptimizerInner {
    tables: BTreeMap<TargetTable, Rows>,
    tracking: BTreeMap<ProcessorId, ProcessorTrackingRecord>,
    next_id: i64,
    available: bool,
    failing_commits: u32,
}

impl OptimizerInner {
    fn ensure_available(&self) -> OptimizerResult<()> {
        if !self.available {
            bail!(
                ErrorKind::OptimizerDatabaseUnavailable,
                "Optimizer database is not reachable"
            );
        }

        Ok(())
    }

    fn id_of(&self, table: TargetTable, geotab_id: &str) -> Option<i64> {
        self.tables.get(&table).and_then(|rows| {
            rows.iter()
                .find(|(_, row)| row.get("geotab_id").and_then(Value::as_str) == Some(geotab_id))
                .map(|(id, _)| *id)
        })
    }

    fn is_written(&self, table: TargetTable, mode: WriteMode, row: &Map<String, Value>) -> bool {
        match mode {
            WriteMode::Upsert => true,
            WriteMode::InsertIfAbsent => row
                .get("geotab_id")
                .and_then(Value::as_str)
                .is_none_or(|geotab_id| self.id_of(table, geotab_id).is_none()),
        }
    }

    fn insert(&mut self, table: TargetTable, mut row: Map<String, Value>) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        row.insert("id".to_owned(), json!(id));
        self.tables.entry(table).or_default().insert(id, row);
        id
    }

    fn write(&mut self, table: TargetTable, mode: WriteMode, rows: Vec<Map<String, Value>>) {
        for row in rows {
            let existing = row
                .get("geotab_id")
                .and_then(Value::as_str)
                .and_then(|geotab_id| self.id_of(table, geotab_id));

            match (existing, mode) {
                (None, _) => {
                    self.insert(table, row);
                }
                (Some(_), WriteMode::InsertIfAbsent) => {}
                (Some(id), WriteMode::Upsert) => {
                    if let Some(stored) = self.tables.get_mut(&table).and_then(|rows| rows.get_mut(&id)) {
                        stored.extend(row);
                    }
                }
            }
        }
    }

    fn update_row(&mut self, table: EnrichedTable, id: i64, values: Value) {
        let Some(row) = self
            .tables
            .get_mut(&table.target())
            .and_then(|rows| rows.get_mut(&id))
        else {
            return;
        };

        if let Value::Object(values) = values {
            row.extend(values);
        }
    }

    fn apply_positions(&mut self, table: EnrichedTable, updates: Vec<PositionUpdate>) {
        for update in updates {
            let values = match update.outcome {
                PositionOutcome::Interpolated(position) => json!({
                    "latitude": position.latitude,
                    "longitude": position.longitude,
                    "speed": position.speed,
                    "bearing": position.bearing,
                    "direction": position.direction,
                    "long_lat_reason": null,
                    "long_lat_processed": true,
                }),
                PositionOutcome::Unresolvable(reason) => json!({
                    "latitude": null,
                    "longitude": null,
                    "speed": null,
                    "bearing": null,
                    "direction": null,
                    "long_lat_reason": reason.code(),
                    "long_lat_processed": true,
                }),
            };

            self.update_row(table, update.id, values);
        }
    }

    fn apply_drivers(&mut self, table: EnrichedTable, updates: Vec<DriverUpdate>) {
        for update in updates {
            let values = match update.outcome {
                DriverOutcome::Assigned(driver_id) => json!({
                    "driver_id": driver_id,
                    "driver_id_reason": null,
                    "driver_id_processed": true,
                }),
                DriverOutcome::Unresolvable(reason) => json!({
                    "driver_id": null,
                    "driver_id_reason": reason.code(),
                    "driver_id_processed": true,
                }),
            };

            self.update_row(table, update.id, values);
        }
    }

    fn apply_tracking(&mut self, update: &TrackingUpdate) {
        self.tracking
            .entry(update.processor)
            .or_insert_with(|| ProcessorTrackingRecord::new(update.processor))
            .apply(update);
    }

    fn typed_rows<T: DeserializeOwned>(&self, table: TargetTable) -> OptimizerResult<Vec<(i64, T)>> {
        let Some(rows) = self.tables.get(&table) else {
            return Ok(Vec::new());
        };

        rows.iter()
            .map(|(id, row)| Ok((*id, decode(row)?)))
            .collect()
    }

    fn enriched_rows(&self, table: EnrichedTable) -> OptimizerResult<Vec<EnrichedRow>> {
        let mut rows: Vec<EnrichedRow> = self
            .typed_rows::<EnrichedRow>(table.target())?
            .into_iter()
            .map(|(_, row)| row)
            .collect();
        rows.sort_by_key(|row| (row.date_time, row.id));

        Ok(rows)
    }
}

/// In-memory Optimizer database.
///
/// Surrogate ids come from one sequence shared by all tables. Writes of a unit of work are
/// buffered and applied atomically on commit. Outages and failing commits can be simulated like
/// with [`MemoryAdapterStore`].
#[derive(Debug, Clone)]
pub struct MemoryOptimizerStore {
    inner: Arc<Mutex<OptimizerInner>>,
}

impl MemoryOptimizerStore {
    pub fn new() -> Self {
        let inner = OptimizerInner {
            tables: BTreeMap::new(),
            tracking: BTreeMap::new(),
            next_id: 1,
            available: true,
            failing_commits: 0,
        };

        Self {
            inner: Arc::new(Mutex::new(inner)),
        }
    }

    /// Rows of the table of `T` ordered by id.
    pub async fn rows<T: TargetRecord>(&self) -> OptimizerResult<Vec<T>> {
        let inner = self.inner.lock().await;
        let rows = inner.typed_rows::<T>(T::TABLE)?;

        Ok(rows.into_iter().map(|(_, row)| row).collect())
    }

    /// Writes rows outside of any unit of work, as if another process had written them.
    pub async fn insert_rows<T: TargetRecord>(&self, rows: &[T]) -> OptimizerResult<()> {
        let rows = rows.iter().map(encode).collect::<OptimizerResult<Vec<_>>>()?;
        self.inner.lock().await.write(T::TABLE, T::WRITE_MODE, rows);

        Ok(())
    }

    pub async fn id_of(&self, table: TargetTable, geotab_id: &str) -> Option<i64> {
        self.inner.lock().await.id_of(table, geotab_id)
    }

    pub async fn row_count(&self, table: TargetTable) -> usize {
        self.inner
            .lock()
            .await
            .tables
            .get(&table)
            .map(BTreeMap::len)
            .unwrap_or(0)
    }

    /// Derived columns of the row of `table` with natural key `geotab_id`.
    pub async fn enrichment_state(
        &self,
        table: EnrichedTable,
        geotab_id: &str,
    ) -> OptimizerResult<Option<EnrichmentState>> {
        let inner = self.inner.lock().await;
        let Some(id) = inner.id_of(table.target(), geotab_id) else {
            return Ok(None);
        };

        let row = inner
            .tables
            .get(&table.target())
            .and_then(|rows| rows.get(&id))
            .map(decode::<EnrichmentState>)
            .transpose()?;

        Ok(row)
    }

    /// Replaces a tracking record, as if written by a previous deployment.
    pub async fn put_tracking_record(&self, record: ProcessorTrackingRecord) {
        self.inner
            .lock()
            .await
            .tracking
            .insert(record.processor, record);
    }

    pub async fn set_available(&self, available: bool) {
        self.inner.lock().await.available = available;
    }

    /// Makes the next `count` commits fail as if the connection dropped.
    pub async fn fail_next_commits(&self, count: u32) {
        self.inner.lock().await.failing_commits = count;
    }
}

impl Default for MemoryOptimizerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl OptimizerStore for MemoryOptimizerStore {
    type UnitOfWork = MemoryOptimizerUnitOfWork;

    async fn probe(&self) -> OptimizerResult<()> {
        self.inner.lock().await.ensure_available()
    }

    async fn begin(&self) -> OptimizerResult<MemoryOptimizerUnitOfWork> {
        self.inner.lock().await.ensure_available()?;

        Ok(MemoryOptimizerUnitOfWork {
            store: self.clone(),
            pending: Vec::new(),
        })
    }

    async fn load_keys(
        &self,
        table: TargetTable,
        after_id: Option<i64>,
    ) -> OptimizerResult<Vec<KeyRow>> {
        let inner = self.inner.lock().await;
        inner.ensure_available()?;

        let Some(rows) = inner.tables.get(&table) else {
            return Ok(Vec::new());
        };

        let keys = rows
            .iter()
            .filter(|(id, _)| after_id.is_none_or(|after_id| **id > after_id))
            .filter_map(|(id, row)| {
                let geotab_id = row.get("geotab_id")?.as_str()?;
                Some(KeyRow {
                    id: *id,
                    geotab_id: geotab_id.to_owned(),
                })
            })
            .collect();

        Ok(keys)
    }

    async fn insert_missing_keys(&self, table: TargetTable, keys: &[String]) -> OptimizerResult<u64> {
        let mut inner = self.inner.lock().await;
        inner.ensure_available()?;

        let mut inserted = 0;
        for key in keys {
            if inner.id_of(table, key).is_none() {
                let row = json!({ "geotab_id": key, "record_last_changed_utc": Utc::now() });
                if let Value::Object(row) = row {
                    inner.insert(table, row);
                    inserted += 1;
                }
            }
        }

        Ok(inserted)
    }

    async fn tracking_records(&self) -> OptimizerResult<Vec<ProcessorTrackingRecord>> {
        let inner = self.inner.lock().await;
        inner.ensure_available()?;

        Ok(inner.tracking.values().cloned().collect())
    }

    async fn tracking_record(
        &self,
        processor: ProcessorId,
    ) -> OptimizerResult<Option<ProcessorTrackingRecord>> {
        let inner = self.inner.lock().await;
        inner.ensure_available()?;

        Ok(inner.tracking.get(&processor).cloned())
    }

    async fn update_tracking(&self, update: &TrackingUpdate) -> OptimizerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_available()?;
        inner.apply_tracking(update);

        Ok(())
    }

    async fn record_environment(
        &self,
        processor: ProcessorId,
        environment: &EnvironmentInfo,
    ) -> OptimizerResult<()> {
        let mut inner = self.inner.lock().await;
        inner.ensure_available()?;

        let record = inner
            .tracking
            .entry(processor)
            .or_insert_with(|| ProcessorTrackingRecord::new(processor));
        record.optimizer_version = Some(environment.version.clone());
        record.optimizer_machine_name = Some(environment.machine_name.clone());

        Ok(())
    }

    async fn position_candidates(
        &self,
        table: EnrichedTable,
        limit: usize,
    ) -> OptimizerResult<Vec<PositionCandidate>> {
        let inner = self.inner.lock().await;
        inner.ensure_available()?;

        let samples = inner.typed_rows::<OptimizerLogRecord>(TargetTable::LogRecords)?;
        let first_sample_utc = samples.iter().map(|(_, sample)| sample.date_time).min();
        let to_sample = |(_, record): &(i64, OptimizerLogRecord)| PositionSample {
            date_time: record.date_time,
            latitude: record.latitude,
            longitude: record.longitude,
            speed: record.speed,
        };

        let mut candidates = Vec::new();
        for row in inner.enriched_rows(table)? {
            if candidates.len() >= limit {
                break;
            }
            if row.state.long_lat_processed {
                continue;
            }

            let device_samples = samples
                .iter()
                .filter(|(_, sample)| sample.device_id == row.device_id);
            let lag = device_samples
                .clone()
                .filter(|(_, sample)| sample.date_time <= row.date_time)
                .max_by_key(|(id, sample)| (sample.date_time, *id))
                .map(to_sample);
            let lead = device_samples
                .clone()
                .filter(|(_, sample)| sample.date_time >= row.date_time)
                .min_by_key(|(id, sample)| (sample.date_time, *id))
                .map(to_sample);
            let first_device_sample_utc = device_samples.map(|(_, sample)| sample.date_time).min();

            let older_than_all = first_sample_utc.is_some_and(|first| row.date_time < first);
            if lead.is_none() && !older_than_all {
                continue;
            }

            candidates.push(PositionCandidate {
                id: row.id,
                device_id: row.device_id,
                date_time: row.date_time,
                lag,
                lead,
                first_sample_utc,
                first_device_sample_utc,
            });
        }

        Ok(candidates)
    }

    async fn driver_candidates(
        &self,
        table: EnrichedTable,
        limit: usize,
    ) -> OptimizerResult<Vec<DriverCandidate>> {
        let inner = self.inner.lock().await;
        inner.ensure_available()?;

        let changes = inner.typed_rows::<OptimizerDriverChange>(TargetTable::DriverChanges)?;
        let first_change_utc = changes.iter().map(|(_, change)| change.date_time).min();

        let mut candidates = Vec::new();
        for row in inner.enriched_rows(table)? {
            if candidates.len() >= limit {
                break;
            }
            if row.state.driver_id_processed {
                continue;
            }

            let device_changes = changes
                .iter()
                .filter(|(_, change)| change.device_id == row.device_id);
            let has_later_change = device_changes
                .clone()
                .any(|(_, change)| change.date_time >= row.date_time);
            let older_than_all = first_change_utc.is_some_and(|first| row.date_time < first);
            if !has_later_change && !older_than_all {
                continue;
            }

            let lag_driver_id = device_changes
                .clone()
                .filter(|(_, change)| change.date_time <= row.date_time)
                .max_by_key(|(id, change)| (change.date_time, *id))
                .map(|(_, change)| change.driver_id);
            let first_device_change_utc = device_changes.map(|(_, change)| change.date_time).min();

            candidates.push(DriverCandidate {
                id: row.id,
                device_id: row.device_id,
                date_time: row.date_time,
                lag_driver_id,
                first_change_utc,
                first_device_change_utc,
            });
        }

        Ok(candidates)
    }
}

/// Buffers writes until commit.
#[derive(Debug)]
pub struct MemoryOptimizerUnitOfWork {
    store: MemoryOptimizerStore,
    pending: Vec<PendingWrite>,
}

impl UnitOfWork for MemoryOptimizerUnitOfWork {
    async fn commit(self) -> OptimizerResult<()> {
        let mut inner = self.store.inner.lock().await;
        inner.ensure_available()?;

        if inner.failing_commits > 0 {
            inner.failing_commits -= 1;
            bail!(
                ErrorKind::OptimizerDatabaseUnavailable,
                "Optimizer database connection dropped during commit"
            );
        }

        for write in self.pending {
            match write {
                PendingWrite::Rows { table, mode, rows } => inner.write(table, mode, rows),
                PendingWrite::Tracking(update) => inner.apply_tracking(&update),
                PendingWrite::Positions { table, updates } => inner.apply_positions(table, updates),
                PendingWrite::Drivers { table, updates } => inner.apply_drivers(table, updates),
            }
        }

        Ok(())
    }

    async fn rollback(self) -> OptimizerResult<()> {
        Ok(())
    }
}

impl OptimizerUnitOfWork for MemoryOptimizerUnitOfWork {
    async fn write_rows<T: TargetRecord>(&mut self, rows: &[T]) -> OptimizerResult<u64> {
        let rows = rows.iter().map(encode).collect::<OptimizerResult<Vec<_>>>()?;

        let inner = self.store.inner.lock().await;
        inner.ensure_available()?;
        let written = rows
            .iter()
            .filter(|row| inner.is_written(T::TABLE, T::WRITE_MODE, row))
            .count();
        drop(inner);

        self.pending.push(PendingWrite::Rows {
            table: T::TABLE,
            mode: T::WRITE_MODE,
            rows,
        });

        Ok(written as u64)
    }

    async fn update_tracking(&mut self, update: &TrackingUpdate) -> OptimizerResult<()> {
        self.store.inner.lock().await.ensure_available()?;
        self.pending.push(PendingWrite::Tracking(update.clone()));

        Ok(())
    }

    async fn apply_position_updates(
        &mut self,
        table: EnrichedTable,
        updates: &[PositionUpdate],
    ) -> OptimizerResult<u64> {
        self.store.inner.lock().await.ensure_available()?;
        self.pending.push(PendingWrite::Positions {
            table,
            updates: updates.to_vec(),
        });

        Ok(updates.len() as u64)
    }

    async fn apply_driver_updates(
        &mut self,
        table: EnrichedTable,
        updates: &[DriverUpdate],
    ) -> OptimizerResult<u64> {
        self.store.inner.lock().await.ensure_available()?;
        self.pending.push(PendingWrite::Drivers {
            table,
            updates: updates.to_vec(),
        });

        Ok(updates.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::types::{AdapterLogRecord, OptimizerDevice};

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap()
    }

    fn log_record(id: i64, minute: u32) -> AdapterLogRecord {
        AdapterLogRecord {
            id,
            geotab_id: format!("b{id}"),
            date_time: at(minute),
            device_id: "b1".to_owned(),
            latitude: 1.0,
            longitude: 2.0,
            speed: 3.0,
            record_creation_time_utc: at(minute),
        }
    }

    fn device(geotab_id: &str, name: &str) -> OptimizerDevice {
        OptimizerDevice {
            geotab_id: geotab_id.to_owned(),
            name: name.to_owned(),
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
    async fn pages_are_ordered_by_event_time_and_skip_excluded_ids() {
        let store = MemoryAdapterStore::new();
        store
            .insert_rows(&[log_record(1, 5), log_record(2, 1), log_record(3, 3)])
            .await
            .unwrap();

        let page: Vec<AdapterLogRecord> = store.fetch_page(2, &[3]).await.unwrap();

        assert_eq!(page.iter().map(|row| row.id).collect::<Vec<_>>(), vec![2, 1]);
    }

    #[tokio::test]
    async fn uncommitted_deletes_are_discarded() {
        let store = MemoryAdapterStore::new();
        store.insert_rows(&[log_record(1, 1)]).await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.delete_rows(SourceTable::LogRecords, &[1, 7]).await.unwrap(), 1);
        drop(uow);

        assert_eq!(store.rows::<AdapterLogRecord>().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn upserts_overwrite_and_inserts_keep_the_first_row() {
        let store = MemoryOptimizerStore::new();

        let mut uow = store.begin().await.unwrap();
        uow.write_rows(&[device("b1", "first")]).await.unwrap();
        uow.commit().await.unwrap();

        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.write_rows(&[device("b1", "second")]).await.unwrap(), 1);
        uow.commit().await.unwrap();

        let devices = store.rows::<OptimizerDevice>().await.unwrap();
        assert_eq!(devices.len(), 1);
        assert_eq!(devices[0].name, "second");
    }

    #[tokio::test]
    async fn unavailable_store_fails_with_connectivity_errors() {
        let store = MemoryOptimizerStore::new();
        store.set_available(false).await;

        let err = store.tracking_records().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::OptimizerDatabaseUnavailable);

        store.set_available(true).await;
        store.fail_next_commits(1).await;
        let uow = store.begin().await.unwrap();
        assert_eq!(
            uow.commit().await.unwrap_err().kind(),
            ErrorKind::OptimizerDatabaseUnavailable
        );
    }

    #[tokio::test]
    async fn missing_keys_are_created_once() {
        let store = MemoryOptimizerStore::new();
        let keys = vec!["c1".to_owned(), "c2".to_owned()];

        assert_eq!(
            store
                .insert_missing_keys(TargetTable::Controllers, &keys)
                .await
                .unwrap(),
            2
        );
        assert_eq!(
            store
                .insert_missing_keys(TargetTable::Controllers, &keys)
                .await
                .unwrap(),
            0
        );

        let loaded = store.load_keys(TargetTable::Controllers, None).await.unwrap();
        assert_eq!(loaded.len(), 2);
        let after_first = store
            .load_keys(TargetTable::Controllers, Some(loaded[0].id))
            .await
            .unwrap();
        assert_eq!(after_first, vec![loaded[1].clone()]);
    }
}
