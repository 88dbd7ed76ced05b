//! Row types of both databases and the traits the generic workers are written against.

mod processor;
mod source;
mod target;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde::de::DeserializeOwned;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{FromRow, Postgres};

pub use processor::*;
pub use source::*;
pub use target::*;

/// One of the two databases the optimizer talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Database {
    Adapter,
    Optimizer,
}

impl Database {
    pub fn as_str(&self) -> &'static str {
        match self {
            Database::Adapter => "adapter",
            Database::Optimizer => "optimizer",
        }
    }
}

impl fmt::Display for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tables of the Adapter database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum SourceTable {
    BinaryData,
    Devices,
    Diagnostics,
    DriverChanges,
    FaultData,
    LogRecords,
    StatusData,
    Users,
}

impl SourceTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTable::BinaryData => "binary_data",
            SourceTable::Devices => "devices",
            SourceTable::Diagnostics => "diagnostics",
            SourceTable::DriverChanges => "driver_changes",
            SourceTable::FaultData => "fault_data",
            SourceTable::LogRecords => "log_records",
            SourceTable::StatusData => "status_data",
            SourceTable::Users => "users",
        }
    }
}

/// Tables of the Optimizer database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TargetTable {
    BinaryData,
    BinaryTypes,
    Controllers,
    Devices,
    Diagnostics,
    DriverChangeTypes,
    DriverChanges,
    FaultData,
    LogRecords,
    StatusData,
    Users,
}

impl TargetTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            TargetTable::BinaryData => "binary_data_t",
            TargetTable::BinaryTypes => "binary_types_t",
            TargetTable::Controllers => "controllers_t",
            TargetTable::Devices => "devices_t",
            TargetTable::Diagnostics => "diagnostics_t",
            TargetTable::DriverChangeTypes => "driver_change_types_t",
            TargetTable::DriverChanges => "driver_changes_t",
            TargetTable::FaultData => "fault_data_t",
            TargetTable::LogRecords => "log_records_t",
            TargetTable::StatusData => "status_data_t",
            TargetTable::Users => "users_t",
        }
    }
}

impl fmt::Display for TargetTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Optimizer tables carrying derived position and driver columns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EnrichedTable {
    FaultData,
    StatusData,
}

impl EnrichedTable {
    pub fn target(&self) -> TargetTable {
        match self {
            EnrichedTable::FaultData => TargetTable::FaultData,
            EnrichedTable::StatusData => TargetTable::StatusData,
        }
    }

    pub fn as_str(&self) -> &'static str {
        self.target().as_str()
    }
}

/// `(id, geotab_id)` pair of an Optimizer table, the content of id caches.
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct KeyRow {
    pub id: i64,
    pub geotab_id: String,
}

/// A row read from an Adapter table.
pub trait SourceRecord:
    for<'r> FromRow<'r, PgRow> + Serialize + DeserializeOwned + Clone + Send + Sync + Unpin + 'static
{
    const TABLE: SourceTable;

    /// Columns selected when reading the table.
    const COLUMNS: &'static [&'static str];

    fn id(&self) -> i64;

    fn geotab_id(&self) -> &str;
}

/// Append-only source rows, read page by page in event order and deleted once migrated.
pub trait PagedSourceRecord: SourceRecord {
    fn date_time(&self) -> DateTime<Utc>;

    fn record_creation_time_utc(&self) -> DateTime<Utc>;
}

/// Source rows updated in place and never deleted, mirrored completely and diffed by their
/// change timestamp.
pub trait ChangeTrackedRecord: SourceRecord {
    fn record_last_changed_utc(&self) -> DateTime<Utc>;
}

/// How a row conflicting on its natural key is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// The existing row wins. Used for append-only entities, which makes replays no-ops.
    InsertIfAbsent,
    /// The new row overwrites every column of the existing one.
    Upsert,
}

/// A row written to an Optimizer table. The surrogate id is assigned by the database.
pub trait TargetRecord: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const TABLE: TargetTable;

    const WRITE_MODE: WriteMode;

    /// Inserted columns, in the order [`TargetRecord::push_values`] binds them.
    const COLUMNS: &'static [&'static str];

    fn geotab_id(&self) -> &str;

    fn push_values<'args>(&self, row: &mut Separated<'_, 'args, Postgres, &'static str>);
}
