use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::Postgres;
use sqlx::query_builder::Separated;

use crate::types::{TargetRecord, TargetTable, WriteMode};

macro_rules! target_record {
    ($ty:ty, $table:expr, $mode:expr, [$($column:ident),+ $(,)?]) => {
        impl TargetRecord for $ty {
            const TABLE: TargetTable = $table;
            const WRITE_MODE: WriteMode = $mode;
            const COLUMNS: &'static [&'static str] = &[$(stringify!($column)),+];

            fn geotab_id(&self) -> &str {
                &self.geotab_id
            }

            fn push_values<'args>(&self, row: &mut Separated<'_, 'args, Postgres, &'static str>) {
                $(row.push_bind(self.$column.clone());)+
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerDevice {
    pub geotab_id: String,
    pub name: String,
    pub serial_number: Option<String>,
    pub device_type: String,
    pub license_plate: Option<String>,
    pub vin: Option<String>,
    pub active_from: Option<DateTime<Utc>>,
    pub active_to: Option<DateTime<Utc>>,
    pub record_last_changed_utc: DateTime<Utc>,
}

target_record!(
    OptimizerDevice,
    TargetTable::Devices,
    WriteMode::Upsert,
    [
        geotab_id,
        name,
        serial_number,
        device_type,
        license_plate,
        vin,
        active_from,
        active_to,
        record_last_changed_utc,
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerUser {
    pub geotab_id: String,
    pub name: String,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub employee_no: Option<String>,
    pub is_driver: bool,
    pub active_from: Option<DateTime<Utc>>,
    pub active_to: Option<DateTime<Utc>>,
    pub record_last_changed_utc: DateTime<Utc>,
}

target_record!(
    OptimizerUser,
    TargetTable::Users,
    WriteMode::Upsert,
    [
        geotab_id,
        name,
        first_name,
        last_name,
        employee_no,
        is_driver,
        active_from,
        active_to,
        record_last_changed_utc,
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerDiagnostic {
    pub geotab_id: String,
    pub name: String,
    pub code: Option<i32>,
    pub source_name: Option<String>,
    pub unit_of_measure: Option<String>,
    pub controller_id: Option<i64>,
    pub record_last_changed_utc: DateTime<Utc>,
}

target_record!(
    OptimizerDiagnostic,
    TargetTable::Diagnostics,
    WriteMode::Upsert,
    [
        geotab_id,
        name,
        code,
        source_name,
        unit_of_measure,
        controller_id,
        record_last_changed_utc,
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerLogRecord {
    pub geotab_id: String,
    pub date_time: DateTime<Utc>,
    pub device_id: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f32,
    pub record_creation_time_utc: DateTime<Utc>,
}

target_record!(
    OptimizerLogRecord,
    TargetTable::LogRecords,
    WriteMode::InsertIfAbsent,
    [
        geotab_id,
        date_time,
        device_id,
        latitude,
        longitude,
        speed,
        record_creation_time_utc,
    ]
);

/// Derived columns are not part of the insert, they start unprocessed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerStatusData {
    pub geotab_id: String,
    pub date_time: DateTime<Utc>,
    pub device_id: i64,
    pub diagnostic_id: i64,
    pub data: Option<f64>,
    pub record_creation_time_utc: DateTime<Utc>,
}

target_record!(
    OptimizerStatusData,
    TargetTable::StatusData,
    WriteMode::InsertIfAbsent,
    [
        geotab_id,
        date_time,
        device_id,
        diagnostic_id,
        data,
        record_creation_time_utc,
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerFaultData {
    pub geotab_id: String,
    pub date_time: DateTime<Utc>,
    pub device_id: i64,
    pub diagnostic_id: i64,
    pub controller_id: i64,
    pub failure_mode_code: Option<i32>,
    pub fault_state: Option<String>,
    pub dismiss_user_id: Option<i64>,
    pub dismiss_date_time: Option<DateTime<Utc>>,
    pub count: Option<i32>,
    pub record_creation_time_utc: DateTime<Utc>,
}

target_record!(
    OptimizerFaultData,
    TargetTable::FaultData,
    WriteMode::InsertIfAbsent,
    [
        geotab_id,
        date_time,
        device_id,
        diagnostic_id,
        controller_id,
        failure_mode_code,
        fault_state,
        dismiss_user_id,
        dismiss_date_time,
        count,
        record_creation_time_utc,
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerBinaryData {
    pub geotab_id: String,
    pub date_time: DateTime<Utc>,
    pub device_id: i64,
    pub binary_type_id: Option<i64>,
    pub controller_id: i64,
    pub data: String,
    pub record_creation_time_utc: DateTime<Utc>,
}

target_record!(
    OptimizerBinaryData,
    TargetTable::BinaryData,
    WriteMode::InsertIfAbsent,
    [
        geotab_id,
        date_time,
        device_id,
        binary_type_id,
        controller_id,
        data,
        record_creation_time_utc,
    ]
);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizerDriverChange {
    pub geotab_id: String,
    pub date_time: DateTime<Utc>,
    pub device_id: i64,
    pub driver_id: i64,
    pub driver_change_type_id: i64,
    pub version: Option<i64>,
    pub record_creation_time_utc: DateTime<Utc>,
}

target_record!(
    OptimizerDriverChange,
    TargetTable::DriverChanges,
    WriteMode::InsertIfAbsent,
    [
        geotab_id,
        date_time,
        device_id,
        driver_id,
        driver_change_type_id,
        version,
        record_creation_time_utc,
    ]
);
