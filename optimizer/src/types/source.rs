use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::types::{ChangeTrackedRecord, PagedSourceRecord, SourceRecord, SourceTable};

macro_rules! source_record {
    ($ty:ty, $table:expr, [$($column:ident),+ $(,)?]) => {
        impl SourceRecord for $ty {
            const TABLE: SourceTable = $table;
            const COLUMNS: &'static [&'static str] = &[$(stringify!($column)),+];

            fn id(&self) -> i64 {
                self.id
            }

            fn geotab_id(&self) -> &str {
                &self.geotab_id
            }
        }
    };
}

macro_rules! paged {
    ($ty:ty) => {
        impl PagedSourceRecord for $ty {
            fn date_time(&self) -> DateTime<Utc> {
                self.date_time
            }

            fn record_creation_time_utc(&self) -> DateTime<Utc> {
                self.record_creation_time_utc
            }
        }
    };
}

macro_rules! change_tracked {
    ($ty:ty) => {
        impl ChangeTrackedRecord for $ty {
            fn record_last_changed_utc(&self) -> DateTime<Utc> {
                self.record_last_changed_utc
            }
        }
    };
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdapterDevice {
    pub id: i64,
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

source_record!(
    AdapterDevice,
    SourceTable::Devices,
    [
        id,
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
change_tracked!(AdapterDevice);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdapterUser {
    pub id: i64,
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

source_record!(
    AdapterUser,
    SourceTable::Users,
    [
        id,
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
change_tracked!(AdapterUser);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdapterDiagnostic {
    pub id: i64,
    pub geotab_id: String,
    pub diagnostic_name: String,
    pub diagnostic_code: Option<i32>,
    pub diagnostic_source_name: Option<String>,
    pub diagnostic_unit_of_measure_name: Option<String>,
    /// Natural key of the controller, a dimension of the Optimizer database.
    pub controller_id: Option<String>,
    pub record_last_changed_utc: DateTime<Utc>,
}

source_record!(
    AdapterDiagnostic,
    SourceTable::Diagnostics,
    [
        id,
        geotab_id,
        diagnostic_name,
        diagnostic_code,
        diagnostic_source_name,
        diagnostic_unit_of_measure_name,
        controller_id,
        record_last_changed_utc,
    ]
);
change_tracked!(AdapterDiagnostic);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdapterLogRecord {
    pub id: i64,
    pub geotab_id: String,
    pub date_time: DateTime<Utc>,
    pub device_id: String,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f32,
    pub record_creation_time_utc: DateTime<Utc>,
}

source_record!(
    AdapterLogRecord,
    SourceTable::LogRecords,
    [
        id,
        geotab_id,
        date_time,
        device_id,
        latitude,
        longitude,
        speed,
        record_creation_time_utc,
    ]
);
paged!(AdapterLogRecord);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdapterStatusData {
    pub id: i64,
    pub geotab_id: String,
    pub date_time: DateTime<Utc>,
    pub device_id: String,
    pub diagnostic_id: String,
    pub data: Option<f64>,
    pub record_creation_time_utc: DateTime<Utc>,
}

source_record!(
    AdapterStatusData,
    SourceTable::StatusData,
    [
        id,
        geotab_id,
        date_time,
        device_id,
        diagnostic_id,
        data,
        record_creation_time_utc,
    ]
);
paged!(AdapterStatusData);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdapterFaultData {
    pub id: i64,
    pub geotab_id: String,
    pub date_time: DateTime<Utc>,
    pub device_id: String,
    pub diagnostic_id: String,
    pub controller_id: String,
    pub failure_mode_code: Option<i32>,
    pub fault_state: Option<String>,
    pub dismiss_user_id: Option<String>,
    pub dismiss_date_time: Option<DateTime<Utc>>,
    pub count: Option<i32>,
    pub record_creation_time_utc: DateTime<Utc>,
}

source_record!(
    AdapterFaultData,
    SourceTable::FaultData,
    [
        id,
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
paged!(AdapterFaultData);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdapterBinaryData {
    pub id: i64,
    pub geotab_id: String,
    pub date_time: DateTime<Utc>,
    pub device_id: String,
    pub binary_type: Option<String>,
    pub controller_id: String,
    /// Payload as delivered by the feed, hex encoded.
    pub data: String,
    pub record_creation_time_utc: DateTime<Utc>,
}

source_record!(
    AdapterBinaryData,
    SourceTable::BinaryData,
    [
        id,
        geotab_id,
        date_time,
        device_id,
        binary_type,
        controller_id,
        data,
        record_creation_time_utc,
    ]
);
paged!(AdapterBinaryData);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct AdapterDriverChange {
    pub id: i64,
    pub geotab_id: String,
    pub date_time: DateTime<Utc>,
    pub device_id: String,
    /// Natural key of the user driving from `date_time` on.
    pub driver_id: String,
    pub driver_change_type: String,
    pub version: Option<i64>,
    pub record_creation_time_utc: DateTime<Utc>,
}

source_record!(
    AdapterDriverChange,
    SourceTable::DriverChanges,
    [
        id,
        geotab_id,
        date_time,
        device_id,
        driver_id,
        driver_change_type,
        version,
        record_creation_time_utc,
    ]
);
paged!(AdapterDriverChange);
