//! Adapter rows with sensible defaults. Timestamps are minutes after a fixed origin.

use chrono::{DateTime, Duration, TimeZone, Utc};

use crate::types::{
    AdapterBinaryData, AdapterDevice, AdapterDiagnostic, AdapterDriverChange, AdapterFaultData,
    AdapterLogRecord, AdapterStatusData, AdapterUser,
};

/// `minutes` after 2024-01-01T00:00:00Z.
pub fn at(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
        .single()
        .unwrap_or_default()
        + Duration::minutes(minutes)
}

pub fn device(id: i64, geotab_id: &str, changed_minute: i64) -> AdapterDevice {
    AdapterDevice {
        id,
        geotab_id: geotab_id.to_owned(),
        name: format!("Vehicle {geotab_id}"),
        serial_number: Some(format!("G9{id:010}")),
        device_type: "GO9".to_owned(),
        license_plate: None,
        vin: None,
        active_from: Some(at(0)),
        active_to: None,
        record_last_changed_utc: at(changed_minute),
    }
}

pub fn user(id: i64, geotab_id: &str, changed_minute: i64) -> AdapterUser {
    AdapterUser {
        id,
        geotab_id: geotab_id.to_owned(),
        name: format!("{geotab_id}@fleet.example"),
        first_name: None,
        last_name: None,
        employee_no: None,
        is_driver: true,
        active_from: Some(at(0)),
        active_to: None,
        record_last_changed_utc: at(changed_minute),
    }
}

pub fn diagnostic(id: i64, geotab_id: &str, changed_minute: i64) -> AdapterDiagnostic {
    AdapterDiagnostic {
        id,
        geotab_id: geotab_id.to_owned(),
        diagnostic_name: format!("Diagnostic {geotab_id}"),
        diagnostic_code: None,
        diagnostic_source_name: Some("Geotab GO".to_owned()),
        diagnostic_unit_of_measure_name: None,
        controller_id: Some("ControllerNoneId".to_owned()),
        record_last_changed_utc: at(changed_minute),
    }
}

pub fn log_record(
    id: i64,
    device_id: &str,
    minute: i64,
    latitude: f64,
    longitude: f64,
) -> AdapterLogRecord {
    AdapterLogRecord {
        id,
        geotab_id: format!("l{id}"),
        date_time: at(minute),
        device_id: device_id.to_owned(),
        latitude,
        longitude,
        speed: 40.0,
        record_creation_time_utc: at(minute),
    }
}

pub fn status_data(id: i64, device_id: &str, diagnostic_id: &str, minute: i64) -> AdapterStatusData {
    AdapterStatusData {
        id,
        geotab_id: format!("s{id}"),
        date_time: at(minute),
        device_id: device_id.to_owned(),
        diagnostic_id: diagnostic_id.to_owned(),
        data: Some(12.5),
        record_creation_time_utc: at(minute),
    }
}

pub fn fault_data(id: i64, device_id: &str, diagnostic_id: &str, minute: i64) -> AdapterFaultData {
    AdapterFaultData {
        id,
        geotab_id: format!("f{id}"),
        date_time: at(minute),
        device_id: device_id.to_owned(),
        diagnostic_id: diagnostic_id.to_owned(),
        controller_id: "ControllerNoneId".to_owned(),
        failure_mode_code: None,
        fault_state: Some("Active".to_owned()),
        dismiss_user_id: None,
        dismiss_date_time: None,
        count: Some(1),
        record_creation_time_utc: at(minute),
    }
}

pub fn binary_data(id: i64, device_id: &str, minute: i64) -> AdapterBinaryData {
    AdapterBinaryData {
        id,
        geotab_id: format!("x{id}"),
        date_time: at(minute),
        device_id: device_id.to_owned(),
        binary_type: Some("CalibrationId".to_owned()),
        controller_id: "ControllerNoneId".to_owned(),
        data: "AAEC".to_owned(),
        record_creation_time_utc: at(minute),
    }
}

pub fn driver_change(id: i64, device_id: &str, driver_id: &str, minute: i64) -> AdapterDriverChange {
    AdapterDriverChange {
        id,
        geotab_id: format!("c{id}"),
        date_time: at(minute),
        device_id: device_id.to_owned(),
        driver_id: driver_id.to_owned(),
        driver_change_type: "CardDriver".to_owned(),
        version: Some(1),
        record_creation_time_utc: at(minute),
    }
}
