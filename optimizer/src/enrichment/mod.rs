//! Derived columns of fault and status data.
//!
//! Both sub-tasks look at the samples bracketing a row in time: the latest sample at or before
//! the row (lag) and the earliest one at or after it (lead). Candidate rows are selected only once
//! a decision is possible, so every outcome computed here is final. Rows that can never be
//! enriched get a reason code instead of values and are never selected again.

pub mod compass;
pub mod driver;
pub mod interpolation;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why the position of a row cannot be derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PositionReason {
    /// The row is older than every position sample of every device.
    OlderThanAllLogRecords,
    /// The row is older than every position sample of its device.
    OlderThanAllDeviceLogRecords,
    Unknown,
}

impl PositionReason {
    /// Value stored in `long_lat_reason`.
    pub fn code(&self) -> i16 {
        match self {
            PositionReason::OlderThanAllLogRecords => 1,
            PositionReason::OlderThanAllDeviceLogRecords => 2,
            PositionReason::Unknown => 99,
        }
    }
}

/// Why the driver of a row cannot be derived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverReason {
    /// The row is older than every driver change of every device.
    OlderThanAllDriverChanges,
    /// The row is older than every driver change of its device.
    OlderThanAllDeviceDriverChanges,
    Unknown,
}

impl DriverReason {
    /// Value stored in `driver_id_reason`.
    pub fn code(&self) -> i16 {
        match self {
            DriverReason::OlderThanAllDriverChanges => 1,
            DriverReason::OlderThanAllDeviceDriverChanges => 2,
            DriverReason::Unknown => 99,
        }
    }
}

/// A position sample taken from `log_records_t`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PositionSample {
    pub date_time: DateTime<Utc>,
    pub latitude: f64,
    pub longitude: f64,
    pub speed: f32,
}

/// A row waiting for its position together with everything needed to decide it.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionCandidate {
    pub id: i64,
    pub device_id: i64,
    pub date_time: DateTime<Utc>,
    pub lag: Option<PositionSample>,
    pub lead: Option<PositionSample>,
    /// Oldest position sample over all devices.
    pub first_sample_utc: Option<DateTime<Utc>>,
    /// Oldest position sample of the row's device.
    pub first_device_sample_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterpolatedPosition {
    pub latitude: f64,
    pub longitude: f64,
    pub speed: Option<f32>,
    pub bearing: Option<f32>,
    pub direction: Option<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PositionOutcome {
    Interpolated(InterpolatedPosition),
    Unresolvable(PositionReason),
}

/// Final decision for one row, written back by the enrichment optimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionUpdate {
    pub id: i64,
    pub outcome: PositionOutcome,
}

/// A row waiting for its driver together with everything needed to decide it.
#[derive(Debug, Clone, PartialEq)]
pub struct DriverCandidate {
    pub id: i64,
    pub device_id: i64,
    pub date_time: DateTime<Utc>,
    /// Driver of the latest driver change of the device at or before the row.
    pub lag_driver_id: Option<i64>,
    pub first_change_utc: Option<DateTime<Utc>>,
    pub first_device_change_utc: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOutcome {
    Assigned(i64),
    Unresolvable(DriverReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverUpdate {
    pub id: i64,
    pub outcome: DriverOutcome,
}

/// Classifies a row without usable bracketing samples.
///
/// Shared by both sub-tasks: `first` is the oldest sample overall and `first_of_device` the
/// oldest sample of the row's device.
fn older_than(
    date_time: DateTime<Utc>,
    first: Option<DateTime<Utc>>,
    first_of_device: Option<DateTime<Utc>>,
) -> OlderThan {
    match (first, first_of_device) {
        (Some(first), _) if date_time < first => OlderThan::All,
        (_, Some(first_of_device)) if date_time < first_of_device => OlderThan::Device,
        _ => OlderThan::Neither,
    }
}

enum OlderThan {
    All,
    Device,
    Neither,
}
