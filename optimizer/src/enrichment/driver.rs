use crate::enrichment::{DriverCandidate, DriverOutcome, DriverReason, OlderThan, older_than};

/// Decides the driver of a candidate row by carrying the latest preceding driver change forward.
pub fn resolve_driver(candidate: &DriverCandidate) -> DriverOutcome {
    if let Some(driver_id) = candidate.lag_driver_id {
        return DriverOutcome::Assigned(driver_id);
    }

    let reason = match older_than(
        candidate.date_time,
        candidate.first_change_utc,
        candidate.first_device_change_utc,
    ) {
        OlderThan::All => DriverReason::OlderThanAllDriverChanges,
        OlderThan::Device => DriverReason::OlderThanAllDeviceDriverChanges,
        OlderThan::Neither => DriverReason::Unknown,
    };

    DriverOutcome::Unresolvable(reason)
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, TimeZone, Utc};

    use super::*;

    fn at(minutes: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn candidate(minutes: i64) -> DriverCandidate {
        DriverCandidate {
            id: 3,
            device_id: 1,
            date_time: at(minutes),
            lag_driver_id: None,
            first_change_utc: Some(at(10)),
            first_device_change_utc: Some(at(30)),
        }
    }

    #[test]
    fn lag_driver_is_carried_forward() {
        let mut candidate = candidate(40);
        candidate.lag_driver_id = Some(12);

        assert_eq!(resolve_driver(&candidate), DriverOutcome::Assigned(12));
    }

    #[test]
    fn missing_lag_is_classified_from_global_to_device() {
        assert_eq!(
            resolve_driver(&candidate(5)),
            DriverOutcome::Unresolvable(DriverReason::OlderThanAllDriverChanges)
        );
        assert_eq!(
            resolve_driver(&candidate(20)),
            DriverOutcome::Unresolvable(DriverReason::OlderThanAllDeviceDriverChanges)
        );
        assert_eq!(
            resolve_driver(&candidate(45)),
            DriverOutcome::Unresolvable(DriverReason::Unknown)
        );
    }
}
