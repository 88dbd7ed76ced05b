use chrono::{DateTime, Utc};
use config::shared::PositionEnrichmentConfig;

use crate::enrichment::compass::compass_direction;
use crate::enrichment::{
    InterpolatedPosition, OlderThan, PositionCandidate, PositionOutcome, PositionReason,
    older_than,
};

/// Elapsed fraction of `[start, end]` at `at`, clamped to `[0, 1]`.
///
/// A zero-length interval yields 0.
pub fn time_fraction(start: DateTime<Utc>, end: DateTime<Utc>, at: DateTime<Utc>) -> f64 {
    let total = (end - start).num_milliseconds();
    if total <= 0 {
        return 0.0;
    }

    let elapsed = (at - start).num_milliseconds() as f64;
    (elapsed / total as f64).clamp(0.0, 1.0)
}

pub fn lerp(from: f64, to: f64, fraction: f64) -> f64 {
    from + (to - from) * fraction
}

/// Initial great-circle bearing from the first point to the second, in degrees within `[0, 360)`.
///
/// Identical points have a bearing of 0.
pub fn bearing(from_latitude: f64, from_longitude: f64, to_latitude: f64, to_longitude: f64) -> f64 {
    if from_latitude == to_latitude && from_longitude == to_longitude {
        return 0.0;
    }

    let phi1 = from_latitude.to_radians();
    let phi2 = to_latitude.to_radians();
    let delta_lambda = (to_longitude - from_longitude).to_radians();

    let y = delta_lambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * delta_lambda.cos();

    let degrees = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360 for tiny negative angles.
    if degrees >= 360.0 { 0.0 } else { degrees }
}

/// Decides the position of a candidate row.
pub fn resolve_position(
    candidate: &PositionCandidate,
    config: &PositionEnrichmentConfig,
) -> PositionOutcome {
    let (Some(lag), Some(lead)) = (candidate.lag, candidate.lead) else {
        let reason = match older_than(
            candidate.date_time,
            candidate.first_sample_utc,
            candidate.first_device_sample_utc,
        ) {
            OlderThan::All => PositionReason::OlderThanAllLogRecords,
            OlderThan::Device => PositionReason::OlderThanAllDeviceLogRecords,
            OlderThan::Neither => PositionReason::Unknown,
        };

        return PositionOutcome::Unresolvable(reason);
    };

    let fraction = time_fraction(lag.date_time, lead.date_time, candidate.date_time);
    let latitude = lerp(lag.latitude, lead.latitude, fraction);
    let longitude = lerp(lag.longitude, lead.longitude, fraction);

    let speed = config.populate_speed.then_some(lag.speed);

    let bearing = config
        .populate_bearing
        .then(|| bearing(lag.latitude, lag.longitude, lead.latitude, lead.longitude));
    let direction = match (bearing, config.compass_resolution) {
        (Some(bearing), Some(resolution)) => Some(compass_direction(bearing, resolution)),
        _ => None,
    };

    PositionOutcome::Interpolated(InterpolatedPosition {
        latitude,
        longitude,
        speed,
        bearing: bearing.map(|bearing| bearing as f32),
        direction,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};
    use config::shared::CompassResolution;

    use super::*;
    use crate::enrichment::PositionSample;

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 8, 0, 0).unwrap() + Duration::seconds(seconds)
    }

    fn sample(seconds: i64, latitude: f64, longitude: f64, speed: f32) -> PositionSample {
        PositionSample {
            date_time: at(seconds),
            latitude,
            longitude,
            speed,
        }
    }

    fn candidate(seconds: i64) -> PositionCandidate {
        PositionCandidate {
            id: 1,
            device_id: 7,
            date_time: at(seconds),
            lag: None,
            lead: None,
            first_sample_utc: Some(at(0)),
            first_device_sample_utc: Some(at(0)),
        }
    }

    #[test]
    fn fraction_is_zero_for_identical_bracket_times() {
        assert_eq!(time_fraction(at(10), at(10), at(10)), 0.0);
        assert_eq!(time_fraction(at(0), at(40), at(10)), 0.25);
        assert_eq!(time_fraction(at(0), at(40), at(50)), 1.0);
    }

    #[test]
    fn interpolated_position_lies_on_the_linear_path() {
        let mut candidate = candidate(30);
        candidate.lag = Some(sample(0, 43.0, -79.0, 50.0));
        candidate.lead = Some(sample(120, 44.0, -78.0, 70.0));

        let PositionOutcome::Interpolated(position) =
            resolve_position(&candidate, &PositionEnrichmentConfig::default())
        else {
            panic!("expected an interpolated position");
        };

        assert!((position.latitude - 43.25).abs() < 1e-9);
        assert!((position.longitude + 78.75).abs() < 1e-9);
        assert_eq!(position.speed, Some(50.0));

        let bearing = position.bearing.unwrap();
        assert!(bearing > 0.0 && bearing < 90.0);
        assert_eq!(position.direction, Some("NE"));
    }

    #[test]
    fn bearing_follows_the_displacement_quadrant() {
        assert!((bearing(0.0, 0.0, 1.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((bearing(0.0, 0.0, 0.0, 1.0) - 90.0).abs() < 1e-9);
        assert!((bearing(1.0, 0.0, 0.0, 0.0) - 180.0).abs() < 1e-9);
        assert!((bearing(0.0, 1.0, 0.0, 0.0) - 270.0).abs() < 1e-9);

        let south_west = bearing(10.0, 10.0, 9.0, 9.0);
        assert!(south_west > 180.0 && south_west < 270.0);
        let north_west = bearing(10.0, 10.0, 11.0, 9.0);
        assert!(north_west > 270.0 && north_west < 360.0);

        assert_eq!(bearing(45.0, 45.0, 45.0, 45.0), 0.0);
    }

    #[test]
    fn disabled_columns_stay_empty() {
        let mut candidate = candidate(30);
        candidate.lag = Some(sample(0, 43.0, -79.0, 50.0));
        candidate.lead = Some(sample(60, 43.0, -78.0, 70.0));

        let config = PositionEnrichmentConfig {
            populate_speed: false,
            populate_bearing: false,
            compass_resolution: Some(CompassResolution::Four),
            ..PositionEnrichmentConfig::default()
        };

        let PositionOutcome::Interpolated(position) = resolve_position(&candidate, &config) else {
            panic!("expected an interpolated position");
        };

        assert_eq!(position.speed, None);
        assert_eq!(position.bearing, None);
        assert_eq!(position.direction, None);
    }

    #[test]
    fn rows_without_lag_are_classified() {
        let config = PositionEnrichmentConfig::default();

        let mut global = candidate(-10);
        global.lead = Some(sample(5, 1.0, 1.0, 0.0));
        assert_eq!(
            resolve_position(&global, &config),
            PositionOutcome::Unresolvable(PositionReason::OlderThanAllLogRecords)
        );

        let mut device = candidate(10);
        device.first_device_sample_utc = Some(at(20));
        device.lead = Some(sample(20, 1.0, 1.0, 0.0));
        assert_eq!(
            resolve_position(&device, &config),
            PositionOutcome::Unresolvable(PositionReason::OlderThanAllDeviceLogRecords)
        );

        let unknown = candidate(10);
        assert_eq!(
            resolve_position(&unknown, &config),
            PositionOutcome::Unresolvable(PositionReason::Unknown)
        );
    }
}
