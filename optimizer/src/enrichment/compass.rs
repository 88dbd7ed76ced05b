use config::shared::CompassResolution;

/// Sixteen-point compass rose, clockwise from north.
const POINTS: [&str; 16] = [
    "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW", "NW",
    "NNW",
];

/// Names `bearing` (degrees, clockwise from north) with the nearest point of the compass rose.
///
/// Each bucket is centered on its point, so with four points `N` covers `[315, 45)`.
pub fn compass_direction(bearing: f64, resolution: CompassResolution) -> &'static str {
    let points = resolution.points();
    let width = 360.0 / points as f64;
    let bucket = (bearing.rem_euclid(360.0) / width).round() as usize % points;

    POINTS[bucket * (POINTS.len() / points)]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn four_point_buckets_are_centered_on_cardinal_directions() {
        assert_eq!(compass_direction(0.0, CompassResolution::Four), "N");
        assert_eq!(compass_direction(44.9, CompassResolution::Four), "N");
        assert_eq!(compass_direction(45.0, CompassResolution::Four), "E");
        assert_eq!(compass_direction(180.0, CompassResolution::Four), "S");
        assert_eq!(compass_direction(314.0, CompassResolution::Four), "W");
        assert_eq!(compass_direction(359.9, CompassResolution::Four), "N");
    }

    #[test]
    fn eight_point_buckets_include_intercardinal_directions() {
        assert_eq!(compass_direction(22.4, CompassResolution::Eight), "N");
        assert_eq!(compass_direction(22.5, CompassResolution::Eight), "NE");
        assert_eq!(compass_direction(135.0, CompassResolution::Eight), "SE");
        assert_eq!(compass_direction(292.0, CompassResolution::Eight), "W");
        assert_eq!(compass_direction(300.0, CompassResolution::Eight), "NW");
    }

    #[test]
    fn sixteen_point_buckets_name_every_point() {
        for (index, name) in POINTS.iter().enumerate() {
            let bearing = index as f64 * 22.5;
            assert_eq!(compass_direction(bearing, CompassResolution::Sixteen), *name);
        }

        assert_eq!(compass_direction(11.0, CompassResolution::Sixteen), "N");
        assert_eq!(compass_direction(12.0, CompassResolution::Sixteen), "NNE");
        assert_eq!(compass_direction(-10.0, CompassResolution::Sixteen), "N");
    }

    #[test]
    fn coarser_resolutions_agree_with_finer_ones_at_bucket_centers() {
        for bearing in [0.0, 45.0, 90.0, 135.0, 180.0, 225.0, 270.0, 315.0] {
            assert_eq!(
                compass_direction(bearing, CompassResolution::Eight),
                compass_direction(bearing, CompassResolution::Sixteen)
            );
        }
    }
}
