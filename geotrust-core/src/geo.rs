//! Great-circle distance. Meters are the canonical unit everywhere else.

use crate::types::Coordinate;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two raw lat/lng pairs.
///
/// No validation: NaN in, NaN out. Samples are validated at ingestion.
pub fn haversine_m(lat1: f64, lng1: f64, lat2: f64, lng2: f64) -> f64 {
    let dlat = (lat2 - lat1).to_radians();
    let dlng = (lng2 - lng1).to_radians();
    let a = (dlat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (dlng / 2.0).sin().powi(2);
    EARTH_RADIUS_M * 2.0 * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Distance in meters between two coordinates.
pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    haversine_m(a.lat, a.lng, b.lat, b.lng)
}

/// Distance in kilometers, for display.
pub fn distance_km(a: &Coordinate, b: &Coordinate) -> f64 {
    distance(a, b) / 1000.0
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn c(lat: f64, lng: f64) -> Coordinate {
        Coordinate { lat, lng }
    }

    #[test]
    fn test_same_point_is_zero() {
        let p = c(23.7771, 90.3994);
        assert_eq!(distance(&p, &p), 0.0);
    }

    #[test]
    fn test_symmetry() {
        let pairs = [
            (c(0.0, 0.0), c(0.0, 1.0)),
            (c(35.4362, -82.5418), c(35.2140, -80.9431)),
            (c(-33.86, 151.2), c(51.5, -0.12)),
            (c(89.9, 10.0), c(-89.9, -170.0)),
        ];
        for (a, b) in pairs {
            let ab = distance(&a, &b);
            let ba = distance(&b, &a);
            assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
        }
    }

    #[test]
    fn test_one_degree_of_latitude() {
        // 1 degree along a meridian = R * pi / 180
        let d = distance(&c(0.0, 0.0), &c(1.0, 0.0));
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        assert!((d - expected).abs() < 1e-6, "got {d}");
    }

    #[test]
    fn test_known_distance() {
        // Asheville to Charlotte, ~178 km
        let d = distance_km(&c(35.4362, -82.5418), &c(35.2140, -80.9431));
        assert!(d > 140.0 && d < 220.0, "AVL-CLT should be ~178 km, got {d}");
    }

    #[test]
    fn test_nan_propagates() {
        assert!(haversine_m(f64::NAN, 0.0, 0.0, 0.0).is_nan());
    }
}
