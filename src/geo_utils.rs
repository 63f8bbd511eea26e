//! Geographic utilities: great-circle distance, bearings and degree
//! conversions used by every matcher in the crate.

use crate::GpsPoint;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Approximate meters per degree of latitude.
const METERS_PER_DEGREE: f64 = 111_320.0;

/// Great-circle distance in meters between two coordinates (haversine).
///
/// # Example
/// ```
/// use cell_matcher::geo_utils::haversine_distance;
///
/// let d = haversine_distance(50.4501, 30.5234, 50.4501, 30.5234);
/// assert_eq!(d, 0.0);
/// ```
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dphi = (lat2 - lat1).to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let a = (dphi / 2.0).sin().powi(2) + phi1.cos() * phi2.cos() * (dlambda / 2.0).sin().powi(2);
    // Rounding can push `a` marginally past 1 for near-antipodal points
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Initial compass bearing in degrees [0, 360) from point 1 to point 2.
pub fn bearing(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let dlambda = (lon2 - lon1).to_radians();

    let y = dlambda.sin() * phi2.cos();
    let x = phi1.cos() * phi2.sin() - phi1.sin() * phi2.cos() * dlambda.cos();

    normalize_degrees(y.atan2(x).to_degrees())
}

/// Shortest difference between two bearings, in degrees [0, 180].
pub fn angular_difference(a: f64, b: f64) -> f64 {
    let diff = (a - b).rem_euclid(360.0);
    if diff > 180.0 {
        360.0 - diff
    } else {
        diff
    }
}

/// Wrap an angle into [0, 360).
pub fn normalize_degrees(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid can return exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Distance in meters between two points.
pub fn point_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    haversine_distance(p1.latitude, p1.longitude, p2.latitude, p2.longitude)
}

/// Initial bearing in degrees from `from` to `to`.
pub fn point_bearing(from: &GpsPoint, to: &GpsPoint) -> f64 {
    bearing(from.latitude, from.longitude, to.latitude, to.longitude)
}

/// Convert a distance in meters to (latitude, longitude) degree spans at
/// the given reference latitude.
///
/// The spans are padded so that an axis-aligned box built from them always
/// contains the full `meters` circle; callers still confirm with
/// [`haversine_distance`]. Returns `None` when the longitude span is
/// unbounded (too close to a pole).
pub fn meters_to_degrees(meters: f64, ref_lat: f64) -> Option<(f64, f64)> {
    let lat_span = meters / METERS_PER_DEGREE * 1.05 + 1e-9;
    let extreme_lat = (ref_lat.abs() + lat_span).min(90.0);
    let cos_lat = extreme_lat.to_radians().cos();
    if cos_lat < 1e-3 {
        return None;
    }
    let lng_span = meters / (METERS_PER_DEGREE * cos_lat) * 1.05 + 1e-9;
    if lng_span >= 180.0 {
        return None;
    }
    Some((lat_span, lng_span))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_haversine_known_distance() {
        // Kyiv to Lviv is roughly 469 km
        let d = haversine_distance(50.4501, 30.5234, 49.8397, 24.0297);
        assert!((d - 469_000.0).abs() < 5_000.0, "got {}", d);
    }

    #[test]
    fn test_haversine_symmetric_and_zero() {
        let a = (50.45, 30.52);
        let b = (50.46, 30.55);
        let ab = haversine_distance(a.0, a.1, b.0, b.1);
        let ba = haversine_distance(b.0, b.1, a.0, a.1);
        assert_eq!(ab, ba);
        assert_eq!(haversine_distance(a.0, a.1, a.0, a.1), 0.0);
    }

    #[test]
    fn test_haversine_monotonic() {
        let near = haversine_distance(0.0, 0.0, 0.0, 0.001);
        let far = haversine_distance(0.0, 0.0, 0.0, 0.002);
        assert!(near < far);
    }

    #[test]
    fn test_bearing_cardinal_directions() {
        assert!((bearing(0.0, 0.0, 1.0, 0.0) - 0.0).abs() < 1e-9);
        assert!((bearing(0.0, 0.0, 0.0, 1.0) - 90.0).abs() < 1e-9);
        assert!((bearing(0.0, 0.0, -1.0, 0.0) - 180.0).abs() < 1e-9);
        assert!((bearing(0.0, 0.0, 0.0, -1.0) - 270.0).abs() < 1e-9);
    }

    #[test]
    fn test_bearing_not_symmetric() {
        let forward = bearing(50.45, 30.52, 50.46, 30.53);
        let back = bearing(50.46, 30.53, 50.45, 30.52);
        assert!((angular_difference(forward, back) - 180.0).abs() < 0.1);
    }

    #[test]
    fn test_angular_difference() {
        assert_eq!(angular_difference(10.0, 350.0), 20.0);
        assert_eq!(angular_difference(350.0, 10.0), 20.0);
        assert_eq!(angular_difference(0.0, 180.0), 180.0);
        assert_eq!(angular_difference(90.0, 90.0), 0.0);
        assert_eq!(angular_difference(-90.0, 270.0), 0.0);
    }

    #[test]
    fn test_normalize_degrees() {
        assert_eq!(normalize_degrees(360.0), 0.0);
        assert_eq!(normalize_degrees(-90.0), 270.0);
        assert_eq!(normalize_degrees(725.0), 5.0);
    }

    #[test]
    fn test_meters_to_degrees_covers_circle() {
        let (dlat, dlng) = meters_to_degrees(500.0, 50.45).unwrap();
        let north = haversine_distance(50.45, 30.52, 50.45 + dlat, 30.52);
        let east = haversine_distance(50.45, 30.52, 50.45, 30.52 + dlng);
        assert!(north >= 500.0);
        assert!(east >= 500.0);
        assert!(meters_to_degrees(500.0, 89.999).is_none());
    }
}
