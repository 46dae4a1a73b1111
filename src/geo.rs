//! Great-circle distance for geofence checks.

use crate::models::GeoPoint;

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance between two points, in meters.
///
/// Accurate to well under a meter at geofence scale (~50m), which is all the
/// pickup/drop proximity checks need.
pub fn haversine_distance_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat_a = a.lat.to_radians();
    let lat_b = b.lat.to_radians();
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        let p = GeoPoint::new(12.9716, 77.5946);
        assert!(haversine_distance_m(p, p) < 1e-6);
    }

    #[test]
    fn test_known_city_pair() {
        // Bangalore (MG Road) to Chennai (Central), roughly 290 km.
        let blr = GeoPoint::new(12.9757, 77.6050);
        let maa = GeoPoint::new(13.0827, 80.2707);
        let d = haversine_distance_m(blr, maa);
        assert!((280_000.0..300_000.0).contains(&d), "got {d}");
    }

    #[test]
    fn test_geofence_scale() {
        // ~0.00045 degrees of latitude is about 50 meters.
        let a = GeoPoint::new(12.971600, 77.594600);
        let near = GeoPoint::new(12.971900, 77.594600); // ~33 m north
        let far = GeoPoint::new(12.972600, 77.594600); // ~111 m north
        assert!(haversine_distance_m(a, near) < 50.0);
        assert!(haversine_distance_m(a, far) > 50.0);
    }
}
