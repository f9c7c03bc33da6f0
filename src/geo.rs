// 🌍 Geo - Great-circle distance
// Haversine distance between two WGS84-ish coordinates

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Approximate distance in kilometers between two points, rounded to
/// 3 decimal places.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // Clamp guards against a creeping slightly above 1.0 for antipodes
    let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());

    round3(EARTH_RADIUS_KM * c)
}

/// Round to 3 decimal places (the precision persisted on assignments).
pub fn round3(value: f64) -> f64 {
    (value * 1000.0).round() / 1000.0
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_distance() {
        assert_eq!(haversine_km(-23.5505, -46.6333, -23.5505, -46.6333), 0.0);
    }

    #[test]
    fn test_known_distance_sao_paulo_franca() {
        // Sao Paulo center to Franca center is roughly 315 km
        let d = haversine_km(-23.5505, -46.6333, -20.5386, -47.4009);
        assert!(d > 300.0 && d < 350.0, "unexpected distance: {}", d);
    }

    #[test]
    fn test_symmetry() {
        let a = haversine_km(-23.55, -46.63, -23.56, -46.70);
        let b = haversine_km(-23.56, -46.70, -23.55, -46.63);
        assert_eq!(a, b);
    }

    #[test]
    fn test_rounded_to_three_decimals() {
        let d = haversine_km(-23.5505, -46.6333, -23.5611, -46.6560);
        assert_eq!(d, round3(d));
    }

    #[test]
    fn test_small_offset_is_short() {
        // ~0.0015 degrees of latitude is well under a kilometer
        let d = haversine_km(-23.5505, -46.6333, -23.5520, -46.6333);
        assert!(d > 0.0 && d < 1.0, "unexpected distance: {}", d);
    }
}
