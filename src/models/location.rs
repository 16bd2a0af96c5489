//! Geographic location handling, including the stable grid key used across every store.

use serde::{Deserialize, Serialize};

/// A caller-chosen geographic point with a human-readable name.
///
/// Invariant: a persisted row is always tagged with both the caller-supplied
/// `name` and the derived `location_id` so the grid key and the display name
/// never drift apart.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
}

impl Location {
    pub fn new(latitude: f64, longitude: f64, name: impl Into<String>) -> Self {
        Self {
            latitude,
            longitude,
            name: name.into(),
        }
    }

    /// Stable key `"{lat:.4f}_{lon:.4f}"`; rounding to 4 decimals fixes the grid
    /// so repeated searches of nearby points collapse onto the same row.
    pub fn id(&self) -> String {
        location_id(self.latitude, self.longitude)
    }
}

/// Computes the stable grid key for a raw (lat, lon) pair without requiring a
/// fully-constructed `Location`.
pub fn location_id(latitude: f64, longitude: f64) -> String {
    format!("{:.4}_{:.4}", latitude, longitude)
}

/// Great-circle distance between two points in kilometers (Haversine formula).
/// Used by the priority index's `FindNearest` after a cheap bounding-box
/// pre-filter has narrowed the candidate set.
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    const EARTH_RADIUS_KM: f64 = 6371.0088;
    let (lat1_r, lat2_r) = (lat1.to_radians(), lat2.to_radians());
    let dlat = (lat2 - lat1).to_radians();
    let dlon = (lon2 - lon1).to_radians();
    let a = (dlat / 2.0).sin().powi(2) + lat1_r.cos() * lat2_r.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn location_id_rounds_to_four_decimals() {
        let loc = Location::new(40.712812345, -74.006012345, "New York");
        assert_eq!(loc.id(), "40.7128_-74.0060");
    }

    #[test]
    fn haversine_zero_distance_for_same_point() {
        let d = haversine_km(40.7128, -74.0060, 40.7128, -74.0060);
        assert!(d < 1e-6);
    }

    #[test]
    fn haversine_nyc_to_boston_is_roughly_right() {
        // NYC to Boston is approximately 306 km as the crow flies.
        let d = haversine_km(40.7128, -74.0060, 42.3601, -71.0589);
        assert!((d - 306.0).abs() < 15.0, "distance was {d}");
    }
}
