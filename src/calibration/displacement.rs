//! Ground-truth displacement between position fixes.
//!
//! Only the scalar distance between two consecutive fixes is used; no path
//! or heading is kept.

use serde::{Deserialize, Serialize};

use crate::config::DistanceModel;
use crate::error::TrackerError;

/// Mean earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A validated latitude/longitude pair in degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    latitude: f64,
    longitude: f64,
}

impl GeoPoint {
    /// Build a point, rejecting NaN/infinite or out-of-range coordinates
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, TrackerError> {
        let valid = latitude.is_finite()
            && longitude.is_finite()
            && (-90.0..=90.0).contains(&latitude)
            && (-180.0..=180.0).contains(&longitude);

        if !valid {
            return Err(TrackerError::InvalidCoordinates {
                latitude,
                longitude,
            });
        }

        Ok(Self {
            latitude,
            longitude,
        })
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    /// Distance to `other` in meters under the given model
    pub fn distance_to(&self, other: &GeoPoint, model: DistanceModel) -> f64 {
        match model {
            DistanceModel::Haversine => haversine_distance(
                self.latitude,
                self.longitude,
                other.latitude,
                other.longitude,
            ),
            DistanceModel::Equirectangular => equirectangular_distance(
                self.latitude,
                self.longitude,
                other.latitude,
                other.longitude,
            ),
        }
    }
}

/// Great-circle distance in meters
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let to_rad = |deg: f64| deg.to_radians();
    let dlat = to_rad(lat2 - lat1);
    let dlon = to_rad(lon2 - lon1);
    let a = (dlat / 2.0).sin().powi(2)
        + to_rad(lat1).cos() * to_rad(lat2).cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_M * c
}

/// Planar approximation in meters, accurate for short hops
pub fn equirectangular_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let mut dlon = (lon2 - lon1).to_radians();
    // Shortest way round across the antimeridian
    if dlon > std::f64::consts::PI {
        dlon -= 2.0 * std::f64::consts::PI;
    } else if dlon < -std::f64::consts::PI {
        dlon += 2.0 * std::f64::consts::PI;
    }
    let mean_lat = ((lat1 + lat2) / 2.0).to_radians();
    let x = dlon * mean_lat.cos();
    let y = (lat2 - lat1).to_radians();
    EARTH_RADIUS_M * (x * x + y * y).sqrt()
}

/// The last accepted fix and the tracker values at that moment
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixRecord {
    pub position: GeoPoint,
    /// Session step count when the fix arrived
    pub session_steps: u64,
    /// Cumulative distance confirmed at the fix
    pub distance_m: f64,
}

/// Result of applying a position fix
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FixOutcome {
    /// First fix of the session; stored as the reference point only
    Baseline,
    /// Displacement measured against the previous fix
    Applied {
        displacement_m: f64,
        steps_since_fix: u64,
        /// New step length, when both displacement and steps were non-zero
        refined_step_length_m: Option<f64>,
        /// This fix carried the session past the calibration distance
        calibration_completed: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Degrees of latitude spanning `meters` along a meridian
    fn meridian_degrees(meters: f64) -> f64 {
        (meters / EARTH_RADIUS_M).to_degrees()
    }

    #[test]
    fn test_haversine_distance() {
        let dist = haversine_distance(0.0, 0.0, 0.0, 1.0);
        assert!((dist - 111_195.0).abs() < 200.0);
    }

    #[test]
    fn test_haversine_meridian_is_exact() {
        let lat = meridian_degrees(200.0);
        let dist = haversine_distance(37.0, 127.0, 37.0 + lat, 127.0);
        assert!((dist - 200.0).abs() < 1e-6, "got {}", dist);
    }

    #[test]
    fn test_equirectangular_matches_haversine_for_short_hops() {
        let a = GeoPoint::new(37.5665, 126.9780).unwrap();
        let b = GeoPoint::new(37.5680, 126.9801).unwrap();

        let great_circle = a.distance_to(&b, DistanceModel::Haversine);
        let planar = a.distance_to(&b, DistanceModel::Equirectangular);
        assert!(great_circle > 200.0 && great_circle < 300.0);
        assert!((great_circle - planar).abs() < 0.01);
    }

    #[test]
    fn test_equirectangular_wraps_antimeridian() {
        let dist = equirectangular_distance(0.0, 179.9995, 0.0, -179.9995);
        assert!(dist < 200.0, "expected ~111 m across the antimeridian, got {}", dist);
    }

    #[test]
    fn test_identical_points_are_zero_apart() {
        let a = GeoPoint::new(51.5, -0.12).unwrap();
        assert_eq!(a.distance_to(&a, DistanceModel::Haversine), 0.0);
        assert_eq!(a.distance_to(&a, DistanceModel::Equirectangular), 0.0);
    }

    #[test]
    fn test_invalid_coordinates_rejected() {
        assert!(GeoPoint::new(f64::NAN, 0.0).is_err());
        assert!(GeoPoint::new(0.0, f64::INFINITY).is_err());
        assert!(GeoPoint::new(90.5, 0.0).is_err());
        assert!(GeoPoint::new(0.0, -180.5).is_err());
        assert!(GeoPoint::new(-90.0, 180.0).is_ok());
    }
}
