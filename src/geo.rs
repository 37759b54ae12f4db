//! Geographic coordinates and great-circle distance.

use serde::{Deserialize, Serialize};

/// Mean Earth radius used by the haversine formula, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A position on the Earth's surface.
///
/// Produced by the location source or written by hunt authors. Never mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoPoint {
    /// Degrees, in `[-90, 90]`.
    pub latitude: f64,

    /// Degrees, in `[-180, 180]`.
    pub longitude: f64,

    /// Meters above sea level. Zero when unknown.
    #[serde(default)]
    pub altitude: f64,

    /// Horizontal accuracy radius in meters, as reported by the source.
    #[serde(default)]
    pub horizontal_accuracy: f32,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: 0.0,
            horizontal_accuracy: 0.0,
        }
    }

    /// Great-circle distance to `other` in meters. See [`distance_meters`].
    pub fn distance_to(&self, other: &GeoPoint) -> f32 {
        distance_meters(self, other)
    }
}

/// Great-circle distance between two points in meters, using the haversine formula.
///
/// Inputs are not validated. The result is never negative and is exactly zero
/// for identical points.
#[allow(clippy::cast_possible_truncation)]
pub fn distance_meters(a: &GeoPoint, b: &GeoPoint) -> f32 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let sin_dlat_2 = (dlat / 2.0).sin();
    let sin_dlon_2 = (dlon / 2.0).sin();
    let h = sin_dlat_2 * sin_dlat_2 + lat1.cos() * lat2.cos() * sin_dlon_2 * sin_dlon_2;

    // Rounding can push `h` a hair outside [0, 1] for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    (EARTH_RADIUS_M * c) as f32
}

/// Whether `a` and `b` are at most `radius_m` meters apart.
pub fn within_radius(a: &GeoPoint, b: &GeoPoint, radius_m: f32) -> bool {
    distance_meters(a, b) <= radius_m
}
