//! Proximity evaluation: is the player close enough to claim a waypoint?

use serde::Serialize;

use crate::geo::{GeoPoint, within_radius};
use crate::model::Waypoint;

/// Check-in radius used when none is configured, in meters.
pub const DEFAULT_CHECK_IN_RADIUS_M: f32 = 30.0;

/// Distance to the target and whether a check-in would be accepted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proximity {
    /// `None` until the first position sample arrives.
    pub distance_meters: Option<f32>,
    pub eligible: bool,
}

/// Decides check-in eligibility from the latest position sample.
#[derive(Debug, Clone, Copy)]
pub struct ProximityEvaluator {
    radius_m: f32,
}

impl Default for ProximityEvaluator {
    fn default() -> Self {
        Self::new(DEFAULT_CHECK_IN_RADIUS_M)
    }
}

impl ProximityEvaluator {
    pub fn new(radius_m: f32) -> Self {
        Self { radius_m }
    }

    pub fn radius_m(&self) -> f32 {
        self.radius_m
    }

    /// Evaluate `position` against `target`.
    ///
    /// An unknown position is never eligible and has no distance.
    pub fn evaluate(&self, position: Option<&GeoPoint>, target: &Waypoint) -> Proximity {
        let Some(position) = position else {
            return Proximity::default();
        };

        Proximity {
            distance_meters: Some(position.distance_to(&target.position)),
            eligible: within_radius(position, &target.position, self.radius_m),
        }
    }
}
