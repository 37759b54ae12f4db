//! Check-in records: what is submitted, what comes back, what the caller sees.

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

use super::Progress;

/// A single attempt to claim a waypoint. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInAttempt {
    pub hunt_id: String,

    /// The target waypoint at the time of the attempt.
    pub waypoint_id: String,

    pub observed_position: GeoPoint,
    pub distance_meters: f32,
}

/// The check-in collaborator's answer to an attempt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResponse {
    pub success: bool,
    pub message: String,

    /// Authoritative snapshot. Supersedes local state when present.
    #[serde(default)]
    pub progress: Option<Progress>,

    #[serde(default)]
    pub points_earned: u32,
}

/// The result of a successful check-in, after it has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckInReport {
    pub message: String,
    pub points_earned: u32,
    pub progress: Progress,
}

impl CheckInReport {
    pub fn completed(&self) -> bool {
        self.progress.completed
    }
}
