//! Progress types: one player's advancement through one hunt attempt.

use std::collections::BTreeSet;

use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A player's state of advancement through a hunt attempt.
///
/// Changed only through the transitions in [`crate::progress`]; each returns
/// a new value and leaves the original untouched.
///
/// Invariants: `completed` iff `completed_at.is_some()`, `visited_waypoint_ids`
/// is a subset of the hunt's waypoint ids, and `earned_points` is the sum of
/// the visited waypoints' point values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Progress {
    pub id: Uuid,
    pub player_id: String,
    pub hunt_id: String,
    pub visited_waypoint_ids: BTreeSet<String>,

    /// Position of the current target waypoint in the hunt's traversal order.
    pub current_index: usize,

    pub earned_points: u32,
    pub started_at: Timestamp,
    pub completed_at: Option<Timestamp>,
    pub completed: bool,
}

impl Progress {
    pub fn has_visited(&self, waypoint_id: &str) -> bool {
        self.visited_waypoint_ids.contains(waypoint_id)
    }
}

/// Where a stored progress record stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProgressStatus {
    /// The attempt is being played.
    Active,

    /// Every waypoint was visited.
    Completed,

    /// The player gave up. History is kept.
    Abandoned,
}

impl ProgressStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "abandoned" => Some(Self::Abandoned),
            _ => None,
        }
    }
}
