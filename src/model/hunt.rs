//! Hunt types: the read-only description of a scavenger hunt.

use serde::{Deserialize, Serialize};

use crate::geo::GeoPoint;

/// A themed, ordered sequence of waypoints a player visits for points.
///
/// Owned by the catalog. Waypoints are sorted by `sequence_index` once the
/// hunt has been validated; nothing in the core mutates a loaded hunt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hunt {
    pub id: String,
    pub name: String,
    pub description: String,
    pub waypoints: Vec<Waypoint>,

    #[serde(default)]
    pub clues: Vec<Clue>,

    /// Sum of every waypoint's `point_value`.
    pub total_points: u32,

    #[serde(default)]
    pub estimated_duration_minutes: u32,

    #[serde(default)]
    pub difficulty: Difficulty,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,

    #[serde(default = "active_by_default")]
    pub active: bool,
}

fn active_by_default() -> bool {
    true
}

impl Hunt {
    /// The waypoint at a traversal position, if there is one.
    pub fn waypoint(&self, index: usize) -> Option<&Waypoint> {
        self.waypoints.get(index)
    }

    /// The clue attached to a waypoint, if the author wrote one.
    pub fn clue_for(&self, waypoint_id: &str) -> Option<&Clue> {
        self.clues.iter().find(|c| c.waypoint_id == waypoint_id)
    }

    /// Sum of waypoint point values, independent of the declared total.
    pub fn computed_total(&self) -> u64 {
        self.waypoints.iter().map(|w| u64::from(w.point_value)).sum()
    }
}

/// One stop in a hunt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Waypoint {
    /// Unique within the hunt.
    pub id: String,
    pub name: String,
    pub description: String,
    pub position: GeoPoint,

    #[serde(default)]
    pub hint: String,

    pub point_value: u32,

    /// Defines traversal order. Strictly increasing across a hunt, gaps allowed.
    pub sequence_index: u32,
}

/// A riddle pointing the player at a waypoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Clue {
    pub id: String,
    pub waypoint_id: String,
    pub text: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,

    #[serde(default)]
    pub difficulty: ClueDifficulty,
}

/// How demanding a hunt is overall.
///
/// Decoding is case-insensitive; unknown tiers fall back to `Intermediate`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum Difficulty {
    Beginner,
    #[default]
    Intermediate,
    Advanced,
    Expert,
}

impl From<String> for Difficulty {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "BEGINNER" => Self::Beginner,
            "ADVANCED" => Self::Advanced,
            "EXPERT" => Self::Expert,
            _ => Self::Intermediate,
        }
    }
}

impl Difficulty {
    pub fn label(self) -> &'static str {
        match self {
            Self::Beginner => "beginner",
            Self::Intermediate => "intermediate",
            Self::Advanced => "advanced",
            Self::Expert => "expert",
        }
    }
}

/// How hard a single clue is to crack.
///
/// Decoding is case-insensitive; unknown values fall back to `Medium`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", from = "String")]
pub enum ClueDifficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl From<String> for ClueDifficulty {
    fn from(value: String) -> Self {
        match value.to_ascii_uppercase().as_str() {
            "EASY" => Self::Easy,
            "HARD" => Self::Hard,
            _ => Self::Medium,
        }
    }
}
