//! Core data model for Trailhead.
//!
//! These types describe hunts as authored (waypoints, clues, scoring),
//! a player's progress through one hunt attempt, and the ephemeral
//! records exchanged during a check-in.

mod check_in;
mod hunt;
mod progress;

pub use check_in::{CheckInAttempt, CheckInReport, CheckInResponse};
pub use hunt::{Clue, ClueDifficulty, Difficulty, Hunt, Waypoint};
pub use progress::{Progress, ProgressStatus};
