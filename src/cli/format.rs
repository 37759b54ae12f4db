//! Output formatting for CLI display.

use jiff::SignedDuration;
use uuid::Uuid;

use crate::model::{Hunt, Progress};
use crate::proximity::Proximity;

/// Elapsed time: `1h 5m`, `5m 3s`, or `42s`. Negative spans show as `0s`.
pub(super) fn format_elapsed(elapsed: SignedDuration) -> String {
    let total = elapsed.as_secs().max(0);
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;

    if hours > 0 {
        format!("{hours}h {minutes}m")
    } else if minutes > 0 {
        format!("{minutes}m {seconds}s")
    } else {
        format!("{seconds}s")
    }
}

/// Distance: whole meters below a kilometer, tenths of a kilometer above.
pub(super) fn format_distance(meters: f32) -> String {
    if meters < 1000.0 {
        format!("{meters:.0} m")
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

/// Distance to the target, or a placeholder before the first fix.
pub(super) fn format_proximity(proximity: &Proximity) -> String {
    match proximity.distance_meters {
        Some(d) if proximity.eligible => format!("{} (in reach)", format_distance(d)),
        Some(d) => format_distance(d),
        None => "no position yet".to_string(),
    }
}

/// `Waypoint 2/5 · 150/400 pts`
pub(super) fn format_progress(hunt: &Hunt, progress: &Progress) -> String {
    let total = hunt.waypoints.len();
    let stop = if progress.completed {
        total
    } else {
        progress.current_index + 1
    };
    format!(
        "Waypoint {stop}/{total} · {}/{} pts",
        progress.earned_points, hunt.total_points
    )
}

pub(super) fn short_id(id: Uuid) -> String {
    id.to_string()[..8].to_string()
}
