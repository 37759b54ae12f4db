//! Progress state machine: the transitions that advance a hunt attempt.
//!
//! A hunt attempt has no externally visible "not started" value: the absence
//! of a [`Progress`] is that state. [`Progress::start`] creates one already
//! in progress, [`Progress::mark_visited`] and [`Progress::advance`] move it
//! forward, and completion is recomputed on every advance.
//!
//! All transitions are pure. They take `&self` and return a new value, so a
//! rejected transition leaves the caller's progress exactly as it was.

use std::collections::BTreeSet;

use jiff::{SignedDuration, Timestamp};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::model::{Hunt, Progress};

impl Progress {
    /// Begin a new attempt at `hunt` for `player_id`, starting now.
    pub fn start(hunt: &Hunt, player_id: &str) -> Result<Self> {
        Self::start_at(hunt, player_id, Timestamp::now())
    }

    /// Begin a new attempt with an explicit start time.
    pub fn start_at(hunt: &Hunt, player_id: &str, now: Timestamp) -> Result<Self> {
        if hunt.waypoints.is_empty() {
            return Err(Error::InvalidHunt {
                hunt_id: hunt.id.clone(),
                reason: "hunt has no waypoints".into(),
            });
        }

        Ok(Self {
            id: Uuid::new_v4(),
            player_id: player_id.to_string(),
            hunt_id: hunt.id.clone(),
            visited_waypoint_ids: BTreeSet::new(),
            current_index: 0,
            earned_points: 0,
            started_at: now,
            completed_at: None,
            completed: false,
        })
    }

    /// Record a visit to `waypoint_id`, awarding `points_awarded`.
    ///
    /// Visiting an already visited waypoint awards nothing and returns an
    /// identical progress. Negative awards are rejected.
    pub fn mark_visited(&self, waypoint_id: &str, points_awarded: i64) -> Result<Self> {
        if waypoint_id.is_empty() {
            return Err(Error::InvalidArgument("waypoint id is empty".into()));
        }
        if points_awarded < 0 {
            return Err(Error::InvalidArgument(format!(
                "points awarded must not be negative (got {points_awarded})"
            )));
        }

        if self.has_visited(waypoint_id) {
            return Ok(self.clone());
        }

        let earned_points = u32::try_from(points_awarded)
            .ok()
            .and_then(|p| self.earned_points.checked_add(p))
            .ok_or_else(|| {
                Error::InvalidArgument(format!("points awarded too large: {points_awarded}"))
            })?;

        let mut next = self.clone();
        next.visited_waypoint_ids.insert(waypoint_id.to_string());
        next.earned_points = earned_points;
        Ok(next)
    }

    /// Move to the next waypoint, now. See [`Progress::advance_at`].
    pub fn advance(&self, total_waypoints: usize) -> Result<Self> {
        self.advance_at(total_waypoints, Timestamp::now())
    }

    /// Move to the next waypoint, clamping at the last one.
    ///
    /// The attempt completes only when the index sits on the last waypoint
    /// *and* at least `total_waypoints` waypoints have been visited. Reaching
    /// the end of the list alone does not complete a hunt.
    pub fn advance_at(&self, total_waypoints: usize, now: Timestamp) -> Result<Self> {
        if total_waypoints == 0 {
            return Err(Error::InvalidArgument(
                "total waypoints must be at least one".into(),
            ));
        }

        let last = total_waypoints - 1;
        let next_index = (self.current_index + 1).min(last);
        let completed =
            next_index >= last && self.visited_waypoint_ids.len() >= total_waypoints;

        let completed_at = match (completed, self.completed_at) {
            (true, Some(at)) => Some(at),
            (true, None) => Some(now),
            (false, _) => None,
        };

        let mut next = self.clone();
        next.current_index = next_index;
        next.completed = completed;
        next.completed_at = completed_at;
        Ok(next)
    }

    /// Time spent on the attempt: until completion, or until now if still running.
    pub fn elapsed(&self) -> SignedDuration {
        self.elapsed_at(Timestamp::now())
    }

    /// Time spent on the attempt as of `now`. Never negative.
    pub fn elapsed_at(&self, now: Timestamp) -> SignedDuration {
        let end = self.completed_at.unwrap_or(now);
        let elapsed = end.duration_since(self.started_at);
        if elapsed.is_negative() {
            SignedDuration::ZERO
        } else {
            elapsed
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    use crate::geo::GeoPoint;
    use crate::model::{Difficulty, Waypoint};

    pub(crate) fn waypoint(id: &str, position: GeoPoint, points: u32, index: u32) -> Waypoint {
        Waypoint {
            id: id.into(),
            name: format!("Waypoint {id}"),
            description: String::new(),
            position,
            hint: format!("Look near {id}"),
            point_value: points,
            sequence_index: index,
        }
    }

    /// Two waypoints worth 100 points each, a few hundred meters apart.
    pub(crate) fn two_stop_hunt() -> Hunt {
        Hunt {
            id: "harbor".into(),
            name: "Harbor Walk".into(),
            description: "Two stops along the quay.".into(),
            waypoints: vec![
                waypoint("w0", GeoPoint::new(47.3769, 8.5417), 100, 0),
                waypoint("w1", GeoPoint::new(47.3790, 8.5440), 100, 1),
            ],
            clues: vec![],
            total_points: 200,
            estimated_duration_minutes: 20,
            difficulty: Difficulty::Beginner,
            image_url: None,
            active: true,
        }
    }

    fn ts(seconds: i64) -> Timestamp {
        Timestamp::new(seconds, 0).unwrap()
    }

    fn assert_completion_invariant(p: &Progress) {
        assert_eq!(p.completed, p.completed_at.is_some());
    }

    #[test]
    fn start_creates_fresh_progress() {
        let hunt = two_stop_hunt();
        let p = Progress::start_at(&hunt, "ana", ts(1_000)).unwrap();

        assert_eq!(p.player_id, "ana");
        assert_eq!(p.hunt_id, "harbor");
        assert_eq!(p.current_index, 0);
        assert!(p.visited_waypoint_ids.is_empty());
        assert_eq!(p.earned_points, 0);
        assert_eq!(p.started_at, ts(1_000));
        assert!(!p.completed);
        assert_completion_invariant(&p);
    }

    #[test]
    fn start_rejects_empty_hunt() {
        let mut hunt = two_stop_hunt();
        hunt.waypoints.clear();

        let err = Progress::start(&hunt, "ana").unwrap_err();
        assert!(matches!(err, Error::InvalidHunt { .. }));
    }

    #[test]
    fn mark_visited_is_idempotent() {
        let hunt = two_stop_hunt();
        let p = Progress::start(&hunt, "ana").unwrap();

        let once = p.mark_visited("w0", 100).unwrap();
        let twice = once.mark_visited("w0", 100).unwrap();

        assert_eq!(once.earned_points, 100);
        assert_eq!(twice, once);
    }

    #[test]
    fn mark_visited_rejects_negative_points() {
        let hunt = two_stop_hunt();
        let p = Progress::start(&hunt, "ana").unwrap();

        let err = p.mark_visited("w0", -5).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert!(p.visited_waypoint_ids.is_empty());
    }

    #[test]
    fn mark_visited_rejects_overflow() {
        let hunt = two_stop_hunt();
        let mut p = Progress::start(&hunt, "ana").unwrap();
        p.earned_points = u32::MAX - 1;

        let err = p.mark_visited("w0", 10).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }

    #[test]
    fn earned_points_never_decrease() {
        let hunt = two_stop_hunt();
        let mut p = Progress::start(&hunt, "ana").unwrap();
        let visits = [("w0", 100), ("w0", 100), ("w1", 0), ("w1", 40)];

        let mut last = p.earned_points;
        for (id, points) in visits {
            p = p.mark_visited(id, points).unwrap();
            assert!(p.earned_points >= last);
            assert!(
                p.visited_waypoint_ids
                    .iter()
                    .all(|v| hunt.waypoints.iter().any(|w| &w.id == v))
            );
            last = p.earned_points;
        }
        assert_eq!(p.earned_points, 100);
    }

    #[test]
    fn advance_clamps_to_last_index() {
        let hunt = two_stop_hunt();
        let p = Progress::start(&hunt, "ana").unwrap();

        let p = p.advance(2).unwrap();
        assert_eq!(p.current_index, 1);
        let p = p.advance(2).unwrap();
        assert_eq!(p.current_index, 1);
        assert!(!p.completed, "advancing alone must not complete a hunt");
        assert_completion_invariant(&p);
    }

    #[test]
    fn advance_completes_when_all_visited_at_last_index() {
        let hunt = two_stop_hunt();
        let p = Progress::start_at(&hunt, "ana", ts(1_000)).unwrap();

        let p = p.mark_visited("w0", 100).unwrap().advance_at(2, ts(1_100)).unwrap();
        assert!(!p.completed);
        assert_eq!(p.current_index, 1);

        let p = p.mark_visited("w1", 100).unwrap().advance_at(2, ts(1_200)).unwrap();
        assert!(p.completed);
        assert_eq!(p.completed_at, Some(ts(1_200)));
        assert_eq!(p.current_index, 1);
        assert_eq!(p.earned_points, 200);
        assert_completion_invariant(&p);

        // A later advance keeps the original completion time.
        let again = p.advance_at(2, ts(9_999)).unwrap();
        assert_eq!(again.completed_at, Some(ts(1_200)));
    }

    #[test]
    fn completion_is_count_based() {
        // Visiting out of order still completes once the count is reached.
        let hunt = two_stop_hunt();
        let p = Progress::start(&hunt, "ana").unwrap();

        let p = p
            .mark_visited("w1", 100)
            .unwrap()
            .mark_visited("w0", 100)
            .unwrap()
            .advance(2)
            .unwrap();
        assert!(p.completed);
    }

    #[test]
    fn single_waypoint_hunt_completes_on_first_advance() {
        let mut hunt = two_stop_hunt();
        hunt.waypoints.truncate(1);
        let p = Progress::start(&hunt, "ana").unwrap();

        let p = p.mark_visited("w0", 100).unwrap().advance(1).unwrap();
        assert_eq!(p.current_index, 0);
        assert!(p.completed);
    }

    #[test]
    fn advance_rejects_zero_waypoints() {
        let hunt = two_stop_hunt();
        let p = Progress::start(&hunt, "ana").unwrap();
        assert!(matches!(p.advance(0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn elapsed_stops_at_completion_and_is_never_negative() {
        let hunt = two_stop_hunt();
        let mut p = Progress::start_at(&hunt, "ana", ts(1_000)).unwrap();

        assert_eq!(p.elapsed_at(ts(1_090)), SignedDuration::from_secs(90));
        assert_eq!(p.elapsed_at(ts(500)), SignedDuration::ZERO);

        p.completed = true;
        p.completed_at = Some(ts(1_060));
        assert_eq!(p.elapsed_at(ts(5_000)), SignedDuration::from_secs(60));
    }
}
