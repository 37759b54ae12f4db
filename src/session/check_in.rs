//! Check-in orchestration: claim the current waypoint exactly once.
//!
//! An attempt goes through four steps:
//!
//! 1. Local preconditions: an active hunt that is not yet completed, a known
//!    position, and eligibility against the waypoint at the current index.
//!    Failing any of them rejects the attempt without calling the service.
//! 2. The in-flight slot. At most one attempt per session is outstanding; a
//!    second one is refused with [`Error::AttemptInProgress`], not queued.
//! 3. The service round trip.
//! 4. Apply. An authoritative snapshot replaces local progress wholesale,
//!    so replaying the same response cannot double-count. Without a
//!    snapshot the local transitions are applied instead. A response for a
//!    progress that is no longer active is dropped.
//!
//! The slot is released only after step 4, so whoever reads the view after
//! an attempt returns sees its outcome.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{debug, info, warn};

use crate::catalog::Catalog;
use crate::error::{Error, Result};
use crate::model::{CheckInAttempt, CheckInReport, Progress};
use crate::service::HuntService;

use super::Session;

/// Holds the in-flight slot until dropped.
struct InFlight<'a>(&'a AtomicBool);

impl<'a> InFlight<'a> {
    fn acquire(flag: &'a AtomicBool) -> Result<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| Error::AttemptInProgress)?;
        Ok(Self(flag))
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<C, S> Session<C, S>
where
    C: Catalog + Sync,
    S: HuntService + Sync,
{
    /// Try to claim the current waypoint at the latest known position.
    pub async fn attempt_check_in(&self) -> Result<CheckInReport> {
        let view = self.active_view().ok_or_else(|| not_eligible("no hunt is active", None))?;
        if view.progress.completed {
            return Err(not_eligible("hunt is already completed", None));
        }
        let Some(target) = view.current_waypoint().cloned() else {
            return Err(not_eligible("no current waypoint", None));
        };
        let Some(position) = view.position else {
            return Err(not_eligible("no position fix yet", None));
        };
        let proximity = self.evaluator.evaluate(Some(&position), &target);
        if !proximity.eligible {
            debug!(
                waypoint = %target.id,
                distance = ?proximity.distance_meters,
                "check-in rejected locally"
            );
            return Err(not_eligible(
                &format!("outside the {:.0} m check-in radius", self.evaluator.radius_m()),
                proximity.distance_meters,
            ));
        }

        let _slot = InFlight::acquire(&self.in_flight)?;

        let attempt = CheckInAttempt {
            hunt_id: view.hunt.id.clone(),
            waypoint_id: target.id.clone(),
            observed_position: position,
            distance_meters: proximity.distance_meters.unwrap_or_default(),
        };
        info!(hunt = %attempt.hunt_id, waypoint = %attempt.waypoint_id, "submitting check-in");

        let response = match self.service.submit_check_in(&attempt).await {
            Ok(response) => response,
            Err(err) => {
                warn!(waypoint = %target.id, error = %err, "check-in failed");
                return Err(err);
            }
        };
        if !response.success {
            info!(waypoint = %target.id, message = %response.message, "check-in refused");
            return Err(not_eligible(&response.message, proximity.distance_meters));
        }

        let next = match response.progress {
            Some(snapshot) => snapshot,
            None => view
                .progress
                .mark_visited(&target.id, i64::from(target.point_value))?
                .advance(view.hunt.waypoints.len())?,
        };
        self.apply(&view.progress, next.clone())?;
        let points_earned = next.earned_points.saturating_sub(view.progress.earned_points);

        info!(
            waypoint = %target.id,
            points = points_earned,
            total = next.earned_points,
            completed = next.completed,
            "check-in applied"
        );
        Ok(CheckInReport {
            message: response.message,
            points_earned,
            progress: next,
        })
    }

    /// Replace the active progress with `next`, if `expected` is still the
    /// active attempt.
    fn apply(&self, expected: &Progress, next: Progress) -> Result<()> {
        if next.id != expected.id {
            warn!(
                expected = %expected.id,
                got = %next.id,
                "check-in result for another attempt discarded"
            );
            return Err(Error::Discarded(format!(
                "snapshot belongs to attempt {}, not {}",
                next.id, expected.id
            )));
        }

        let mut applied = false;
        self.state.send_if_modified(|state| match state {
            Some(view) if view.progress.id == expected.id => {
                view.progress = next;
                self.refresh_proximity(view);
                applied = true;
                true
            }
            _ => false,
        });

        if applied {
            Ok(())
        } else {
            warn!(progress = %expected.id, "check-in result arrived after the attempt ended");
            Err(Error::Discarded(format!(
                "attempt {} is no longer active",
                expected.id
            )))
        }
    }
}

fn not_eligible(reason: &str, distance_meters: Option<f32>) -> Error {
    Error::NotEligible {
        reason: reason.to_string(),
        distance_meters,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Notify;

    use crate::error::Error;
    use crate::geo::tests::north_of;
    use crate::model::CheckInResponse;
    use crate::session::tests::{service_on, session, session_with, stop};
    use crate::storage::Storage;

    #[tokio::test]
    async fn scenario_first_stop_then_completion() {
        let session = session();
        session.start_hunt("harbor").await.unwrap();

        session.update_position(stop(0));
        let view = session.active_view().unwrap();
        assert!(view.proximity.eligible);
        assert_eq!(view.proximity.distance_meters, Some(0.0));

        let report = session.attempt_check_in().await.unwrap();
        assert_eq!(report.points_earned, 100);
        let progress = session.active_view().unwrap().progress;
        assert_eq!(progress, report.progress);
        assert_eq!(progress.current_index, 1);
        assert_eq!(progress.earned_points, 100);
        assert!(progress.has_visited("w0"));
        assert!(!progress.completed);

        session.update_position(stop(1));
        let report = session.attempt_check_in().await.unwrap();
        assert!(report.completed());
        let progress = session.active_view().unwrap().progress;
        assert_eq!(progress.current_index, 1);
        assert_eq!(progress.earned_points, 200);
        assert_eq!(progress.visited_waypoint_ids.len(), 2);
        assert!(progress.completed_at.is_some());
    }

    #[tokio::test]
    async fn forty_meters_out_is_rejected_locally() {
        let session = session();
        let started = session.start_hunt("harbor").await.unwrap();
        session.update_position(north_of(&stop(0), 40.0));

        let err = session.attempt_check_in().await.unwrap_err();

        match err {
            Error::NotEligible {
                distance_meters: Some(d),
                ..
            } => assert!((d - 40.0).abs() < 0.5, "got {d}"),
            other => panic!("expected NotEligible with a distance, got {other:?}"),
        }
        assert_eq!(session.service().calls(), 0);
        assert_eq!(session.active_view().unwrap().progress, started.progress);
    }

    #[tokio::test]
    async fn missing_hunt_or_position_is_not_eligible() {
        let session = session();
        assert!(matches!(
            session.attempt_check_in().await,
            Err(Error::NotEligible { .. })
        ));

        session.start_hunt("harbor").await.unwrap();
        assert!(matches!(
            session.attempt_check_in().await,
            Err(Error::NotEligible {
                distance_meters: None,
                ..
            })
        ));
        assert_eq!(session.service().calls(), 0);
    }

    #[tokio::test]
    async fn completed_hunt_accepts_no_more_check_ins() {
        let session = session();
        session.start_hunt("harbor").await.unwrap();
        session.update_position(stop(0));
        session.attempt_check_in().await.unwrap();
        session.update_position(stop(1));
        session.attempt_check_in().await.unwrap();

        let err = session.attempt_check_in().await.unwrap_err();
        assert!(matches!(err, Error::NotEligible { .. }));
        assert_eq!(session.service().calls(), 2);
    }

    #[tokio::test]
    async fn replayed_snapshot_is_not_counted_twice() {
        let session = session();
        let started = session.start_hunt("harbor").await.unwrap();
        let snapshot = started
            .progress
            .mark_visited("w0", 100)
            .unwrap()
            .advance(2)
            .unwrap();
        let response = CheckInResponse {
            success: true,
            message: "Checked in".into(),
            progress: Some(snapshot.clone()),
            points_earned: 100,
        };
        session.service().answer(Ok(response.clone()));
        session.service().answer(Ok(response));

        session.update_position(stop(0));
        session.attempt_check_in().await.unwrap();
        session.update_position(stop(1));
        session.attempt_check_in().await.unwrap();

        let progress = session.active_view().unwrap().progress;
        assert_eq!(progress, snapshot);
        assert_eq!(progress.earned_points, 100);
    }

    #[tokio::test]
    async fn response_without_snapshot_is_applied_locally() {
        let session = session();
        session.start_hunt("harbor").await.unwrap();
        session.service().answer(Ok(CheckInResponse {
            success: true,
            message: "ok".into(),
            progress: None,
            points_earned: 0,
        }));

        session.update_position(stop(0));
        let report = session.attempt_check_in().await.unwrap();

        // Reported points follow what was applied, not the response's claim.
        assert_eq!(report.points_earned, 100);
        assert_eq!(report.progress.current_index, 1);
        assert_eq!(report.progress.earned_points, 100);
        assert_eq!(session.active_view().unwrap().progress, report.progress);
    }

    #[tokio::test]
    async fn failure_leaves_progress_and_frees_the_slot() {
        let session = session();
        let started = session.start_hunt("harbor").await.unwrap();
        session
            .service()
            .answer(Err(Error::RemoteTransient("timeout".into())));

        session.update_position(stop(0));
        let err = session.attempt_check_in().await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(session.active_view().unwrap().progress, started.progress);

        // The retry goes through to the real service.
        let report = session.attempt_check_in().await.unwrap();
        assert_eq!(report.progress.earned_points, 100);
    }

    #[tokio::test]
    async fn lost_final_reply_is_recovered_by_retry() {
        let session = session();
        session.start_hunt("harbor").await.unwrap();
        session.update_position(stop(0));
        session.attempt_check_in().await.unwrap();

        session.update_position(stop(1));
        session.service().lose_next_reply();
        let err = session.attempt_check_in().await.unwrap_err();
        assert!(err.is_retryable());
        let stale = session.active_view().unwrap().progress;
        assert_eq!(stale.current_index, 1);
        assert!(!stale.completed);

        let report = session.attempt_check_in().await.unwrap();
        assert!(report.completed());
        assert_eq!(report.points_earned, 100);
        assert_eq!(report.progress.earned_points, 200);
        assert_eq!(session.active_view().unwrap().progress, report.progress);
        assert_eq!(session.service().calls(), 3);
    }

    #[tokio::test]
    async fn unsuccessful_response_is_not_eligible() {
        let session = session();
        let started = session.start_hunt("harbor").await.unwrap();
        session.service().answer(Ok(CheckInResponse {
            success: false,
            message: "Too far from Waypoint w0".into(),
            progress: None,
            points_earned: 0,
        }));

        session.update_position(stop(0));
        let err = session.attempt_check_in().await.unwrap_err();

        assert!(matches!(err, Error::NotEligible { ref reason, .. } if reason.contains("Too far")));
        assert_eq!(session.active_view().unwrap().progress, started.progress);
    }

    #[tokio::test]
    async fn concurrent_attempts_reach_the_service_once() {
        let gate = Arc::new(Notify::new());
        let service = service_on(Storage::open_in_memory().unwrap()).gated(Arc::clone(&gate));
        let session = session_with(service);
        session.start_hunt("harbor").await.unwrap();
        session.update_position(stop(0));

        let first = session.attempt_check_in();
        let second = async {
            let result = session.attempt_check_in().await;
            gate.notify_one();
            result
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.unwrap().progress.earned_points, 100);
        assert!(matches!(second, Err(Error::AttemptInProgress)));
        assert_eq!(session.service().calls(), 1);
    }

    #[tokio::test]
    async fn result_after_local_end_is_discarded() {
        let gate = Arc::new(Notify::new());
        let service = service_on(Storage::open_in_memory().unwrap()).gated(Arc::clone(&gate));
        let session = session_with(service);
        let started = session.start_hunt("harbor").await.unwrap();
        session.service().answer(Ok(CheckInResponse {
            success: true,
            message: "Checked in".into(),
            progress: Some(started.progress.mark_visited("w0", 100).unwrap().advance(2).unwrap()),
            points_earned: 100,
        }));
        session.update_position(stop(0));

        let attempt = session.attempt_check_in();
        let end = async {
            session.end_hunt();
            gate.notify_one();
        };
        let (result, ()) = tokio::join!(attempt, end);

        assert!(matches!(result, Err(Error::Discarded(_))));
        assert!(session.active_view().is_none());
        assert_eq!(session.history(), vec![started.progress]);
    }

    #[tokio::test]
    async fn snapshot_for_another_attempt_is_discarded() {
        let session = session();
        let started = session.start_hunt("harbor").await.unwrap();
        let mut foreign = started.progress.mark_visited("w0", 100).unwrap();
        foreign.id = uuid::Uuid::new_v4();
        session.service().answer(Ok(CheckInResponse {
            success: true,
            message: "Checked in".into(),
            progress: Some(foreign),
            points_earned: 100,
        }));

        session.update_position(stop(0));
        let err = session.attempt_check_in().await.unwrap_err();

        assert!(matches!(err, Error::Discarded(_)));
        assert_eq!(session.active_view().unwrap().progress, started.progress);
    }
}
