//! Storage-backed check-in authority for offline play.
//!
//! Plays the server's role: it re-measures the submitted position, applies
//! the progress transitions itself, and persists the result before answering.

use tracing::{debug, info};

use crate::catalog::{Catalog, LocalCatalog};
use crate::error::Result;
use crate::geo::distance_meters;
use crate::model::{CheckInAttempt, CheckInResponse, Progress, ProgressStatus};
use crate::storage::Storage;

use super::{HuntService, classify_status};

/// A [`HuntService`] that keeps progress in local storage.
pub struct LocalService {
    player_id: String,
    catalog: LocalCatalog,
    storage: Storage,
    radius_m: f32,
}

impl LocalService {
    pub fn new(
        player_id: impl Into<String>,
        catalog: LocalCatalog,
        storage: Storage,
        radius_m: f32,
    ) -> Self {
        Self {
            player_id: player_id.into(),
            catalog,
            storage,
            radius_m,
        }
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    fn require_active(&self, hunt_id: &str) -> Result<Progress> {
        self.storage
            .active_progress(&self.player_id, Some(hunt_id))?
            .ok_or_else(|| classify_status(404, format!("no active progress for hunt {hunt_id}")))
    }

    /// The latest record for a hunt that was not abandoned. A completed
    /// record still answers retries of its final check-in.
    fn require_current(&self, hunt_id: &str) -> Result<Progress> {
        match self.storage.latest_progress(&self.player_id, hunt_id)? {
            Some(record) if record.status != ProgressStatus::Abandoned => Ok(record.progress),
            _ => Err(classify_status(
                404,
                format!("no active progress for hunt {hunt_id}"),
            )),
        }
    }
}

impl HuntService for LocalService {
    async fn start_hunt(&self, progress: Progress) -> Result<Progress> {
        if progress.player_id != self.player_id {
            return Err(classify_status(
                403,
                format!("cannot start a hunt for player {}", progress.player_id),
            ));
        }
        self.storage.begin_attempt(&progress)?;
        info!(hunt = %progress.hunt_id, progress = %progress.id, "hunt started");
        Ok(progress)
    }

    async fn submit_check_in(&self, attempt: &CheckInAttempt) -> Result<CheckInResponse> {
        let progress = self.require_current(&attempt.hunt_id)?;

        if progress.has_visited(&attempt.waypoint_id) {
            debug!(waypoint = %attempt.waypoint_id, "duplicate check-in");
            return Ok(CheckInResponse {
                success: true,
                message: "Already checked in here".into(),
                progress: Some(progress),
                points_earned: 0,
            });
        }
        if progress.completed {
            return Err(classify_status(409, "hunt already completed"));
        }

        let hunt = self.catalog.get_hunt(&attempt.hunt_id).await?;

        let Some(target) = hunt.waypoint(progress.current_index) else {
            return Err(classify_status(409, "no current waypoint"));
        };
        if target.id != attempt.waypoint_id {
            return Err(classify_status(
                409,
                format!(
                    "waypoint {} is not the current target ({})",
                    attempt.waypoint_id, target.id
                ),
            ));
        }

        let distance = distance_meters(&attempt.observed_position, &target.position);
        if distance > self.radius_m {
            return Ok(CheckInResponse {
                success: false,
                message: format!("Too far from {} ({distance:.0} m away)", target.name),
                progress: None,
                points_earned: 0,
            });
        }

        let next = progress
            .mark_visited(&target.id, i64::from(target.point_value))?
            .advance(hunt.waypoints.len())?;
        let status = if next.completed {
            ProgressStatus::Completed
        } else {
            ProgressStatus::Active
        };
        self.storage.update_progress(&next, status)?;

        let points_earned = next.earned_points - progress.earned_points;
        info!(
            hunt = %hunt.id,
            waypoint = %target.id,
            points = points_earned,
            completed = next.completed,
            "check-in accepted"
        );

        Ok(CheckInResponse {
            success: true,
            message: format!("Checked in at {}", target.name),
            progress: Some(next),
            points_earned,
        })
    }

    async fn abandon_hunt(&self, hunt_id: &str) -> Result<()> {
        let progress = self.require_active(hunt_id)?;
        self.storage
            .set_status(progress.id, ProgressStatus::Abandoned)?;
        info!(hunt = %hunt_id, progress = %progress.id, "hunt abandoned");
        Ok(())
    }

    async fn active_progress(&self) -> Result<Option<Progress>> {
        Ok(self.storage.active_progress(&self.player_id, None)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::error::Error;
    use crate::geo::{GeoPoint, tests::north_of};
    use crate::progress::tests::two_stop_hunt;

    fn service() -> LocalService {
        let catalog = LocalCatalog::from_hunts([two_stop_hunt()]).unwrap();
        LocalService::new("ana", catalog, Storage::open_in_memory().unwrap(), 30.0)
    }

    fn attempt(waypoint_id: &str, position: GeoPoint) -> CheckInAttempt {
        CheckInAttempt {
            hunt_id: "harbor".into(),
            waypoint_id: waypoint_id.into(),
            observed_position: position,
            distance_meters: 0.0,
        }
    }

    async fn started(service: &LocalService) -> Progress {
        let progress = Progress::start(&two_stop_hunt(), "ana").unwrap();
        service.start_hunt(progress).await.unwrap()
    }

    #[tokio::test]
    async fn accepts_check_in_at_target() {
        let service = service();
        started(&service).await;
        let hunt = two_stop_hunt();

        let response = service
            .submit_check_in(&attempt("w0", hunt.waypoints[0].position))
            .await
            .unwrap();

        assert!(response.success);
        assert_eq!(response.points_earned, 100);
        let progress = response.progress.unwrap();
        assert_eq!(progress.current_index, 1);
        assert!(progress.has_visited("w0"));

        let stored = service.active_progress().await.unwrap().unwrap();
        assert_eq!(stored, progress);
    }

    #[tokio::test]
    async fn completion_archives_the_record() {
        let service = service();
        let start = started(&service).await;
        let hunt = two_stop_hunt();

        service
            .submit_check_in(&attempt("w0", hunt.waypoints[0].position))
            .await
            .unwrap();
        let response = service
            .submit_check_in(&attempt("w1", hunt.waypoints[1].position))
            .await
            .unwrap();

        let progress = response.progress.unwrap();
        assert!(progress.completed);
        assert_eq!(progress.earned_points, 200);
        assert!(service.active_progress().await.unwrap().is_none());
        assert_eq!(
            service.storage().load_progress(start.id).unwrap().status,
            ProgressStatus::Completed
        );
    }

    #[tokio::test]
    async fn duplicate_check_in_awards_nothing() {
        let service = service();
        started(&service).await;
        let at_w0 = attempt("w0", two_stop_hunt().waypoints[0].position);

        let first = service.submit_check_in(&at_w0).await.unwrap();
        let second = service.submit_check_in(&at_w0).await.unwrap();

        assert!(second.success);
        assert_eq!(second.points_earned, 0);
        assert_eq!(second.progress, first.progress);
    }

    #[tokio::test]
    async fn retried_final_check_in_returns_completed_snapshot() {
        let service = service();
        started(&service).await;
        let hunt = two_stop_hunt();
        let at_w1 = attempt("w1", hunt.waypoints[1].position);

        service
            .submit_check_in(&attempt("w0", hunt.waypoints[0].position))
            .await
            .unwrap();
        let last = service.submit_check_in(&at_w1).await.unwrap();
        let retry = service.submit_check_in(&at_w1).await.unwrap();

        assert!(retry.success);
        assert_eq!(retry.points_earned, 0);
        assert_eq!(retry.progress, last.progress);
        assert!(retry.progress.unwrap().completed);
    }

    #[tokio::test]
    async fn completed_hunt_check_in_is_a_conflict() {
        let service = service();
        let start = started(&service).await;
        let done = start
            .mark_visited("w0", 100)
            .unwrap()
            .mark_visited("w1", 100)
            .unwrap()
            .advance(2)
            .unwrap();
        service
            .storage()
            .update_progress(&done, ProgressStatus::Completed)
            .unwrap();

        // Every stop of the finished attempt is visited; only an unknown id is left.
        let err = service
            .submit_check_in(&attempt("w2", two_stop_hunt().waypoints[0].position))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteClient { status: 409, .. }));
    }

    #[tokio::test]
    async fn check_in_after_abandon_is_not_found() {
        let service = service();
        started(&service).await;
        service.abandon_hunt("harbor").await.unwrap();

        let err = service
            .submit_check_in(&attempt("w0", two_stop_hunt().waypoints[0].position))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteClient { status: 404, .. }));
    }

    #[tokio::test]
    async fn far_position_is_refused_without_change() {
        let service = service();
        let start = started(&service).await;
        let far = north_of(&two_stop_hunt().waypoints[0].position, 45.0);

        let response = service.submit_check_in(&attempt("w0", far)).await.unwrap();

        assert!(!response.success);
        assert!(response.message.contains("Too far"));
        assert_eq!(service.active_progress().await.unwrap().unwrap(), start);
    }

    #[tokio::test]
    async fn wrong_target_is_a_conflict() {
        let service = service();
        started(&service).await;

        let err = service
            .submit_check_in(&attempt("w1", two_stop_hunt().waypoints[1].position))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteClient { status: 409, .. }));
    }

    #[tokio::test]
    async fn check_in_without_attempt_is_not_found() {
        let service = service();
        let err = service
            .submit_check_in(&attempt("w0", two_stop_hunt().waypoints[0].position))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RemoteClient { status: 404, .. }));
    }

    #[tokio::test]
    async fn abandon_keeps_history() {
        let service = service();
        let start = started(&service).await;

        service.abandon_hunt("harbor").await.unwrap();

        assert!(service.active_progress().await.unwrap().is_none());
        let history = service.storage().history("ana").unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].progress.id, start.id);
        assert_eq!(history[0].status, ProgressStatus::Abandoned);

        let err = service.abandon_hunt("harbor").await.unwrap_err();
        assert!(matches!(err, Error::RemoteClient { status: 404, .. }));
    }

    #[tokio::test]
    async fn refuses_to_start_for_another_player() {
        let service = service();
        let progress = Progress::start(&two_stop_hunt(), "ben").unwrap();
        let err = service.start_hunt(progress).await.unwrap_err();
        assert!(matches!(err, Error::RemoteClient { status: 403, .. }));
    }
}
