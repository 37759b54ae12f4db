//! Play commands: start, status, check-in, walk, abandon, history.
//!
//! Every command except `start` and `history` resumes the player's active
//! attempt from storage first.

use std::path::Path;

use crate::error::Error;
use crate::geo::GeoPoint;
use crate::location::{LocationStream, ReplaySource, StreamSettings};
use crate::model::CheckInReport;
use crate::proximity::Proximity;
use crate::session::ActiveHuntView;

use super::LocalSession;
use super::format::{format_distance, format_elapsed, format_progress, format_proximity, short_id};

pub(super) async fn cmd_start(session: &LocalSession, hunt_id: &str) -> Result<(), String> {
    let view = session
        .start_hunt(hunt_id)
        .await
        .map_err(|e| format!("failed to start hunt: {e}"))?;

    println!(
        "Started {} ({})",
        view.hunt.name,
        short_id(view.progress.id)
    );
    print_target(&view);
    Ok(())
}

pub(super) async fn cmd_status(session: &LocalSession, hint: bool) -> Result<(), String> {
    let Some(view) = resume(session).await? else {
        println!("No active hunt");
        return Ok(());
    };

    println!("{} ({})", view.hunt.name, short_id(view.progress.id));
    println!("{}", format_progress(&view.hunt, &view.progress));
    println!("Elapsed: {}", format_elapsed(view.progress.elapsed()));
    print_target(&view);

    if hint {
        match view.current_hint() {
            Some(h) => println!("Hint: {h}"),
            None => println!("No hint for this waypoint"),
        }
    }
    Ok(())
}

pub(super) async fn cmd_check_in(session: &LocalSession, lat: f64, lon: f64) -> Result<(), String> {
    require_active(session).await?;
    session.update_position(GeoPoint::new(lat, lon));

    match session.attempt_check_in().await {
        Ok(report) => {
            announce(session, &report);
            Ok(())
        }
        Err(Error::NotEligible {
            reason,
            distance_meters,
        }) => Err(match distance_meters {
            Some(d) => format!("cannot check in: {reason} ({} away)", format_distance(d)),
            None => format!("cannot check in: {reason}"),
        }),
        Err(e) if e.is_retryable() => Err(format!("check-in failed: {e} (try again)")),
        Err(e) => Err(format!("check-in failed: {e}")),
    }
}

pub(super) async fn cmd_walk(
    session: &LocalSession,
    track: &Path,
    speed: f64,
    settings: StreamSettings,
) -> Result<(), String> {
    let view = require_active(session).await?;
    let source = ReplaySource::from_file(track, speed).map_err(|e| e.to_string())?;
    let mut stream = LocationStream::subscribe(&source, settings)
        .map_err(|e| format!("failed to start location updates: {e}"))?;

    println!("Walking {} ({})", view.hunt.name, track.display());

    while let Some(sample) = stream.next().await {
        let sample = sample.map_err(|e| format!("location updates stopped: {e}"))?;
        let proximity = step_to(session, sample.point)?;

        if let Some(view) = session.active_view()
            && let Some(target) = view.current_waypoint()
        {
            println!("  → {}: {}", target.name, format_proximity(&proximity));
        }
        if !proximity.eligible {
            continue;
        }

        match session.attempt_check_in().await {
            Ok(report) => {
                let done = report.completed();
                announce(session, &report);
                if done {
                    stream.cancel();
                    return Ok(());
                }
            }
            // Refused at this spot; keep walking.
            Err(e @ Error::NotEligible { .. }) => eprintln!("{e}"),
            Err(e) => return Err(format!("check-in failed: {e}")),
        }
    }

    println!("Track ended before the hunt was complete");
    Ok(())
}

pub(super) async fn cmd_abandon(session: &LocalSession) -> Result<(), String> {
    let view = require_active(session).await?;
    let progress = session
        .abandon_hunt()
        .await
        .map_err(|e| format!("failed to abandon hunt: {e}"))?;

    println!(
        "Abandoned {} with {} pts after {}",
        view.hunt.name,
        progress.earned_points,
        format_elapsed(progress.elapsed())
    );
    Ok(())
}

pub(super) fn cmd_history(session: &LocalSession) -> Result<(), String> {
    let records = session
        .service()
        .storage()
        .history(session.player_id())
        .map_err(|e| format!("failed to load history: {e}"))?;

    if records.is_empty() {
        println!("No hunts played yet");
        return Ok(());
    }

    for record in &records {
        let p = &record.progress;
        println!(
            "{}  [{}]  {}  {} pts  started {}",
            short_id(p.id),
            record.status.as_str(),
            p.hunt_id,
            p.earned_points,
            p.started_at.strftime("%Y-%m-%d %H:%M")
        );
    }
    Ok(())
}

async fn resume(session: &LocalSession) -> Result<Option<ActiveHuntView>, String> {
    session
        .resume()
        .await
        .map_err(|e| format!("failed to resume hunt: {e}"))
}

async fn require_active(session: &LocalSession) -> Result<ActiveHuntView, String> {
    resume(session)
        .await?
        .ok_or_else(|| "no active hunt: start one with `trailhead start <hunt-id>`".to_string())
}

/// Move the player to `point`. Fails once the active hunt is gone.
fn step_to(session: &LocalSession, point: GeoPoint) -> Result<Proximity, String> {
    session
        .update_position(point)
        .ok_or_else(|| "no active hunt".to_string())
}

/// Print the outcome of a check-in. A completed hunt is closed locally.
fn announce(session: &LocalSession, report: &CheckInReport) {
    println!("{}  +{} pts", report.message, report.points_earned);

    if report.completed() {
        println!(
            "Hunt complete: {} pts in {}",
            report.progress.earned_points,
            format_elapsed(report.progress.elapsed())
        );
        session.end_hunt();
    } else if let Some(view) = session.active_view() {
        print_target(&view);
    }
}

fn print_target(view: &ActiveHuntView) {
    let Some(target) = view.current_waypoint() else {
        return;
    };
    println!("Next: {}", target.name);
    if let Some(clue) = view.current_clue() {
        println!("Clue: {clue}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::proximity::ProximityEvaluator;
    use crate::service::LocalService;
    use crate::session::Session;
    use crate::session::tests::{catalog, stop};
    use crate::storage::Storage;

    fn local_session() -> LocalSession {
        let storage = Storage::open_in_memory().unwrap();
        let service = LocalService::new("ana", catalog(), storage, 30.0);
        Session::new("ana", catalog(), service, ProximityEvaluator::default())
    }

    #[tokio::test]
    async fn step_without_hunt_reports_no_active_hunt() {
        let session = local_session();
        assert_eq!(step_to(&session, stop(0)).unwrap_err(), "no active hunt");

        session.start_hunt("harbor").await.unwrap();
        let proximity = step_to(&session, stop(0)).unwrap();
        assert!(proximity.eligible);

        session.end_hunt();
        assert_eq!(step_to(&session, stop(1)).unwrap_err(), "no active hunt");
    }
}
