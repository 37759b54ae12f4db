//! Replay a recorded track as if it were a live location service.

use std::{
    collections::HashMap,
    fs, io,
    path::{Path, PathBuf},
    sync::{
        Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::error::Result;
use crate::geo::GeoPoint;

use super::{LocationSample, LocationSource, SampleSink, SourceEvent, SubscriptionId};

/// Errors that can occur while loading a track.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("track has no points")]
    Empty,

    #[error("replay speed must be a positive number (got {0})")]
    InvalidSpeed(f64),
}

/// One recorded fix, relative to the start of the track.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackPoint {
    #[serde(flatten)]
    pub point: GeoPoint,

    /// Milliseconds since the first fix.
    #[serde(default)]
    pub offset_ms: u32,
}

/// A location source that plays back a track, optionally sped up.
///
/// Each registration replays the whole track on its own task. Removing the
/// registration aborts that task.
pub struct ReplaySource {
    track: Vec<TrackPoint>,
    speed: f64,
    started_at: Timestamp,
    next_id: AtomicU64,
    replays: Mutex<HashMap<SubscriptionId, JoinHandle<()>>>,
}

impl ReplaySource {
    pub fn new(mut track: Vec<TrackPoint>, speed: f64) -> core::result::Result<Self, TrackError> {
        if track.is_empty() {
            return Err(TrackError::Empty);
        }
        if !speed.is_finite() || speed <= 0.0 {
            return Err(TrackError::InvalidSpeed(speed));
        }
        track.sort_by_key(|p| p.offset_ms);

        Ok(Self {
            track,
            speed,
            started_at: Timestamp::now(),
            next_id: AtomicU64::new(1),
            replays: Mutex::new(HashMap::new()),
        })
    }

    /// Loads a JSON array of track points.
    pub fn from_file(path: &Path, speed: f64) -> core::result::Result<Self, TrackError> {
        let json = fs::read_to_string(path).map_err(|source| TrackError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let track = serde_json::from_str(&json).map_err(|source| TrackError::Json {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(track, speed)
    }

    /// Number of replays still registered.
    #[cfg(test)]
    fn live(&self) -> usize {
        self.replays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl LocationSource for ReplaySource {
    fn has_permission(&self) -> bool {
        true
    }

    fn request_updates(&self, sink: SampleSink) -> Result<SubscriptionId> {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let track = self.track.clone();
        let speed = self.speed;
        let started_at = self.started_at;

        let handle = tokio::spawn(async move {
            let mut previous = 0;
            for fix in track {
                let wait = Duration::from_millis(u64::from(fix.offset_ms - previous));
                tokio::time::sleep(wait.div_f64(speed)).await;
                previous = fix.offset_ms;

                let recorded_at = started_at
                    .checked_add(SignedDuration::from_millis(i64::from(fix.offset_ms)))
                    .unwrap_or(started_at);
                let event = SourceEvent::Sample(LocationSample {
                    point: fix.point,
                    recorded_at,
                });
                if sink.send(event).is_err() {
                    break;
                }
            }
            debug!(subscription = id.0, "replay finished");
        });

        self.replays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, handle);
        Ok(id)
    }

    fn remove_updates(&self, id: SubscriptionId) {
        let handle = self
            .replays
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::location::{LocationStream, StreamSettings};

    fn fix(latitude: f64, offset_ms: u32) -> TrackPoint {
        TrackPoint {
            point: GeoPoint::new(latitude, 8.5),
            offset_ms,
        }
    }

    #[test]
    fn rejects_empty_track_and_bad_speed() {
        assert!(matches!(ReplaySource::new(vec![], 1.0), Err(TrackError::Empty)));
        assert!(matches!(
            ReplaySource::new(vec![fix(47.0, 0)], 0.0),
            Err(TrackError::InvalidSpeed(_))
        ));
        assert!(matches!(
            ReplaySource::new(vec![fix(47.0, 0)], f64::NAN),
            Err(TrackError::InvalidSpeed(_))
        ));
    }

    #[test]
    fn loads_track_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("walk.json");
        fs::write(
            &path,
            r#"[{"latitude": 47.0, "longitude": 8.5, "offsetMs": 6000},
                {"latitude": 46.9, "longitude": 8.5}]"#,
        )
        .unwrap();

        let source = ReplaySource::from_file(&path, 10.0).unwrap();
        assert_eq!(source.track[0].offset_ms, 0);
        assert_eq!(source.track[1].point.latitude, 47.0);
    }

    #[tokio::test]
    async fn replays_track_with_recorded_times() {
        let source =
            ReplaySource::new(vec![fix(47.0, 0), fix(47.001, 6_000)], 1_000.0).unwrap();
        let mut stream = LocationStream::subscribe(&source, StreamSettings::default()).unwrap();

        let first = stream.next().await.unwrap().unwrap();
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(
            second.recorded_at.duration_since(first.recorded_at),
            SignedDuration::from_secs(6)
        );

        // The replay task ends and drops its sink, which ends the stream.
        assert!(stream.next().await.is_none());
        assert_eq!(source.live(), 0);
    }

    #[tokio::test]
    async fn dropping_stream_aborts_replay() {
        let source = ReplaySource::new(vec![fix(47.0, 0), fix(47.1, 60_000)], 1.0).unwrap();
        {
            let mut stream =
                LocationStream::subscribe(&source, StreamSettings::default()).unwrap();
            stream.next().await.unwrap().unwrap();
            assert_eq!(source.live(), 1);
        }
        assert_eq!(source.live(), 0);
    }
}
