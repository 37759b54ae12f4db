//! Location stream supervision: platform callbacks in, throttled samples out.
//!
//! A [`LocationSource`] pushes samples into a channel from whatever callback
//! mechanism the platform has. [`LocationStream`] owns the registration for
//! as long as it lives and hands samples out one at a time with
//! [`LocationStream::next`], dropping those that add nothing:
//!
//! - samples older than the last accepted one,
//! - exact repeats of the last accepted position,
//! - samples that arrive sooner than the minimum interval or closer than
//!   the minimum distance to the last accepted one.
//!
//! Dropping or cancelling the stream removes the registration at once. A
//! callback racing with cancellation sends into a closed channel and is lost.

mod replay;

use jiff::{SignedDuration, Timestamp};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

pub use replay::{ReplaySource, TrackError, TrackPoint};

use crate::error::{Error, Result};
use crate::geo::{GeoPoint, distance_meters};

/// Default minimum time between accepted samples, in milliseconds.
pub const DEFAULT_SAMPLE_INTERVAL_MS: i64 = 5_000;

/// Default minimum time between accepted samples.
pub const DEFAULT_MIN_INTERVAL: SignedDuration =
    SignedDuration::from_millis(DEFAULT_SAMPLE_INTERVAL_MS);

/// Default minimum movement between accepted samples, in meters.
pub const DEFAULT_MIN_DISTANCE_M: f32 = 5.0;

/// A position fix and when the device recorded it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LocationSample {
    pub point: GeoPoint,
    pub recorded_at: Timestamp,
}

/// What a platform callback can deliver.
#[derive(Debug, Clone)]
pub enum SourceEvent {
    Sample(LocationSample),

    /// The user revoked location access while the stream was running.
    PermissionRevoked,

    /// The platform gave up delivering fixes.
    Failed(String),
}

/// Where platform callbacks send their events.
pub type SampleSink = mpsc::UnboundedSender<SourceEvent>;

/// Handle for one registration with a [`LocationSource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(pub u64);

/// A platform's location service.
///
/// The engine never touches platform permission APIs directly; it only asks
/// [`LocationSource::has_permission`] before registering.
pub trait LocationSource {
    fn has_permission(&self) -> bool;

    /// Start delivering events into `sink` until the registration is removed.
    fn request_updates(&self, sink: SampleSink) -> Result<SubscriptionId>;

    /// Stop delivering events for `id`. Removing an unknown id does nothing.
    fn remove_updates(&self, id: SubscriptionId);
}

/// Throttling thresholds for a [`LocationStream`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StreamSettings {
    pub min_interval: SignedDuration,
    pub min_distance_m: f32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            min_interval: DEFAULT_MIN_INTERVAL,
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
        }
    }
}

/// A cancelable, throttled stream of location samples.
pub struct LocationStream<'a, L: LocationSource> {
    source: &'a L,
    subscription: Option<SubscriptionId>,
    events: mpsc::UnboundedReceiver<SourceEvent>,
    throttle: Throttle,
}

impl<'a, L: LocationSource> LocationStream<'a, L> {
    /// Register with `source`. Fails with [`Error::PermissionDenied`] when the
    /// source has no permission; that failure is terminal.
    pub fn subscribe(source: &'a L, settings: StreamSettings) -> Result<Self> {
        if !source.has_permission() {
            return Err(Error::PermissionDenied);
        }

        let (sink, events) = mpsc::unbounded_channel();
        let id = source.request_updates(sink)?;
        debug!(subscription = id.0, "location updates requested");

        Ok(Self {
            source,
            subscription: Some(id),
            events,
            throttle: Throttle::new(settings),
        })
    }

    /// Wait for the next sample worth acting on.
    ///
    /// Returns `None` once the stream is cancelled or the source stops. A
    /// failure is returned once and ends the stream.
    pub async fn next(&mut self) -> Option<Result<LocationSample>> {
        while self.subscription.is_some() {
            let Some(event) = self.events.recv().await else {
                self.release();
                return None;
            };

            match event {
                SourceEvent::Sample(sample) => {
                    if self.throttle.accept(&sample) {
                        return Some(Ok(sample));
                    }
                    debug!(at = %sample.recorded_at, "location sample suppressed");
                }
                SourceEvent::PermissionRevoked => {
                    self.release();
                    return Some(Err(Error::PermissionDenied));
                }
                SourceEvent::Failed(reason) => {
                    self.release();
                    return Some(Err(Error::LocationUnavailable(reason)));
                }
            }
        }
        None
    }

    /// Release the platform registration now. Idempotent.
    pub fn cancel(&mut self) {
        self.release();
    }

    pub fn is_active(&self) -> bool {
        self.subscription.is_some()
    }

    /// The most recent accepted sample.
    pub fn last_sample(&self) -> Option<&LocationSample> {
        self.throttle.last.as_ref()
    }

    fn release(&mut self) {
        if let Some(id) = self.subscription.take() {
            self.source.remove_updates(id);
            self.events.close();
            debug!(subscription = id.0, "location updates removed");
        }
    }
}

impl<L: LocationSource> Drop for LocationStream<'_, L> {
    fn drop(&mut self) {
        self.release();
    }
}

/// Decides which samples are worth passing on.
#[derive(Debug)]
struct Throttle {
    settings: StreamSettings,
    last: Option<LocationSample>,
}

impl Throttle {
    fn new(settings: StreamSettings) -> Self {
        Self {
            settings,
            last: None,
        }
    }

    fn accept(&mut self, sample: &LocationSample) -> bool {
        let worth_it = match &self.last {
            None => true,
            Some(last) => {
                let elapsed = sample.recorded_at.duration_since(last.recorded_at);
                !elapsed.is_negative()
                    && sample.point != last.point
                    && elapsed >= self.settings.min_interval
                    && distance_meters(&last.point, &sample.point) >= self.settings.min_distance_m
            }
        };

        if worth_it {
            self.last = Some(*sample);
        }
        worth_it
    }
}
