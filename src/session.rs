//! The player's session: one owned handle over the active hunt.
//!
//! A [`Session`] holds the single piece of mutable state in the engine, the
//! active hunt view, and publishes it through a `watch` channel so readers
//! always see the current value and can wait for changes. Progress inside
//! the view only changes through the session's own operations.
//!
//! ```text
//! start_hunt / resume ──► view ◄── update_position (last sample wins)
//!                          │
//!                          ├──► attempt_check_in (see `check_in`)
//!                          └──► abandon_hunt / end_hunt ──► history
//! ```

mod check_in;

use std::sync::{Arc, Mutex, PoisonError, atomic::AtomicBool};

use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::catalog::{CachedCatalog, Catalog, HuntFilter};
use crate::error::{Error, Result};
use crate::geo::GeoPoint;
use crate::location::{LocationSource, LocationStream};
use crate::model::{Hunt, Progress, Waypoint};
use crate::proximity::{Proximity, ProximityEvaluator};
use crate::service::HuntService;

/// Everything a screen needs about the active hunt.
#[derive(Debug, Clone, PartialEq)]
pub struct ActiveHuntView {
    pub hunt: Arc<Hunt>,
    pub progress: Progress,

    /// Latest known device position, if any sample has arrived.
    pub position: Option<GeoPoint>,

    /// Evaluation of `position` against the current waypoint.
    pub proximity: Proximity,
}

impl ActiveHuntView {
    /// The waypoint the player is heading for.
    pub fn current_waypoint(&self) -> Option<&Waypoint> {
        self.hunt.waypoint(self.progress.current_index)
    }

    /// Clue text for the current waypoint.
    pub fn current_clue(&self) -> Option<&str> {
        let waypoint = self.current_waypoint()?;
        self.hunt.clue_for(&waypoint.id).map(|c| c.text.as_str())
    }

    /// Hint for the current waypoint. Empty hints count as none.
    pub fn current_hint(&self) -> Option<&str> {
        self.current_waypoint()
            .map(|w| w.hint.as_str())
            .filter(|h| !h.is_empty())
    }
}

/// An explicit session for one player.
pub struct Session<C, S> {
    player_id: String,
    catalog: CachedCatalog<C>,
    service: S,
    evaluator: ProximityEvaluator,
    state: watch::Sender<Option<ActiveHuntView>>,
    position: Mutex<Option<GeoPoint>>,
    in_flight: AtomicBool,
    archive: Mutex<Vec<Progress>>,
}

impl<C, S> Session<C, S>
where
    C: Catalog + Sync,
    S: HuntService + Sync,
{
    pub fn new(
        player_id: impl Into<String>,
        catalog: C,
        service: S,
        evaluator: ProximityEvaluator,
    ) -> Self {
        Self {
            player_id: player_id.into(),
            catalog: CachedCatalog::new(catalog),
            service,
            evaluator,
            state: watch::Sender::new(None),
            position: Mutex::new(None),
            in_flight: AtomicBool::new(false),
            archive: Mutex::new(Vec::new()),
        }
    }

    pub fn player_id(&self) -> &str {
        &self.player_id
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    // ── Catalog ──

    /// Hunts open for play that match `filter`.
    pub async fn list_hunts(&self, filter: &HuntFilter) -> Result<Vec<Arc<Hunt>>> {
        let hunts = self.catalog.list_hunts(filter).await?;
        Ok(hunts.into_iter().filter(|h| h.active).collect())
    }

    // ── Lifecycle ──

    /// Start a new attempt at a hunt and make it the active one.
    ///
    /// An attempt already active in this session is ended locally and
    /// archived; the service decides what happens to it remotely.
    pub async fn start_hunt(&self, hunt_id: &str) -> Result<ActiveHuntView> {
        let hunt = self.catalog.get_hunt(hunt_id).await?;
        if !hunt.active {
            return Err(Error::InvalidHunt {
                hunt_id: hunt.id.clone(),
                reason: "hunt is not open for play".into(),
            });
        }

        let progress = Progress::start(&hunt, &self.player_id)?;
        let progress = self.service.start_hunt(progress).await?;
        info!(hunt = %hunt.id, progress = %progress.id, "hunt started");

        Ok(self.activate(hunt, progress))
    }

    /// Restore the player's unfinished attempt from the service, if any.
    pub async fn resume(&self) -> Result<Option<ActiveHuntView>> {
        let Some(progress) = self.service.active_progress().await? else {
            debug!(player = %self.player_id, "nothing to resume");
            return Ok(None);
        };

        let hunt = self.catalog.get_hunt(&progress.hunt_id).await?;
        if progress.current_index >= hunt.waypoints.len() {
            return Err(Error::InvalidHunt {
                hunt_id: hunt.id.clone(),
                reason: format!(
                    "stored progress points past the last waypoint ({})",
                    progress.current_index
                ),
            });
        }

        info!(hunt = %hunt.id, progress = %progress.id, "hunt resumed");
        Ok(Some(self.activate(hunt, progress)))
    }

    /// Give up on the active hunt. The service is told first; local state is
    /// cleared only once it agrees.
    pub async fn abandon_hunt(&self) -> Result<Progress> {
        let view = self.active_view().ok_or(Error::NoActiveHunt)?;
        self.service.abandon_hunt(&view.hunt.id).await?;

        self.clear_if(view.progress.id);
        info!(hunt = %view.hunt.id, progress = %view.progress.id, "hunt abandoned");
        self.archive_progress(view.progress.clone());
        Ok(view.progress)
    }

    /// Clear the active hunt locally, without telling the service.
    pub fn end_hunt(&self) -> Option<Progress> {
        let previous = self.state.send_replace(None)?;
        debug!(progress = %previous.progress.id, "hunt ended");
        self.archive_progress(previous.progress.clone());
        Some(previous.progress)
    }

    /// Attempts this session ended, oldest first.
    pub fn history(&self) -> Vec<Progress> {
        self.archive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    // ── State ──

    pub fn active_view(&self) -> Option<ActiveHuntView> {
        self.state.borrow().clone()
    }

    /// Watch the active hunt view. The receiver sees the current value first.
    pub fn subscribe(&self) -> watch::Receiver<Option<ActiveHuntView>> {
        self.state.subscribe()
    }

    /// Feed a new position sample. Replaces whatever was known before.
    ///
    /// Returns the proximity to the current waypoint when a hunt is active.
    pub fn update_position(&self, point: GeoPoint) -> Option<Proximity> {
        *self.position.lock().unwrap_or_else(PoisonError::into_inner) = Some(point);

        let mut proximity = None;
        self.state.send_if_modified(|state| {
            let Some(view) = state else {
                return false;
            };
            view.position = Some(point);
            self.refresh_proximity(view);
            proximity = Some(view.proximity);
            true
        });
        proximity
    }

    /// Drive positions from a location stream until it ends.
    pub async fn track<L: LocationSource>(&self, stream: &mut LocationStream<'_, L>) -> Result<()> {
        while let Some(sample) = stream.next().await {
            self.update_position(sample?.point);
        }
        Ok(())
    }

    // ── Internals ──

    fn activate(&self, hunt: Arc<Hunt>, progress: Progress) -> ActiveHuntView {
        let position = *self.position.lock().unwrap_or_else(PoisonError::into_inner);
        let mut view = ActiveHuntView {
            hunt,
            progress,
            position,
            proximity: Proximity::default(),
        };
        self.refresh_proximity(&mut view);

        if let Some(previous) = self.state.send_replace(Some(view.clone()))
            && previous.progress.id != view.progress.id
        {
            debug!(progress = %previous.progress.id, "replaced active hunt");
            self.archive_progress(previous.progress);
        }
        view
    }

    fn refresh_proximity(&self, view: &mut ActiveHuntView) {
        view.proximity = match view.current_waypoint() {
            Some(target) => self.evaluator.evaluate(view.position.as_ref(), target),
            None => Proximity::default(),
        };
    }

    fn clear_if(&self, progress_id: Uuid) {
        self.state.send_if_modified(|state| {
            if state.as_ref().is_some_and(|v| v.progress.id == progress_id) {
                *state = None;
                true
            } else {
                false
            }
        });
    }

    fn archive_progress(&self, progress: Progress) {
        self.archive
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(progress);
    }
}
