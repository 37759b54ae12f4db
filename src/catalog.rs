//! Hunt catalog: where hunts come from, how they are checked, how they are cached.
//!
//! A local catalog is a directory of JSON files, one hunt per file:
//!
//! ```text
//! <hunts-dir>/
//!   harbor-walk.json
//!   old-town.json
//! ```
//!
//! Every hunt is validated when it is loaded. Waypoints come out sorted by
//! `sequenceIndex`, so the rest of the engine can index into them directly.

use std::{
    collections::{BTreeMap, HashMap, HashSet},
    fs,
    future::Future,
    io,
    path::{Path, PathBuf},
    sync::{Arc, PoisonError, RwLock},
};

use tracing::debug;

use crate::model::{Difficulty, Hunt};

/// Errors that can occur while loading or querying a catalog.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("hunt not found: {0}")]
    NotFound(String),

    #[error("invalid hunt {hunt_id}: {reason}")]
    Invalid { hunt_id: String, reason: String },

    #[error("failed to read {}: {source}", path.display())]
    Io { path: PathBuf, source: io::Error },

    #[error("failed to parse {}: {source}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

pub type Result<T> = core::result::Result<T, CatalogError>;

/// A source of hunts.
///
/// Implementations must return waypoints sorted by `sequence_index`.
pub trait Catalog {
    /// Hunts matching `filter`, active or not.
    fn list_hunts(&self, filter: &HuntFilter) -> impl Future<Output = Result<Vec<Hunt>>> + Send;

    /// A single hunt by id.
    fn get_hunt(&self, id: &str) -> impl Future<Output = Result<Hunt>> + Send;
}

/// Narrows a hunt listing.
#[derive(Debug, Clone, Default)]
pub struct HuntFilter {
    /// Case-insensitive substring of the name or description.
    pub search: Option<String>,
    pub difficulty: Option<Difficulty>,
}

impl HuntFilter {
    pub fn matches(&self, hunt: &Hunt) -> bool {
        if let Some(difficulty) = self.difficulty
            && hunt.difficulty != difficulty
        {
            return false;
        }

        match self.search.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                hunt.name.to_lowercase().contains(&needle)
                    || hunt.description.to_lowercase().contains(&needle)
            }
        }
    }
}

/// Check a hunt's structure and sort its waypoints into traversal order.
///
/// Sequence indices must be strictly increasing, waypoint ids unique,
/// the declared total equal to the sum of point values, and every clue
/// attached to a waypoint of the hunt.
pub fn validate_hunt(mut hunt: Hunt) -> Result<Hunt> {
    let hunt_id = hunt.id.clone();
    let invalid = |reason: String| CatalogError::Invalid {
        hunt_id: hunt_id.clone(),
        reason,
    };

    hunt.waypoints.sort_by_key(|w| w.sequence_index);

    if let Some(pair) = hunt
        .waypoints
        .windows(2)
        .find(|pair| pair[0].sequence_index == pair[1].sequence_index)
    {
        return Err(invalid(format!(
            "waypoints {} and {} share sequence index {}",
            pair[0].id, pair[1].id, pair[0].sequence_index
        )));
    }

    let mut ids = HashSet::new();
    for waypoint in &hunt.waypoints {
        if !ids.insert(waypoint.id.as_str()) {
            return Err(invalid(format!("duplicate waypoint id {}", waypoint.id)));
        }
    }

    let computed = hunt.computed_total();
    if computed != u64::from(hunt.total_points) {
        return Err(invalid(format!(
            "total points is {} but waypoints add up to {computed}",
            hunt.total_points
        )));
    }

    if let Some(clue) = hunt
        .clues
        .iter()
        .find(|c| !ids.contains(c.waypoint_id.as_str()))
    {
        return Err(invalid(format!(
            "clue {} refers to unknown waypoint {}",
            clue.id, clue.waypoint_id
        )));
    }

    Ok(hunt)
}

// ── Local catalog ──

/// An in-memory catalog, usually loaded from a directory of JSON files.
#[derive(Debug, Clone, Default)]
pub struct LocalCatalog {
    hunts: Arc<BTreeMap<String, Hunt>>,
}

impl LocalCatalog {
    /// Builds a catalog from hunts already in memory, validating each.
    pub fn from_hunts(hunts: impl IntoIterator<Item = Hunt>) -> Result<Self> {
        let mut map = BTreeMap::new();
        for hunt in hunts {
            let hunt = validate_hunt(hunt)?;
            map.insert(hunt.id.clone(), hunt);
        }
        Ok(Self {
            hunts: Arc::new(map),
        })
    }

    /// Loads every `*.json` file in `dir` as one hunt.
    ///
    /// A missing directory is an empty catalog.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let io_err = |source| CatalogError::Io {
            path: dir.to_path_buf(),
            source,
        };

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(io_err(e)),
        };

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry.map_err(io_err)?.path();
            if path.extension().and_then(|e| e.to_str()) == Some("json") {
                paths.push(path);
            }
        }
        // Sort for deterministic error reporting.
        paths.sort();

        let mut hunts = Vec::with_capacity(paths.len());
        for path in paths {
            let json = fs::read_to_string(&path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            let hunt: Hunt =
                serde_json::from_str(&json).map_err(|source| CatalogError::Json {
                    path: path.clone(),
                    source,
                })?;
            debug!(hunt = %hunt.id, path = %path.display(), "loaded hunt");
            hunts.push(hunt);
        }

        Self::from_hunts(hunts)
    }

    pub fn len(&self) -> usize {
        self.hunts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hunts.is_empty()
    }
}

impl Catalog for LocalCatalog {
    async fn list_hunts(&self, filter: &HuntFilter) -> Result<Vec<Hunt>> {
        Ok(self
            .hunts
            .values()
            .filter(|h| filter.matches(h))
            .cloned()
            .collect())
    }

    async fn get_hunt(&self, id: &str) -> Result<Hunt> {
        self.hunts
            .get(id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.to_string()))
    }
}

// ── Cache ──

/// Keeps every hunt it has seen so a session loads each hunt once.
///
/// Listing refreshes the cache. Lookups hit the cache first and fall back
/// to the source.
pub struct CachedCatalog<C> {
    source: C,
    cache: RwLock<HashMap<String, Arc<Hunt>>>,
}

impl<C: Catalog + Sync> CachedCatalog<C> {
    pub fn new(source: C) -> Self {
        Self {
            source,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn list_hunts(&self, filter: &HuntFilter) -> Result<Vec<Arc<Hunt>>> {
        let hunts: Vec<Arc<Hunt>> = self
            .source
            .list_hunts(filter)
            .await?
            .into_iter()
            .map(Arc::new)
            .collect();

        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        for hunt in &hunts {
            cache.insert(hunt.id.clone(), Arc::clone(hunt));
        }
        Ok(hunts)
    }

    pub async fn get_hunt(&self, id: &str) -> Result<Arc<Hunt>> {
        if let Some(hunt) = self.cached(id) {
            return Ok(hunt);
        }

        let hunt = Arc::new(self.source.get_hunt(id).await?);
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(hunt.id.clone(), Arc::clone(&hunt));
        Ok(hunt)
    }

    /// A hunt already in the cache, without touching the source.
    pub fn cached(&self, id: &str) -> Option<Arc<Hunt>> {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }
}
