//! Trailhead configuration.
//!
//! Loaded from `~/.trailhead/config.toml`. Every key is optional; a missing
//! file means defaults throughout.

use std::fs;
use std::path::{Path, PathBuf};

use jiff::SignedDuration;
use serde::{Deserialize, Serialize};

use crate::location::{DEFAULT_MIN_DISTANCE_M, DEFAULT_SAMPLE_INTERVAL_MS, StreamSettings};
use crate::proximity::{DEFAULT_CHECK_IN_RADIUS_M, ProximityEvaluator};
use crate::storage::Storage;

/// Trailhead configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct Config {
    /// The default player when neither `--as` nor `TRAILHEAD_PLAYER` is set.
    pub player: Option<String>,

    /// How close the player must be to claim a waypoint, in meters.
    pub check_in_radius_m: f32,

    /// Minimum time between accepted location samples.
    pub sample_interval_ms: u64,

    /// Minimum movement between accepted location samples, in meters.
    pub min_distance_m: f32,

    /// Directory of hunt JSON files. Defaults to `~/.trailhead/hunts`.
    pub hunts_dir: Option<PathBuf>,

    /// Progress database. Defaults to `~/.trailhead/trailhead.sqlite`.
    pub database: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            player: None,
            check_in_radius_m: DEFAULT_CHECK_IN_RADIUS_M,
            sample_interval_ms: DEFAULT_SAMPLE_INTERVAL_MS.unsigned_abs(),
            min_distance_m: DEFAULT_MIN_DISTANCE_M,
            hunts_dir: None,
            database: None,
        }
    }
}

impl Config {
    /// Load config from `~/.trailhead/config.toml`, or defaults if there is none.
    pub fn load() -> Result<Self, String> {
        let path = Self::path().ok_or("could not determine home directory")?;
        Self::load_from(&path)
    }

    /// Load config from `path`. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, String> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| format!("failed to read {}: {e}", path.display()))?;

        let config: Self = toml::from_str(&contents)
            .map_err(|e| format!("invalid config at {}: {e}", path.display()))?;

        config
            .validate()
            .map_err(|e| format!("invalid config at {}: {e}", path.display()))?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), String> {
        if !(self.check_in_radius_m.is_finite() && self.check_in_radius_m > 0.0) {
            return Err(format!(
                "check-in-radius-m must be positive (got {})",
                self.check_in_radius_m
            ));
        }
        if !(self.min_distance_m.is_finite() && self.min_distance_m >= 0.0) {
            return Err(format!(
                "min-distance-m must not be negative (got {})",
                self.min_distance_m
            ));
        }
        if i64::try_from(self.sample_interval_ms).is_err() {
            return Err(format!(
                "sample-interval-ms is too large (got {})",
                self.sample_interval_ms
            ));
        }
        if let Some(player) = &self.player
            && player.trim().is_empty()
        {
            return Err("player is empty".to_string());
        }
        Ok(())
    }

    /// The config file path: `~/.trailhead/config.toml`.
    pub fn path() -> Option<PathBuf> {
        Self::home().map(|h| h.join("config.toml"))
    }

    /// The trailhead directory: `~/.trailhead`.
    pub fn home() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".trailhead"))
    }

    /// Where hunts are loaded from.
    pub fn hunts_dir(&self) -> Option<PathBuf> {
        self.hunts_dir
            .clone()
            .or_else(|| Self::home().map(|h| h.join("hunts")))
    }

    /// Where progress is stored.
    pub fn database(&self) -> Option<PathBuf> {
        self.database.clone().or_else(Storage::default_path)
    }

    pub fn evaluator(&self) -> ProximityEvaluator {
        ProximityEvaluator::new(self.check_in_radius_m)
    }

    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            min_interval: SignedDuration::from_millis(
                i64::try_from(self.sample_interval_ms).unwrap_or(i64::MAX),
            ),
            min_distance_m: self.min_distance_m,
        }
    }
}
