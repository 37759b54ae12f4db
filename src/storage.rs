//! Local persistence for hunt progress.
//!
//! A single `SQLite` database holds every progress record the local service
//! has seen. Records are never deleted: finishing or abandoning a hunt only
//! changes the record's status, so history survives.
//!
//! ```text
//! ~/.trailhead/trailhead.sqlite
//!   progress   # one row per hunt attempt
//! ```

use std::{
    fs, io,
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard, PoisonError},
};

use rusqlite::{Connection, OptionalExtension, Row, params};
use uuid::Uuid;

use crate::model::{Progress, ProgressStatus};

/// Errors that can occur during storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("progress not found: {0}")]
    ProgressNotFound(Uuid),

    #[error("progress already exists: {0}")]
    ProgressAlreadyExists(Uuid),

    #[error("corrupt progress record: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = core::result::Result<T, StorageError>;

/// A stored progress record and where it stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressRecord {
    pub progress: Progress,
    pub status: ProgressStatus,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS progress (
        id             TEXT PRIMARY KEY,
        player_id      TEXT NOT NULL,
        hunt_id        TEXT NOT NULL,
        visited        TEXT NOT NULL,
        current_index  INTEGER NOT NULL,
        earned_points  INTEGER NOT NULL,
        started_at     TEXT NOT NULL,
        completed_at   TEXT,
        status         TEXT NOT NULL
    );
    CREATE INDEX IF NOT EXISTS progress_player ON progress (player_id, status);
";

const COLUMNS: &str = "id, player_id, hunt_id, visited, current_index, earned_points, \
     started_at, completed_at, status";

/// `SQLite`-backed progress storage.
pub struct Storage {
    conn: Mutex<Connection>,
}

impl Storage {
    /// Opens (or creates) the database at `path`, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::init(Connection::open(path)?)
    }

    /// Opens a private in-memory database.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Returns the default database path: `~/.trailhead/trailhead.sqlite`.
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(".trailhead").join("trailhead.sqlite"))
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ── Writes ──

    /// Stores a new active record, abandoning any earlier active attempt
    /// by the same player at the same hunt.
    pub fn begin_attempt(&self, progress: &Progress) -> Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        let exists: bool = tx.query_row(
            "SELECT EXISTS (SELECT 1 FROM progress WHERE id = ?1)",
            [progress.id.to_string()],
            |row| row.get(0),
        )?;
        if exists {
            return Err(StorageError::ProgressAlreadyExists(progress.id));
        }

        tx.execute(
            "UPDATE progress SET status = ?1
             WHERE player_id = ?2 AND hunt_id = ?3 AND status = ?4",
            params![
                ProgressStatus::Abandoned.as_str(),
                &progress.player_id,
                &progress.hunt_id,
                ProgressStatus::Active.as_str(),
            ],
        )?;

        let row = ProgressRow::from_progress(progress, ProgressStatus::Active)?;
        tx.execute(
            &format!(
                "INSERT INTO progress ({COLUMNS}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
            ),
            params![
                row.id,
                row.player_id,
                row.hunt_id,
                row.visited,
                row.current_index,
                row.earned_points,
                row.started_at,
                row.completed_at,
                row.status,
            ],
        )?;

        tx.commit()?;
        Ok(())
    }

    /// Overwrites a record's progress fields and status.
    pub fn update_progress(&self, progress: &Progress, status: ProgressStatus) -> Result<()> {
        let row = ProgressRow::from_progress(progress, status)?;
        let rows = self.conn().execute(
            "UPDATE progress
             SET visited = ?1, current_index = ?2, earned_points = ?3,
                 completed_at = ?4, status = ?5
             WHERE id = ?6",
            params![
                row.visited,
                row.current_index,
                row.earned_points,
                row.completed_at,
                row.status,
                row.id,
            ],
        )?;
        if rows == 0 {
            return Err(StorageError::ProgressNotFound(progress.id));
        }
        Ok(())
    }

    /// Changes only a record's status.
    pub fn set_status(&self, id: Uuid, status: ProgressStatus) -> Result<()> {
        let rows = self.conn().execute(
            "UPDATE progress SET status = ?1 WHERE id = ?2",
            params![status.as_str(), id.to_string()],
        )?;
        if rows == 0 {
            return Err(StorageError::ProgressNotFound(id));
        }
        Ok(())
    }

    // ── Reads ──

    /// Loads a single record.
    pub fn load_progress(&self, id: Uuid) -> Result<ProgressRecord> {
        self.conn()
            .query_row(
                &format!("SELECT {COLUMNS} FROM progress WHERE id = ?1"),
                [id.to_string()],
                ProgressRow::read,
            )
            .optional()?
            .ok_or(StorageError::ProgressNotFound(id))?
            .into_record()
    }

    /// The player's most recent active record, optionally for one hunt.
    pub fn active_progress(
        &self,
        player_id: &str,
        hunt_id: Option<&str>,
    ) -> Result<Option<Progress>> {
        let row = self
            .conn()
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM progress
                     WHERE player_id = ?1 AND status = ?2 AND (?3 IS NULL OR hunt_id = ?3)
                     ORDER BY rowid DESC LIMIT 1"
                ),
                params![player_id, ProgressStatus::Active.as_str(), hunt_id],
                ProgressRow::read,
            )
            .optional()?;

        row.map(|r| r.into_record().map(|rec| rec.progress))
            .transpose()
    }

    /// The player's most recent record for a hunt, whatever its status.
    pub fn latest_progress(
        &self,
        player_id: &str,
        hunt_id: &str,
    ) -> Result<Option<ProgressRecord>> {
        self.conn()
            .query_row(
                &format!(
                    "SELECT {COLUMNS} FROM progress
                     WHERE player_id = ?1 AND hunt_id = ?2
                     ORDER BY rowid DESC LIMIT 1"
                ),
                params![player_id, hunt_id],
                ProgressRow::read,
            )
            .optional()?
            .map(ProgressRow::into_record)
            .transpose()
    }

    /// Every record for a player, newest first.
    pub fn history(&self, player_id: &str) -> Result<Vec<ProgressRecord>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {COLUMNS} FROM progress WHERE player_id = ?1 ORDER BY rowid DESC"
        ))?;
        let rows = stmt.query_map([player_id], ProgressRow::read)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?.into_record()?);
        }
        Ok(records)
    }
}

/// Column values of one `progress` row, before interpretation.
struct ProgressRow {
    id: String,
    player_id: String,
    hunt_id: String,
    visited: String,
    current_index: i64,
    earned_points: u32,
    started_at: String,
    completed_at: Option<String>,
    status: String,
}

impl ProgressRow {
    fn from_progress(progress: &Progress, status: ProgressStatus) -> Result<Self> {
        let current_index = i64::try_from(progress.current_index)
            .map_err(|_| StorageError::Corrupt("current index out of range".into()))?;
        Ok(Self {
            id: progress.id.to_string(),
            player_id: progress.player_id.clone(),
            hunt_id: progress.hunt_id.clone(),
            visited: serde_json::to_string(&progress.visited_waypoint_ids)?,
            current_index,
            earned_points: progress.earned_points,
            started_at: progress.started_at.to_string(),
            completed_at: progress.completed_at.map(|t| t.to_string()),
            status: status.as_str().to_string(),
        })
    }

    fn read(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            player_id: row.get(1)?,
            hunt_id: row.get(2)?,
            visited: row.get(3)?,
            current_index: row.get(4)?,
            earned_points: row.get(5)?,
            started_at: row.get(6)?,
            completed_at: row.get(7)?,
            status: row.get(8)?,
        })
    }

    fn into_record(self) -> Result<ProgressRecord> {
        let id = self
            .id
            .parse::<Uuid>()
            .map_err(|e| StorageError::Corrupt(format!("invalid progress id: {e}")))?;
        let current_index = usize::try_from(self.current_index)
            .map_err(|_| StorageError::Corrupt(format!("invalid index {}", self.current_index)))?;
        let started_at = self
            .started_at
            .parse::<jiff::Timestamp>()
            .map_err(|e| StorageError::Corrupt(format!("invalid started_at: {e}")))?;
        let completed_at = self
            .completed_at
            .map(|s| s.parse::<jiff::Timestamp>())
            .transpose()
            .map_err(|e| StorageError::Corrupt(format!("invalid completed_at: {e}")))?;
        let status = ProgressStatus::parse(&self.status)
            .ok_or_else(|| StorageError::Corrupt(format!("unknown status: {}", self.status)))?;

        let progress = Progress {
            id,
            player_id: self.player_id,
            hunt_id: self.hunt_id,
            visited_waypoint_ids: serde_json::from_str(&self.visited)?,
            current_index,
            earned_points: self.earned_points,
            started_at,
            completed: completed_at.is_some(),
            completed_at,
        };

        Ok(ProgressRecord { progress, status })
    }
}
