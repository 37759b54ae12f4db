//! CLI interface for Trailhead.
//!
//! Each subcommand is non-interactive: arguments in, human-readable output
//! out. Commands split into two groups:
//!
//! - `trailhead hunts list|show`: browse the catalog, no player needed.
//! - `trailhead [--as <player>] start|status|check-in|walk|abandon|history`:
//!   play, operating on the player's active attempt.
//!
//! Progress lives in the local database, so each invocation resumes where
//! the previous one left off.

mod format;
mod hunts;
mod play;

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};
use tracing::Level;

use crate::catalog::LocalCatalog;
use crate::config::Config;
use crate::identity::resolve_player;
use crate::model::Difficulty;
use crate::service::LocalService;
use crate::session::Session;
use crate::storage::Storage;

/// Trailhead: scavenger hunts on foot.
#[derive(Debug, Parser)]
#[command(name = "trailhead", after_long_help = WORKFLOW_HELP)]
pub struct Cli {
    /// Player to act as. Falls back to TRAILHEAD_PLAYER, then the config file.
    #[arg(long = "as", global = true)]
    player: Option<String>,

    /// More log output on stderr (-v info, -vv debug).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

const WORKFLOW_HELP: &str = r#"Workflow: playing a hunt
  1. trailhead hunts list
  2. trailhead --as ana start harbor-walk
     → prints the first clue
  3. trailhead check-in --lat 47.3769 --lon 8.5417
  4. trailhead status --hint

Replaying a recorded walk:
  trailhead walk --track demos/tracks/harbor-walk.json --speed 20"#;

impl Cli {
    /// Log level selected by `-v`.
    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Browse the hunt catalog.
    Hunts {
        #[command(subcommand)]
        command: HuntsCommand,
    },

    /// Start a hunt. Any unfinished attempt at the same hunt is abandoned.
    Start {
        /// Hunt ID.
        hunt: String,
    },

    /// Show the active hunt: progress, elapsed time, current clue.
    Status {
        /// Also reveal the hint for the current waypoint.
        #[arg(long)]
        hint: bool,
    },

    /// Check in at a position.
    CheckIn {
        /// Latitude in degrees.
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,

        /// Longitude in degrees.
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
    },

    /// Replay a recorded track and check in whenever a waypoint is in reach.
    Walk {
        /// JSON track file: `[{"latitude": .., "longitude": .., "offsetMs": ..}]`.
        #[arg(long)]
        track: PathBuf,

        /// Replay speed multiplier.
        #[arg(long, default_value_t = 1.0)]
        speed: f64,
    },

    /// Give up on the active hunt. History is kept.
    Abandon,

    /// List every attempt, newest first.
    History,
}

#[derive(Debug, Subcommand)]
pub enum HuntsCommand {
    /// List hunts open for play.
    List {
        /// Case-insensitive text to look for in names and descriptions.
        #[arg(long)]
        search: Option<String>,

        #[arg(long, value_enum)]
        difficulty: Option<DifficultyArg>,
    },

    /// Show one hunt and its waypoints.
    Show {
        /// Hunt ID.
        hunt: String,
    },
}

/// CLI-facing difficulty, mapped to the domain `Difficulty`.
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum DifficultyArg {
    Beginner,
    Intermediate,
    Advanced,
    Expert,
}

impl DifficultyArg {
    fn to_domain(self) -> Difficulty {
        match self {
            Self::Beginner => Difficulty::Beginner,
            Self::Intermediate => Difficulty::Intermediate,
            Self::Advanced => Difficulty::Advanced,
            Self::Expert => Difficulty::Expert,
        }
    }
}

/// The session every play command runs in.
type LocalSession = Session<LocalCatalog, LocalService>;

/// Run the CLI, returning an error message on failure.
pub async fn run(cli: Cli, config: &Config) -> Result<(), String> {
    let player = cli.player.as_deref();

    match cli.command {
        Command::Hunts { command } => {
            let catalog = load_catalog(config)?;
            match command {
                HuntsCommand::List { search, difficulty } => {
                    hunts::cmd_list(&catalog, search, difficulty.map(DifficultyArg::to_domain))
                        .await
                }
                HuntsCommand::Show { hunt } => hunts::cmd_show(&catalog, &hunt).await,
            }
        }
        Command::Start { hunt } => play::cmd_start(&open_session(player, config)?, &hunt).await,
        Command::Status { hint } => play::cmd_status(&open_session(player, config)?, hint).await,
        Command::CheckIn { lat, lon } => {
            play::cmd_check_in(&open_session(player, config)?, lat, lon).await
        }
        Command::Walk { track, speed } => {
            let session = open_session(player, config)?;
            play::cmd_walk(&session, &track, speed, config.stream_settings()).await
        }
        Command::Abandon => play::cmd_abandon(&open_session(player, config)?).await,
        Command::History => play::cmd_history(&open_session(player, config)?),
    }
}

fn load_catalog(config: &Config) -> Result<LocalCatalog, String> {
    let dir = config
        .hunts_dir()
        .ok_or("could not determine home directory")?;
    LocalCatalog::from_dir(&dir).map_err(|e| format!("failed to load hunts: {e}"))
}

fn open_session(player: Option<&str>, config: &Config) -> Result<LocalSession, String> {
    let player = resolve_player(player, config)?;
    let catalog = load_catalog(config)?;

    let path = config
        .database()
        .ok_or("could not determine home directory")?;
    let storage = Storage::open(&path)
        .map_err(|e| format!("failed to open {}: {e}", path.display()))?;

    let service = LocalService::new(
        player.clone(),
        catalog.clone(),
        storage,
        config.check_in_radius_m,
    );
    Ok(Session::new(player, catalog, service, config.evaluator()))
}
