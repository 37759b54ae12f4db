//! Player identity resolution.
//!
//! Every command that touches progress needs to know who is playing. Rather
//! than requiring `--as` on every invocation, the player is resolved through
//! a chain:
//!
//! 1. `--as <player>`: explicit per-command override
//! 2. `TRAILHEAD_PLAYER` env var: process/session level
//! 3. `player` in `~/.trailhead/config.toml`: global default
//!
//! The resolved player is an opaque string; the engine never interprets it.

use std::env;

use crate::config::Config;

/// Environment variable consulted after `--as`.
pub const PLAYER_ENV: &str = "TRAILHEAD_PLAYER";

/// Error message shown when the player cannot be resolved.
pub const PLAYER_REQUIRED: &str = "player required: pass --as <player>, \
    set TRAILHEAD_PLAYER, or add `player = \"...\"` to ~/.trailhead/config.toml";

/// Resolve the acting player from the resolution chain.
pub fn resolve_player(explicit: Option<&str>, config: &Config) -> Result<String, String> {
    resolve_from(explicit, env::var(PLAYER_ENV).ok(), config)
}

fn resolve_from(
    explicit: Option<&str>,
    from_env: Option<String>,
    config: &Config,
) -> Result<String, String> {
    if let Some(player) = explicit {
        let player = player.trim();
        if player.is_empty() {
            return Err("--as must not be empty".to_string());
        }
        return Ok(player.to_string());
    }

    if let Some(player) = from_env
        && !player.trim().is_empty()
    {
        return Ok(player.trim().to_string());
    }

    config
        .player
        .as_deref()
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .ok_or_else(|| PLAYER_REQUIRED.to_string())
}
