//! Catalog commands: list, show.

use crate::catalog::{Catalog, HuntFilter, LocalCatalog};
use crate::model::Difficulty;

pub(super) async fn cmd_list(
    catalog: &LocalCatalog,
    search: Option<String>,
    difficulty: Option<Difficulty>,
) -> Result<(), String> {
    let filter = HuntFilter { search, difficulty };
    let hunts = catalog
        .list_hunts(&filter)
        .await
        .map_err(|e| format!("failed to list hunts: {e}"))?;

    let open: Vec<_> = hunts.into_iter().filter(|h| h.active).collect();
    if open.is_empty() {
        println!("No hunts");
        return Ok(());
    }

    for hunt in &open {
        println!(
            "{}  [{}]  {} stops, {} pts, ~{} min  {}",
            hunt.id,
            hunt.difficulty.label(),
            hunt.waypoints.len(),
            hunt.total_points,
            hunt.estimated_duration_minutes,
            hunt.name
        );
    }

    Ok(())
}

pub(super) async fn cmd_show(catalog: &LocalCatalog, hunt_id: &str) -> Result<(), String> {
    let hunt = catalog
        .get_hunt(hunt_id)
        .await
        .map_err(|e| format!("failed to load hunt: {e}"))?;

    println!("{} ({})", hunt.name, hunt.id);
    println!("{}", hunt.description);
    println!(
        "Difficulty: {}  Points: {}  Estimated: ~{} min{}",
        hunt.difficulty.label(),
        hunt.total_points,
        hunt.estimated_duration_minutes,
        if hunt.active { "" } else { "  (closed)" }
    );

    // Waypoint names only: positions would give the hunt away.
    for (i, waypoint) in hunt.waypoints.iter().enumerate() {
        println!("  {}. {}  ({} pts)", i + 1, waypoint.name, waypoint.point_value);
    }

    Ok(())
}
