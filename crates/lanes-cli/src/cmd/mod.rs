pub mod drag;
pub mod feed;
pub mod priority;
pub mod show;
pub mod sim;
pub mod tool;

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use lanes_core::board::Board;
use lanes_core::config::load_project_config;
use lanes_core::storage::MemoryStorage;
use lanes_core::BoardStore;

/// Read a board snapshot (the JSON form of [`BoardStore`]).
pub fn load_snapshot(path: &Path) -> Result<BoardStore> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read snapshot {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse snapshot {}", path.display()))
}

/// Write a board snapshot as pretty JSON.
pub fn write_snapshot(path: &Path, store: &BoardStore) -> Result<()> {
    let json = serde_json::to_string_pretty(store)?;
    fs::write(path, json + "\n").with_context(|| format!("Failed to write snapshot {}", path.display()))
}

/// Seed an in-memory storage with `store` and open its project offline:
/// the caller feeds events by hand, so the board does not subscribe.
pub fn open_offline(store: &BoardStore, project_root: &Path) -> Result<Board<MemoryStorage>> {
    let project_id = store
        .project()
        .map(|p| p.id.clone())
        .context("snapshot has no project")?;
    let mut config = load_project_config(project_root)?;
    config.sync.realtime = false;
    let storage = MemoryStorage::from_snapshot(store)?;
    Ok(Board::open(storage, &project_id, config)?)
}
