//! Snapshot export as JSON.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::semantic::GraphSnapshot;

pub fn snapshot_to_json(snapshot: &GraphSnapshot) -> Result<String> {
    serde_json::to_string_pretty(snapshot).context("Failed to serialize snapshot")
}

/// Write the snapshot to `path` as pretty-printed JSON.
pub fn write_snapshot<P: AsRef<Path>>(path: P, snapshot: &GraphSnapshot) -> Result<()> {
    let path = path.as_ref();
    let json = snapshot_to_json(snapshot)?;
    fs::write(path, json).with_context(|| format!("Failed to write snapshot to {:?}", path))?;
    info!(
        "Wrote snapshot ({} walls, {} doors, {} rooms) to {:?}",
        snapshot.walls.len(),
        snapshot.doors.len(),
        snapshot.rooms.len(),
        path
    );
    Ok(())
}
