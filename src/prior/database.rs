//! Static prior describing the environment: which markers bound which rooms
//! and which markers are mounted on doors.
//!
//! The database is a JSON document of the form
//!
//! ```text
//! {
//!   "rooms": {
//!     "1": { "name": "Corridor", "markers": [[1, 2], [3, 4]], "doors": [5] }
//!   },
//!   "doors": {
//!     "1": { "name": "Door-A", "marker": 5 }
//!   }
//! }
//! ```
//!
//! Malformed entries are logged and skipped; only an unreadable file or a
//! document that is not JSON aborts the load.

use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::semantic::types::MarkerId;

/// Prior definition of a room or corridor.
#[derive(Debug, Clone, PartialEq)]
pub struct RoomPrior {
    /// Key of the room in the database.
    pub id: u32,
    pub name: String,
    /// Marker IDs partitioned into pairs (opposite walls) or quadruples
    /// (two pairs of opposite walls) that jointly bound the room.
    pub wall_marker_groups: Vec<Vec<MarkerId>>,
    /// Markers of the doors leading into the room.
    pub door_marker_ids: Vec<MarkerId>,
}

impl RoomPrior {
    /// All wall marker IDs of the room, in group order.
    pub fn wall_markers(&self) -> impl Iterator<Item = MarkerId> + '_ {
        self.wall_marker_groups.iter().flatten().copied()
    }
}

/// Prior definition of a door.
#[derive(Debug, Clone, PartialEq)]
pub struct DoorPrior {
    /// Key of the door in the database.
    pub id: u32,
    pub name: String,
    pub marker_id: MarkerId,
}

#[derive(Debug, Deserialize)]
struct RawRoom {
    name: String,
    markers: Vec<Vec<u32>>,
    #[serde(default)]
    doors: Vec<u32>,
}

#[derive(Debug, Deserialize)]
struct RawDoor {
    name: String,
    marker: u32,
}

/// The environment prior, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct PriorDatabase {
    pub rooms: Vec<RoomPrior>,
    pub doors: Vec<DoorPrior>,
}

impl PriorDatabase {
    /// Load the prior from a JSON file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read prior database {:?}", path))?;
        info!("Loading prior database from {:?}", path);
        Self::from_json_str(&contents)
    }

    /// Parse the prior from a JSON string, skipping malformed entries.
    pub fn from_json_str(contents: &str) -> Result<Self> {
        let document: Value =
            serde_json::from_str(contents).context("Prior database is not valid JSON")?;

        let mut rooms: Vec<RoomPrior> = section_entries(&document, "rooms")
            .filter_map(|(key, value)| parse_room(key, value))
            .collect();
        rooms.sort_by_key(|room| room.id);

        let mut doors: Vec<DoorPrior> = section_entries(&document, "doors")
            .filter_map(|(key, value)| parse_door(key, value))
            .collect();
        doors.sort_by_key(|door| door.id);

        for room in &rooms {
            info!(
                "Room #{} ({}) fetched with marker groups {:?}",
                room.id,
                room.name,
                room.wall_marker_groups
                    .iter()
                    .map(|group| group.iter().map(|m| m.0).collect::<Vec<_>>())
                    .collect::<Vec<_>>()
            );
        }
        for door in &doors {
            info!("Door #{} ({}) fetched with marker {}", door.id, door.name, door.marker_id.0);
        }

        Ok(Self { rooms, doors })
    }
}

/// Entries of a top-level object section; a missing or non-object section is empty.
fn section_entries<'a>(
    document: &'a Value,
    section: &'static str,
) -> Box<dyn Iterator<Item = (&'a String, &'a Value)> + 'a> {
    match document.get(section) {
        Some(Value::Object(entries)) => Box::new(entries.iter()),
        Some(_) => {
            warn!("Prior section '{}' is not an object, ignoring it", section);
            Box::new(std::iter::empty())
        }
        None => {
            warn!("Prior database has no '{}' section", section);
            Box::new(std::iter::empty())
        }
    }
}

fn parse_room(key: &str, value: &Value) -> Option<RoomPrior> {
    let Ok(id) = key.parse::<u32>() else {
        warn!("Skipping room with non-numeric key '{}'", key);
        return None;
    };
    let raw = match RawRoom::deserialize(value) {
        Ok(raw) => raw,
        Err(e) => {
            warn!("Skipping malformed room #{}: {}", id, e);
            return None;
        }
    };

    if raw.markers.is_empty() {
        warn!("Skipping room #{} ({}): no wall marker groups", id, raw.name);
        return None;
    }
    if let Some(group) = raw.markers.iter().find(|g| g.len() != 2 && g.len() != 4) {
        warn!(
            "Skipping room #{} ({}): marker group {:?} is neither a pair nor a quadruple",
            id, raw.name, group
        );
        return None;
    }

    Some(RoomPrior {
        id,
        name: raw.name,
        wall_marker_groups: raw
            .markers
            .into_iter()
            .map(|group| group.into_iter().map(MarkerId::new).collect())
            .collect(),
        door_marker_ids: raw.doors.into_iter().map(MarkerId::new).collect(),
    })
}

fn parse_door(key: &str, value: &Value) -> Option<DoorPrior> {
    let Ok(id) = key.parse::<u32>() else {
        warn!("Skipping door with non-numeric key '{}'", key);
        return None;
    };
    match RawDoor::deserialize(value) {
        Ok(raw) => Some(DoorPrior {
            id,
            name: raw.name,
            marker_id: MarkerId::new(raw.marker),
        }),
        Err(e) => {
            warn!("Skipping malformed door #{}: {}", id, e);
            None
        }
    }
}
