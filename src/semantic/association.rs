//! Marker classification against the environment prior.

use std::collections::{HashMap, HashSet};

use crate::prior::PriorDatabase;

use super::types::MarkerId;

/// Role of a marker ID in the prior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MarkerClass {
    /// Bounds a room: the marker is mounted on a wall.
    WallBoundary,
    /// Mounted on a door.
    DoorBoundary { door_name: String },
    /// Listed both as a room boundary and as a door.
    Both { door_name: String },
    /// Not present in the prior.
    Unregistered,
}

impl MarkerClass {
    pub fn is_wall(&self) -> bool {
        matches!(self, MarkerClass::WallBoundary | MarkerClass::Both { .. })
    }
}

/// Lookup tables derived once from the prior.
#[derive(Debug, Clone, Default)]
pub struct MarkerAssociationIndex {
    wall_markers: HashSet<MarkerId>,
    door_names: HashMap<MarkerId, String>,
    unregistered_are_walls: bool,
}

impl MarkerAssociationIndex {
    /// Build the index. With `unregistered_are_walls`, any marker that is not a
    /// door marker is treated as a wall marker.
    pub fn new(prior: &PriorDatabase, unregistered_are_walls: bool) -> Self {
        let wall_markers = prior.rooms.iter().flat_map(|room| room.wall_markers()).collect();
        let door_names = prior
            .doors
            .iter()
            .map(|door| (door.marker_id, door.name.clone()))
            .collect();

        Self {
            wall_markers,
            door_names,
            unregistered_are_walls,
        }
    }

    pub fn classify(&self, marker: MarkerId) -> MarkerClass {
        let is_wall = self.wall_markers.contains(&marker);
        match (is_wall, self.door_names.get(&marker)) {
            (true, Some(name)) => MarkerClass::Both {
                door_name: name.clone(),
            },
            (true, None) => MarkerClass::WallBoundary,
            (false, Some(name)) => MarkerClass::DoorBoundary {
                door_name: name.clone(),
            },
            (false, None) if self.unregistered_are_walls => MarkerClass::WallBoundary,
            (false, None) => MarkerClass::Unregistered,
        }
    }

    /// Name of the door the marker is mounted on.
    pub fn door_name(&self, marker: MarkerId) -> Option<&str> {
        self.door_names.get(&marker).map(String::as_str)
    }

    pub fn is_door_marker(&self, marker: MarkerId) -> bool {
        self.door_names.contains_key(&marker)
    }
}
