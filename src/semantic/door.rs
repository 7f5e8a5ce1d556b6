//! Doors and their attachment to host walls.

use std::collections::{BTreeMap, HashMap};

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::geometry::SE3;
use crate::map::KeyFrameId;

use super::association::MarkerAssociationIndex;
use super::error::SemanticError;
use super::marker::Marker;
use super::types::{DoorId, EntityRef, MarkerId, OptimizerIds, WallId};
use super::wall::WallRegistry;

/// A door, one per distinct door marker.
#[derive(Debug, Clone)]
pub struct Door {
    pub id: DoorId,
    pub opt_ids: OptimizerIds,
    pub marker_id: MarkerId,
    pub name: String,
    /// Latest marker pose in world frame.
    pub pose: SE3,
    /// Wall the door is embedded in, once resolved.
    pub host_wall: Option<WallId>,
    pub last_observed: KeyFrameId,
}

impl Door {
    pub fn position(&self) -> Vector3<f64> {
        self.pose.translation
    }
}

/// Owner of all doors.
#[derive(Debug, Default)]
pub struct DoorRegistry {
    doors: BTreeMap<DoorId, Door>,
    by_marker: HashMap<MarkerId, DoorId>,
    next_id: u64,
}

impl DoorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_door_marker(marker: MarkerId, index: &MarkerAssociationIndex) -> bool {
        index.is_door_marker(marker)
    }

    pub fn get(&self, id: DoorId) -> Option<&Door> {
        self.doors.get(&id)
    }

    pub fn doors(&self) -> impl Iterator<Item = &Door> {
        self.doors.values()
    }

    pub fn len(&self) -> usize {
        self.doors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doors.is_empty()
    }

    pub fn door_for_marker(&self, marker: MarkerId) -> Option<DoorId> {
        self.by_marker.get(&marker).copied()
    }

    /// Create or update the door of `marker` and (re)try to find its host wall.
    ///
    /// A door without a host is not an error; the lookup is retried on every
    /// later sighting and whenever walls change.
    pub fn attach(
        &mut self,
        marker: &Marker,
        name: &str,
        walls: &WallRegistry,
        tolerance: f64,
        keyframe: KeyFrameId,
    ) -> DoorId {
        let host = find_host_wall(&marker.position(), walls, tolerance);

        if let Some(id) = self.by_marker.get(&marker.id).copied() {
            if let Some(door) = self.doors.get_mut(&id) {
                door.pose = marker.pose.clone();
                door.last_observed = keyframe;
                let previous = door.host_wall.and_then(|w| walls.resolve_id(w));
                door.host_wall = host.or(previous);
                return id;
            }
        }

        let id = DoorId::new(self.next_id);
        self.next_id += 1;
        self.doors.insert(
            id,
            Door {
                id,
                opt_ids: OptimizerIds::unassigned(),
                marker_id: marker.id,
                name: name.to_string(),
                pose: marker.pose.clone(),
                host_wall: host,
                last_observed: keyframe,
            },
        );
        self.by_marker.insert(marker.id, id);

        match host {
            Some(wall) => info!("Created door {} ({}) on wall {}", id, name, wall),
            None => info!("Created door {} ({}) without host wall", id, name),
        }
        id
    }

    /// Re-resolve host walls after walls were created or merged.
    ///
    /// Hosts that no longer resolve are reported as stale and looked up again.
    pub fn refresh_hosts(&mut self, walls: &WallRegistry, tolerance: f64) -> Vec<SemanticError> {
        let mut stale = Vec::new();
        for door in self.doors.values_mut() {
            if let Some(host) = door.host_wall {
                match walls.resolve_id(host) {
                    Some(resolved) => {
                        door.host_wall = Some(resolved);
                        continue;
                    }
                    None => {
                        stale.push(SemanticError::StaleReference {
                            entity: EntityRef::Door(door.id),
                            wall: host,
                        });
                        door.host_wall = None;
                    }
                }
            }

            door.host_wall = find_host_wall(&door.position(), walls, tolerance);
            if let Some(wall) = door.host_wall {
                debug!("Door {} attached to wall {}", door.id, wall);
            }
        }
        stale
    }

    /// Point every door hosted by `from` to `to`.
    pub fn rewrite_wall_refs(&mut self, from: WallId, to: WallId) {
        for door in self.doors.values_mut() {
            if door.host_wall == Some(from) {
                door.host_wall = Some(to);
            }
        }
    }

    pub fn set_optimizer_ids(&mut self, id: DoorId, ids: OptimizerIds) -> Result<(), SemanticError> {
        let door = self
            .doors
            .get_mut(&id)
            .ok_or(SemanticError::UnknownEntity(EntityRef::Door(id)))?;
        door.opt_ids = ids;
        Ok(())
    }
}

/// Wall whose plane passes within `tolerance` of `position`.
///
/// The nearest plane wins; equal distances go to the lowest wall ID.
pub fn find_host_wall(position: &Vector3<f64>, walls: &WallRegistry, tolerance: f64) -> Option<WallId> {
    walls
        .walls()
        .map(|wall| (wall.plane.distance(position), wall.id))
        .filter(|(distance, _)| *distance <= tolerance)
        .min_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)))
        .map(|(_, id)| id)
}
