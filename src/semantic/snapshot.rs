//! Read-only views of the scene graph and the optimizer boundary types.

use nalgebra::{Vector3, Vector4};
use serde::Serialize;

use crate::geometry::PlaneEquation;

use super::room::RoomStatus;
use super::types::{DoorId, EntityRef, MarkerId, OptimizerIds, RoomId, WallId};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WallView {
    pub id: WallId,
    pub local_opt_id: i64,
    pub global_opt_id: i64,
    pub plane: PlaneEquation,
    pub markers: Vec<MarkerId>,
    pub support: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DoorView {
    pub id: DoorId,
    pub local_opt_id: i64,
    pub global_opt_id: i64,
    pub name: String,
    pub marker_id: MarkerId,
    pub position: Vector3<f64>,
    pub host_wall: Option<WallId>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomView {
    pub id: RoomId,
    pub local_opt_id: i64,
    pub global_opt_id: i64,
    pub prior_id: u32,
    pub name: String,
    pub walls: Vec<WallId>,
    pub doors: Vec<DoorId>,
    pub center: Vector3<f64>,
    pub all_markers_seen: bool,
    pub status: RoomStatus,
}

/// Consistent copy of the whole graph, published after every keyframe.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GraphSnapshot {
    pub keyframes_processed: u64,
    pub walls: Vec<WallView>,
    pub doors: Vec<DoorView>,
    pub rooms: Vec<RoomView>,
}

impl GraphSnapshot {
    pub fn wall(&self, id: WallId) -> Option<&WallView> {
        self.walls.iter().find(|w| w.id == id)
    }

    pub fn door_named(&self, name: &str) -> Option<&DoorView> {
        self.doors.iter().find(|d| d.name == name)
    }

    pub fn room_for_prior(&self, prior_id: u32) -> Option<&RoomView> {
        self.rooms.iter().find(|r| r.prior_id == prior_id)
    }
}

/// Geometry of a landmark as seen by the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum LandmarkGeometry {
    /// Plane coefficients `[a, b, c, d]`.
    Plane(Vector4<f64>),
    Point(Vector3<f64>),
}

/// One optimizer landmark per wall, door and room.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LandmarkDescriptor {
    pub entity: EntityRef,
    pub local_opt_id: Option<u64>,
    pub global_opt_id: Option<u64>,
    pub geometry: LandmarkGeometry,
}

impl LandmarkDescriptor {
    pub(crate) fn new(entity: EntityRef, ids: OptimizerIds, geometry: LandmarkGeometry) -> Self {
        Self {
            entity,
            local_opt_id: ids.local,
            global_opt_id: ids.global,
            geometry,
        }
    }

    /// The optimizer has not allocated a landmark for this entity yet.
    pub fn needs_registration(&self) -> bool {
        self.local_opt_id.is_none() || self.global_opt_id.is_none()
    }
}

/// Feedback from the optimizer.
#[derive(Debug, Clone, PartialEq)]
pub enum OptimizerUpdate {
    /// Landmark indices allocated for an entity.
    AssignIds { entity: EntityRef, ids: OptimizerIds },
    /// Optimized plane of a wall.
    RefineWallPlane { wall: WallId, plane: PlaneEquation },
}
