//! ID types for semantic entities.
//!
//! Walls, Doors and Rooms reference each other only through these IDs,
//! resolved on demand through the owning registry. IDs are assigned
//! monotonically by each registry and never reused.

use serde::{Deserialize, Serialize};

/// Fiducial marker identifier (the dictionary ID printed on the tag).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MarkerId(pub u32);

impl MarkerId {
    pub fn new(id: u32) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for MarkerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "M{}", self.0)
    }
}

/// Identifier of a Wall owned by the `WallRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WallId(pub u64);

impl WallId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for WallId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "W{}", self.0)
    }
}

/// Identifier of a Door owned by the `DoorRegistry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DoorId(pub u64);

impl DoorId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DoorId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "D{}", self.0)
    }
}

/// Identifier of a Room owned by the `RoomAssembler`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RoomId(pub u64);

impl RoomId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for RoomId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "R{}", self.0)
    }
}

/// A reference to any semantic entity, used at the optimizer boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityRef {
    Wall(WallId),
    Door(DoorId),
    Room(RoomId),
}

impl std::fmt::Display for EntityRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityRef::Wall(id) => write!(f, "{}", id),
            EntityRef::Door(id) => write!(f, "{}", id),
            EntityRef::Room(id) => write!(f, "{}", id),
        }
    }
}

/// Indices of an entity's landmark in the front-end (local) and global optimizers.
///
/// `None` means "not yet registered with that optimizer" (the `-1` of the
/// optimizer-side interface); the optimizer allocates an index and reports
/// it back through `OptimizerUpdate::AssignIds`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OptimizerIds {
    pub local: Option<u64>,
    pub global: Option<u64>,
}

impl OptimizerIds {
    pub fn unassigned() -> Self {
        Self::default()
    }

    /// Index in the optimizer's integer convention, `-1` when unassigned.
    pub fn local_or_unassigned(&self) -> i64 {
        self.local.map_or(-1, |id| id as i64)
    }

    /// Index in the optimizer's integer convention, `-1` when unassigned.
    pub fn global_or_unassigned(&self) -> i64 {
        self.global.map_or(-1, |id| id as i64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_display() {
        assert_eq!(EntityRef::Wall(WallId::new(3)).to_string(), "W3");
        assert_eq!(EntityRef::Room(RoomId::new(1)).to_string(), "R1");
        assert_eq!(MarkerId::new(12).to_string(), "M12");
    }

    #[test]
    fn test_unassigned_optimizer_ids() {
        let ids = OptimizerIds::unassigned();
        assert_eq!(ids.local_or_unassigned(), -1);
        assert_eq!(ids.global_or_unassigned(), -1);

        let ids = OptimizerIds {
            local: Some(4),
            global: Some(9),
        };
        assert_eq!(ids.local_or_unassigned(), 4);
        assert_eq!(ids.global_or_unassigned(), 9);
    }
}
