//! Room assembly from the prior's wall-marker groups.
//!
//! A room goes through
//! `Unseen → PartiallyDetected → Instantiated → Finalized`:
//! - PartiallyDetected: every marker of some group was sighted, but their
//!   walls are not all registered yet
//! - Instantiated: the walls of one group resolve; the room exists and its
//!   center follows the walls as they are refined
//! - Finalized: every group is sighted and resolved; the center is computed
//!   one last time and then frozen
//!
//! Rooms are never removed once instantiated.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use nalgebra::{Matrix3, Vector3};
use serde::Serialize;
use tracing::{debug, info};

use crate::geometry::PlaneEquation;
use crate::prior::RoomPrior;

use super::config::RoomConfig;
use super::door::DoorRegistry;
use super::error::SemanticError;
use super::types::{DoorId, EntityRef, MarkerId, OptimizerIds, RoomId, WallId};
use super::wall::WallRegistry;

/// Normals closer to parallel than this do not define an intersection line.
const MIN_LINE_DIRECTION_NORM: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoomStatus {
    Unseen,
    PartiallyDetected,
    Instantiated,
    Finalized,
}

/// A room or corridor instantiated from its prior.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: RoomId,
    pub opt_ids: OptimizerIds,
    pub prior_id: u32,
    pub name: String,
    pub wall_marker_groups: Vec<Vec<MarkerId>>,
    pub door_marker_ids: Vec<MarkerId>,
    pub walls: Vec<WallId>,
    pub doors: Vec<DoorId>,
    pub all_markers_seen: bool,
    pub center: Vector3<f64>,
}

impl Room {
    pub fn status(&self) -> RoomStatus {
        if self.all_markers_seen {
            RoomStatus::Finalized
        } else {
            RoomStatus::Instantiated
        }
    }
}

/// Changes made by one `RoomAssembler::update` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RoomUpdate {
    pub created: Vec<RoomId>,
    pub finalized: Vec<RoomId>,
    /// Prior IDs that became partially detected.
    pub partially_detected: Vec<u32>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Geometry
// ─────────────────────────────────────────────────────────────────────────────

/// Plane halfway between two roughly parallel walls, oriented like `a`.
fn mid_plane(a: &PlaneEquation, b: &PlaneEquation) -> Option<PlaneEquation> {
    let b = b.aligned_with(&a.normal());
    PlaneEquation::new(
        (a.normal() + b.normal()) * 0.5,
        (a.offset() + b.offset()) * 0.5,
    )
}

/// Center of a room bounded by two opposite walls: the marker position
/// projected onto the plane halfway between them.
pub fn room_center_from_two_walls(
    marker_position: &Vector3<f64>,
    wall_a: &PlaneEquation,
    wall_b: &PlaneEquation,
) -> Option<Vector3<f64>> {
    mid_plane(wall_a, wall_b).map(|mid| mid.project(marker_position))
}

/// Center of a room bounded by two pairs of opposite walls.
///
/// The midplanes of both pairs intersect in a line (vertical for vertical
/// walls); the returned center is the point of that line closest to the origin.
pub fn room_center_from_four_walls(
    x1: &PlaneEquation,
    x2: &PlaneEquation,
    y1: &PlaneEquation,
    y2: &PlaneEquation,
) -> Option<Vector3<f64>> {
    let mid_x = mid_plane(x1, x2)?;
    let mid_y = mid_plane(y1, y2)?;

    let direction = mid_x.normal().cross(&mid_y.normal());
    if direction.norm() < MIN_LINE_DIRECTION_NORM {
        return None;
    }

    let system = Matrix3::from_rows(&[
        mid_x.normal().transpose(),
        mid_y.normal().transpose(),
        direction.transpose(),
    ]);
    let rhs = Vector3::new(-mid_x.offset(), -mid_y.offset(), 0.0);
    system.lu().solve(&rhs)
}

/// Index of the first group whose markers were all sighted.
pub fn early_detect(prior: &RoomPrior, seen: &BTreeSet<MarkerId>) -> Option<usize> {
    prior
        .wall_marker_groups
        .iter()
        .position(|group| group.iter().all(|m| seen.contains(m)))
}

pub fn all_groups_seen(prior: &RoomPrior, seen: &BTreeSet<MarkerId>) -> bool {
    prior.wall_markers().all(|m| seen.contains(&m))
}

/// Walls of `group` in marker order, `None` unless every marker resolves to
/// its own wall.
fn group_walls(group: &[MarkerId], walls: &WallRegistry) -> Option<Vec<WallId>> {
    let ids: Vec<WallId> = group
        .iter()
        .map(|m| walls.wall_for_marker(*m))
        .collect::<Option<_>>()?;
    let distinct: BTreeSet<WallId> = ids.iter().copied().collect();
    (distinct.len() == ids.len()).then_some(ids)
}

// ─────────────────────────────────────────────────────────────────────────────
// Assembler
// ─────────────────────────────────────────────────────────────────────────────

/// Owner of all rooms.
pub struct RoomAssembler {
    priors: Vec<RoomPrior>,
    rooms: BTreeMap<RoomId, Room>,
    by_prior: HashMap<u32, RoomId>,
    partially_detected: BTreeSet<u32>,
    next_id: u64,
    config: RoomConfig,
}

impl RoomAssembler {
    pub fn new(priors: Vec<RoomPrior>, config: RoomConfig) -> Self {
        Self {
            priors,
            rooms: BTreeMap::new(),
            by_prior: HashMap::new(),
            partially_detected: BTreeSet::new(),
            next_id: 0,
            config,
        }
    }

    pub fn get(&self, id: RoomId) -> Option<&Room> {
        self.rooms.get(&id)
    }

    pub fn rooms(&self) -> impl Iterator<Item = &Room> {
        self.rooms.values()
    }

    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    pub fn room_for_prior(&self, prior_id: u32) -> Option<RoomId> {
        self.by_prior.get(&prior_id).copied()
    }

    pub fn status(&self, prior_id: u32) -> RoomStatus {
        match self.by_prior.get(&prior_id).and_then(|id| self.rooms.get(id)) {
            Some(room) => room.status(),
            None if self.partially_detected.contains(&prior_id) => RoomStatus::PartiallyDetected,
            None => RoomStatus::Unseen,
        }
    }

    /// Advance every room prior given the markers sighted so far.
    pub fn update(
        &mut self,
        seen: &BTreeSet<MarkerId>,
        walls: &WallRegistry,
        doors: &DoorRegistry,
        marker_positions: &HashMap<MarkerId, Vector3<f64>>,
    ) -> RoomUpdate {
        let mut update = RoomUpdate::default();

        for prior_index in 0..self.priors.len() {
            let prior_id = self.priors[prior_index].id;

            let room_id = match self.by_prior.get(&prior_id).copied() {
                Some(id) => id,
                None => {
                    let prior = &self.priors[prior_index];
                    if early_detect(prior, seen).is_none() {
                        continue;
                    }
                    let resolvable = prior.wall_marker_groups.iter().position(|group| {
                        group.iter().all(|m| seen.contains(m)) && group_walls(group, walls).is_some()
                    });
                    let Some(group) = resolvable else {
                        if self.partially_detected.insert(prior_id) {
                            info!(
                                "Room #{} ({}) partially detected, waiting for its walls",
                                prior_id, prior.name
                            );
                            update.partially_detected.push(prior_id);
                        }
                        continue;
                    };
                    let id = self.create_room(prior_index, group, walls, doors, marker_positions);
                    update.created.push(id);
                    id
                }
            };

            if self.refresh_room(room_id, seen, walls, doors, marker_positions) {
                update.finalized.push(room_id);
            }
        }

        update
    }

    /// Instantiate the room of `priors[prior_index]`, triggered by `group`.
    fn create_room(
        &mut self,
        prior_index: usize,
        group: usize,
        walls: &WallRegistry,
        doors: &DoorRegistry,
        marker_positions: &HashMap<MarkerId, Vector3<f64>>,
    ) -> RoomId {
        let prior = &self.priors[prior_index];
        let id = RoomId::new(self.next_id);
        self.next_id += 1;

        let mut room = Room {
            id,
            opt_ids: OptimizerIds::unassigned(),
            prior_id: prior.id,
            name: prior.name.clone(),
            wall_marker_groups: prior.wall_marker_groups.clone(),
            door_marker_ids: prior.door_marker_ids.clone(),
            walls: group_walls(&prior.wall_marker_groups[group], walls).unwrap_or_default(),
            doors: Vec::new(),
            all_markers_seen: false,
            center: Vector3::zeros(),
        };
        refresh_doors(&mut room, doors);
        if let Some(center) = compute_center(&room, walls, marker_positions, &self.config) {
            room.center = center;
        }

        info!(
            "Instantiated room {} (#{} {}) with walls {:?}, center [{:.2}, {:.2}, {:.2}]",
            id,
            room.prior_id,
            room.name,
            room.walls,
            room.center.x,
            room.center.y,
            room.center.z
        );

        self.partially_detected.remove(&room.prior_id);
        self.by_prior.insert(room.prior_id, id);
        self.rooms.insert(id, room);
        id
    }

    /// Reorganize walls, refresh doors and recompute the center of a room that
    /// is not finalized yet. Returns true when the room got finalized.
    fn refresh_room(
        &mut self,
        id: RoomId,
        seen: &BTreeSet<MarkerId>,
        walls: &WallRegistry,
        doors: &DoorRegistry,
        marker_positions: &HashMap<MarkerId, Vector3<f64>>,
    ) -> bool {
        let Some(room) = self.rooms.get_mut(&id) else {
            return false;
        };
        reorganize_walls(room, walls);
        refresh_doors(room, doors);
        if room.all_markers_seen {
            return false;
        }

        if let Some(center) = compute_center(room, walls, marker_positions, &self.config) {
            room.center = center;
        }

        let complete = room.wall_marker_groups.iter().all(|group| {
            group.iter().all(|m| seen.contains(m)) && group_walls(group, walls).is_some()
        });
        if complete {
            room.all_markers_seen = true;
            info!(
                "Finalized room {} ({}), center [{:.2}, {:.2}, {:.2}]",
                id, room.name, room.center.x, room.center.y, room.center.z
            );
        }
        complete
    }

    /// Point every room wall reference from `from` to `to`.
    pub fn rewrite_wall_refs(&mut self, from: WallId, to: WallId) {
        for room in self.rooms.values_mut() {
            if !room.walls.contains(&from) {
                continue;
            }
            let mut rewritten = Vec::with_capacity(room.walls.len());
            for wall in room.walls.iter().map(|w| if *w == from { to } else { *w }) {
                if !rewritten.contains(&wall) {
                    rewritten.push(wall);
                }
            }
            room.walls = rewritten;
        }
    }

    pub fn set_optimizer_ids(&mut self, id: RoomId, ids: OptimizerIds) -> Result<(), SemanticError> {
        let room = self
            .rooms
            .get_mut(&id)
            .ok_or(SemanticError::UnknownEntity(EntityRef::Room(id)))?;
        room.opt_ids = ids;
        Ok(())
    }
}

/// Re-derive the room's walls from the walls its markers belong to, in
/// group order. Idempotent.
pub fn reorganize_walls(room: &mut Room, walls: &WallRegistry) {
    let mut reorganized = Vec::new();
    for marker in room.wall_marker_groups.iter().flatten() {
        if let Some(wall) = walls.wall_for_marker(*marker) {
            if !reorganized.contains(&wall) {
                reorganized.push(wall);
            }
        }
    }
    if reorganized != room.walls {
        debug!("Room {} walls reorganized: {:?} -> {:?}", room.id, room.walls, reorganized);
        room.walls = reorganized;
    }
}

/// Bind the registered doors of the room's door markers.
pub fn refresh_doors(room: &mut Room, doors: &DoorRegistry) {
    room.doors = room
        .door_marker_ids
        .iter()
        .filter_map(|m| doors.door_for_marker(*m))
        .collect();
}

/// Center from the best available evidence: the first resolvable four-wall
/// group, otherwise the mean over resolvable wall pairs.
fn compute_center(
    room: &Room,
    walls: &WallRegistry,
    marker_positions: &HashMap<MarkerId, Vector3<f64>>,
    config: &RoomConfig,
) -> Option<Vector3<f64>> {
    let parallel_tolerance = config.parallel_tolerance_deg.to_radians();
    let min_separation = config.min_pair_separation_deg.to_radians();
    let plane_of = |id: WallId| walls.resolve(id).map(|w| w.plane);

    let mut pair_centers = Vec::new();
    for group in &room.wall_marker_groups {
        let Some(ids) = group_walls(group, walls) else {
            continue;
        };
        let planes: Vec<PlaneEquation> = ids.iter().filter_map(|id| plane_of(*id)).collect();

        match planes.as_slice() {
            [x1, x2, y1, y2] => {
                if unoriented_angle(x1, x2) > parallel_tolerance
                    || unoriented_angle(y1, y2) > parallel_tolerance
                    || unoriented_angle(x1, y1) < min_separation
                {
                    debug!("Room {}: four-wall group {:?} is not a box", room.id, group);
                    continue;
                }
                if let Some(center) = room_center_from_four_walls(x1, x2, y1, y2) {
                    return Some(center);
                }
            }
            [a, b] => {
                if unoriented_angle(a, b) > parallel_tolerance {
                    debug!("Room {}: walls of group {:?} are not parallel", room.id, group);
                    continue;
                }
                let positions: Vec<Vector3<f64>> = group
                    .iter()
                    .filter_map(|m| marker_positions.get(m).copied())
                    .collect();
                if positions.is_empty() {
                    continue;
                }
                let marker_mean = positions.iter().sum::<Vector3<f64>>() / positions.len() as f64;
                if let Some(center) = room_center_from_two_walls(&marker_mean, a, b) {
                    pair_centers.push(center);
                }
            }
            _ => {}
        }
    }

    if pair_centers.is_empty() {
        return None;
    }
    Some(pair_centers.iter().sum::<Vector3<f64>>() / pair_centers.len() as f64)
}

/// Angle between the planes' normal lines, ignoring orientation, in `[0, π/2]`.
fn unoriented_angle(a: &PlaneEquation, b: &PlaneEquation) -> f64 {
    a.normal().dot(&b.normal()).abs().clamp(0.0, 1.0).acos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SE3;
    use crate::map::{KeyFrame, KeyFrameId};
    use crate::semantic::config::{AssociationConfig, PlaneFitConfig};
    use crate::semantic::marker::Marker;
    use approx::assert_relative_eq;

    fn plane(normal: Vector3<f64>, point: Vector3<f64>) -> PlaneEquation {
        PlaneEquation::from_normal_and_point(normal, &point).unwrap()
    }

    fn corridor_prior() -> RoomPrior {
        RoomPrior {
            id: 1,
            name: "Corridor".to_string(),
            wall_marker_groups: vec![
                vec![MarkerId::new(1), MarkerId::new(2)],
                vec![MarkerId::new(3), MarkerId::new(4)],
            ],
            door_marker_ids: vec![MarkerId::new(5)],
        }
    }

    fn seen(ids: &[u32]) -> BTreeSet<MarkerId> {
        ids.iter().map(|id| MarkerId::new(*id)).collect()
    }

    /// Registers one wall per `(marker, plane, marker position)`.
    fn register_walls(
        walls: &mut WallRegistry,
        positions: &mut HashMap<MarkerId, Vector3<f64>>,
        entries: &[(u32, PlaneEquation, Vector3<f64>)],
    ) {
        let kf = KeyFrame::new(KeyFrameId::new(0), 0, SE3::identity(), Vec::new());
        for (marker, plane, position) in entries {
            let marker = Marker::new(
                MarkerId::new(*marker),
                SE3::from_axis_angle(Vector3::zeros(), *position),
                0,
            );
            walls.create_wall(*plane, &marker, &kf);
            positions.insert(marker.id, *position);
        }
    }

    fn wall_registry() -> WallRegistry {
        WallRegistry::new(AssociationConfig::default(), PlaneFitConfig::default())
    }

    #[test]
    fn test_early_detection() {
        let prior = corridor_prior();
        assert_eq!(early_detect(&prior, &seen(&[1, 2])), Some(0));
        assert_eq!(early_detect(&prior, &seen(&[3, 4, 1])), Some(1));
        assert_eq!(early_detect(&prior, &seen(&[1])), None);
        assert_eq!(early_detect(&prior, &seen(&[1, 3])), None);
        assert!(!all_groups_seen(&prior, &seen(&[1, 2, 3])));
        assert!(all_groups_seen(&prior, &seen(&[1, 2, 3, 4])));
    }

    #[test]
    fn test_two_wall_center() {
        // South wall y = 0 and north wall y = 4, both facing into the room.
        let south = plane(Vector3::y(), Vector3::zeros());
        let north = plane(-Vector3::y(), Vector3::new(0.0, 4.0, 0.0));
        let center =
            room_center_from_two_walls(&Vector3::new(1.5, 0.0, 1.2), &south, &north).unwrap();
        assert_relative_eq!(center, Vector3::new(1.5, 2.0, 1.2), epsilon = 1e-12);
    }

    #[test]
    fn test_four_wall_center() {
        let x1 = plane(Vector3::x(), Vector3::new(-1.0, 0.0, 0.0));
        let x2 = plane(-Vector3::x(), Vector3::new(5.0, 0.0, 0.0));
        let y1 = plane(Vector3::y(), Vector3::new(0.0, 1.0, 0.0));
        let y2 = plane(-Vector3::y(), Vector3::new(0.0, 3.0, 0.0));
        let center = room_center_from_four_walls(&x1, &x2, &y1, &y2).unwrap();
        assert_relative_eq!(center, Vector3::new(2.0, 2.0, 0.0), epsilon = 1e-9);

        assert!(room_center_from_four_walls(&x1, &x2, &x1, &x2).is_none());
    }

    #[test]
    fn test_one_group_instantiates_room() {
        let mut walls = wall_registry();
        let mut positions = HashMap::new();
        let doors = DoorRegistry::new();
        let mut rooms = RoomAssembler::new(vec![corridor_prior()], RoomConfig::default());

        // Marker 1 only: nothing happens.
        register_walls(
            &mut walls,
            &mut positions,
            &[(1, plane(Vector3::y(), Vector3::zeros()), Vector3::new(1.0, 0.0, 1.0))],
        );
        let update = rooms.update(&seen(&[1]), &walls, &doors, &positions);
        assert!(update.created.is_empty());
        assert_eq!(rooms.status(1), RoomStatus::Unseen);

        register_walls(
            &mut walls,
            &mut positions,
            &[(2, plane(-Vector3::y(), Vector3::new(0.0, 4.0, 0.0)), Vector3::new(3.0, 4.0, 1.0))],
        );
        let update = rooms.update(&seen(&[1, 2]), &walls, &doors, &positions);
        assert_eq!(update.created.len(), 1);
        assert!(update.finalized.is_empty());
        assert_eq!(rooms.status(1), RoomStatus::Instantiated);

        let room = rooms.get(update.created[0]).unwrap();
        assert_eq!(room.walls, vec![WallId::new(0), WallId::new(1)]);
        assert!(!room.all_markers_seen);
        assert_relative_eq!(room.center, Vector3::new(2.0, 2.0, 1.0), epsilon = 1e-9);
    }

    #[test]
    fn test_sighted_group_without_walls_is_partial() {
        let walls = wall_registry();
        let doors = DoorRegistry::new();
        let mut rooms = RoomAssembler::new(vec![corridor_prior()], RoomConfig::default());

        let update = rooms.update(&seen(&[1, 2]), &walls, &doors, &HashMap::new());
        assert_eq!(update.partially_detected, vec![1]);
        assert_eq!(rooms.status(1), RoomStatus::PartiallyDetected);
        assert!(rooms.is_empty());

        // Reported once.
        let update = rooms.update(&seen(&[1, 2]), &walls, &doors, &HashMap::new());
        assert!(update.partially_detected.is_empty());
    }

    #[test]
    fn test_finalization_freezes_center() {
        let mut walls = wall_registry();
        let mut positions = HashMap::new();
        let doors = DoorRegistry::new();
        let mut rooms = RoomAssembler::new(vec![corridor_prior()], RoomConfig::default());

        register_walls(
            &mut walls,
            &mut positions,
            &[
                (1, plane(Vector3::y(), Vector3::zeros()), Vector3::new(0.0, 0.0, 1.0)),
                (2, plane(-Vector3::y(), Vector3::new(0.0, 4.0, 0.0)), Vector3::new(0.0, 4.0, 1.0)),
            ],
        );
        let created = rooms.update(&seen(&[1, 2]), &walls, &doors, &positions).created;
        let id = created[0];

        register_walls(
            &mut walls,
            &mut positions,
            &[
                (3, plane(Vector3::y(), Vector3::new(0.0, 0.0, 0.0)), Vector3::new(10.0, 0.0, 1.0)),
                (4, plane(-Vector3::y(), Vector3::new(0.0, 2.0, 0.0)), Vector3::new(10.0, 2.0, 1.0)),
            ],
        );
        let update = rooms.update(&seen(&[1, 2, 3, 4]), &walls, &doors, &positions);
        assert_eq!(update.finalized, vec![id]);
        assert_eq!(rooms.status(1), RoomStatus::Finalized);

        let room = rooms.get(id).unwrap();
        assert_eq!(room.walls.len(), 4);
        // Mean of the corridor segment centers (0, 2, 1) and (10, 1, 1).
        let frozen = room.center;
        assert_relative_eq!(frozen, Vector3::new(5.0, 1.5, 1.0), epsilon = 1e-9);

        // Later wall refinements no longer move the center.
        walls
            .refine_plane(WallId::new(3), plane(Vector3::y(), Vector3::new(0.0, 0.5, 0.0)))
            .unwrap();
        let update = rooms.update(&seen(&[1, 2, 3, 4]), &walls, &doors, &positions);
        assert!(update.finalized.is_empty());
        assert_eq!(rooms.get(id).unwrap().center, frozen);
    }

    #[test]
    fn test_rewrite_and_reorganize_are_idempotent() {
        let mut walls = wall_registry();
        let mut positions = HashMap::new();
        let doors = DoorRegistry::new();
        let mut rooms = RoomAssembler::new(vec![corridor_prior()], RoomConfig::default());
        register_walls(
            &mut walls,
            &mut positions,
            &[
                (1, plane(Vector3::y(), Vector3::zeros()), Vector3::new(0.0, 0.0, 1.0)),
                (2, plane(-Vector3::y(), Vector3::new(0.0, 4.0, 0.0)), Vector3::new(0.0, 4.0, 1.0)),
            ],
        );
        let id = rooms.update(&seen(&[1, 2]), &walls, &doors, &positions).created[0];

        rooms.rewrite_wall_refs(WallId::new(1), WallId::new(0));
        assert_eq!(rooms.get(id).unwrap().walls, vec![WallId::new(0)]);

        let mut room = rooms.get(id).unwrap().clone();
        reorganize_walls(&mut room, &walls);
        let once = room.walls.clone();
        reorganize_walls(&mut room, &walls);
        assert_eq!(room.walls, once);
        assert_eq!(once, vec![WallId::new(0), WallId::new(1)]);
    }
}
