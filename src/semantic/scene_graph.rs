//! SemanticSceneGraph - per-keyframe orchestration of walls, doors and rooms.
//!
//! For each keyframe the graph:
//! 1. Classifies the sighted markers against the prior
//! 2. Estimates a plane for every wall marker and associates it with a wall
//!    (creating, updating or merging walls)
//! 3. Attaches door markers to their host walls
//! 4. Lets the room assembler instantiate, refresh and finalize rooms
//!
//! Imperfect evidence never fails a keyframe: per-marker problems are
//! collected in the returned [`KeyFrameReport`].

use std::collections::{BTreeSet, HashMap, HashSet};

use nalgebra::Vector3;
use tracing::{debug, warn};

use crate::geometry::PlaneEquation;
use crate::map::{KeyFrame, KeyFrameId};
use crate::prior::PriorDatabase;

use super::association::{MarkerAssociationIndex, MarkerClass};
use super::config::{PlaneSource, SemanticConfig};
use super::door::DoorRegistry;
use super::error::{PlaneFitError, SemanticError};
use super::marker::Marker;
use super::plane_estimator::{plane_from_marker_pose, plane_from_points, points_near_location};
use super::room::{RoomAssembler, RoomUpdate};
use super::snapshot::{
    DoorView, GraphSnapshot, LandmarkDescriptor, LandmarkGeometry, OptimizerUpdate, RoomView,
    WallView,
};
use super::types::{DoorId, EntityRef, MarkerId, WallId};
use super::wall::{Association, WallRegistry};

/// What happened while processing one keyframe.
#[derive(Debug, Clone, PartialEq)]
pub struct KeyFrameReport {
    pub keyframe: KeyFrameId,
    pub walls_created: Vec<WallId>,
    pub walls_updated: Vec<WallId>,
    /// `(absorbed, survivor)` pairs.
    pub walls_merged: Vec<(WallId, WallId)>,
    pub doors_attached: Vec<DoorId>,
    pub rooms: RoomUpdate,
    /// Markers skipped this keyframe and references found stale.
    pub skipped: Vec<SemanticError>,
}

impl KeyFrameReport {
    fn new(keyframe: KeyFrameId) -> Self {
        Self {
            keyframe,
            walls_created: Vec::new(),
            walls_updated: Vec::new(),
            walls_merged: Vec::new(),
            doors_attached: Vec::new(),
            rooms: RoomUpdate::default(),
            skipped: Vec::new(),
        }
    }
}

/// The semantic scene graph, owned by a single worker.
pub struct SemanticSceneGraph {
    config: SemanticConfig,
    index: MarkerAssociationIndex,
    walls: WallRegistry,
    doors: DoorRegistry,
    rooms: RoomAssembler,

    /// Every wall or door marker sighted so far.
    seen_markers: BTreeSet<MarkerId>,

    /// Last sighted position of each wall or door marker.
    marker_positions: HashMap<MarkerId, Vector3<f64>>,

    /// Unregistered markers already reported.
    reported_unknown: HashSet<MarkerId>,

    keyframes_processed: u64,
}

impl SemanticSceneGraph {
    pub fn new(prior: &PriorDatabase, config: SemanticConfig) -> Self {
        let index =
            MarkerAssociationIndex::new(prior, config.association.unregistered_markers_are_walls);
        Self {
            index,
            walls: WallRegistry::new(config.association.clone(), config.plane_fit.clone()),
            doors: DoorRegistry::new(),
            rooms: RoomAssembler::new(prior.rooms.clone(), config.room.clone()),
            seen_markers: BTreeSet::new(),
            marker_positions: HashMap::new(),
            reported_unknown: HashSet::new(),
            keyframes_processed: 0,
            config,
        }
    }

    pub fn walls(&self) -> &WallRegistry {
        &self.walls
    }

    pub fn doors(&self) -> &DoorRegistry {
        &self.doors
    }

    pub fn rooms(&self) -> &RoomAssembler {
        &self.rooms
    }

    pub fn keyframes_processed(&self) -> u64 {
        self.keyframes_processed
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Keyframe processing
    // ─────────────────────────────────────────────────────────────────────────

    /// Integrate one keyframe and the marker sightings nearest to it.
    pub fn process_keyframe(&mut self, keyframe: &KeyFrame, markers: &[Marker]) -> KeyFrameReport {
        let mut report = KeyFrameReport::new(keyframe.id);

        let mut sorted: Vec<&Marker> = markers.iter().collect();
        sorted.sort_by_key(|m| m.id);

        let mut door_markers: Vec<&Marker> = Vec::new();
        for marker in sorted {
            let class = self.index.classify(marker.id);
            if class == MarkerClass::Unregistered {
                if self.reported_unknown.insert(marker.id) {
                    warn!("Marker {} is not in the prior database, ignoring it", marker.id);
                    report.skipped.push(SemanticError::UnknownMarker(marker.id));
                }
                continue;
            }

            self.seen_markers.insert(marker.id);
            self.marker_positions.insert(marker.id, marker.position());

            if class.is_wall() {
                self.process_wall_marker(marker, keyframe, &mut report);
            }
            if DoorRegistry::is_door_marker(marker.id, &self.index) {
                door_markers.push(marker);
            }
        }

        // Doors after walls, so a door and its wall may appear in the same keyframe.
        let tolerance = self.config.association.door_wall_tolerance;
        for marker in door_markers {
            let name = self.index.door_name(marker.id).unwrap_or_default();
            let id = self
                .doors
                .attach(marker, name, &self.walls, tolerance, keyframe.id);
            report.doors_attached.push(id);
        }
        report
            .skipped
            .extend(self.doors.refresh_hosts(&self.walls, tolerance));

        report.rooms = self.rooms.update(
            &self.seen_markers,
            &self.walls,
            &self.doors,
            &self.marker_positions,
        );

        self.keyframes_processed += 1;
        debug!(
            "{}: walls +{} ~{} merged {}, doors {}, rooms +{} finalized {}, skipped {}",
            keyframe.id,
            report.walls_created.len(),
            report.walls_updated.len(),
            report.walls_merged.len(),
            report.doors_attached.len(),
            report.rooms.created.len(),
            report.rooms.finalized.len(),
            report.skipped.len()
        );
        report
    }

    fn process_wall_marker(&mut self, marker: &Marker, keyframe: &KeyFrame, report: &mut KeyFrameReport) {
        let candidate = match self.estimate_plane(marker, keyframe) {
            Ok(plane) => plane,
            Err(e) => {
                debug!("{}", e);
                report.skipped.push(e);
                return;
            }
        };

        let target = match (self.walls.wall_for_marker(marker.id), self.walls.associate(&candidate)) {
            // A sighting closer to another wall only merges the two when their
            // planes coincide; otherwise the marker stays on its own wall.
            (Some(owned), Association::Matched(other))
                if other != owned && self.walls.find_merge_candidate(owned) == Some(other) =>
            {
                match self.merge(owned, other, report) {
                    Some(survivor) => survivor,
                    None => owned,
                }
            }
            (Some(owned), _) => owned,
            (None, Association::Matched(id)) => id,
            (None, Association::NoMatch) => {
                let id = self.walls.create_wall(candidate, marker, keyframe);
                report.walls_created.push(id);
                self.merge_coincident(id, report);
                return;
            }
        };

        match self.walls.update_wall(target, marker, keyframe) {
            Ok(_) => report.walls_updated.push(target),
            Err(e) => {
                report.skipped.push(e);
                return;
            }
        }
        self.merge_coincident(target, report);
    }

    /// Candidate plane for a wall marker, oriented toward the observing camera.
    pub fn estimate_plane(&self, marker: &Marker, keyframe: &KeyFrame) -> Result<PlaneEquation, SemanticError> {
        let marker_plane = plane_from_marker_pose(&marker.pose, &keyframe.camera_center());
        let fit_config = &self.config.plane_fit;

        match fit_config.source {
            PlaneSource::MarkerPose => Ok(marker_plane),
            PlaneSource::MapPoints => {
                let local = points_near_location(
                    keyframe.inlier_points(),
                    &marker.position(),
                    fit_config.local_radius,
                    fit_config.max_local_points,
                );
                let positions: Vec<Vector3<f64>> = local.iter().map(|mp| mp.position).collect();

                let fit = plane_from_points(&positions, fit_config).map_err(|source| {
                    SemanticError::InsufficientSupport {
                        marker: marker.id,
                        source,
                    }
                })?;

                // The points must describe the surface the marker is mounted on.
                let plane = fit.plane.aligned_with(&marker_plane.normal());
                let association = &self.config.association;
                if plane.angle_to(&marker_plane) > association.max_normal_angle_rad()
                    || plane.distance(&marker.position()) > association.max_offset_diff
                {
                    return Err(SemanticError::InsufficientSupport {
                        marker: marker.id,
                        source: PlaneFitError::InsufficientSupport {
                            points: positions.len(),
                            inliers: 0,
                        },
                    });
                }
                Ok(plane)
            }
        }
    }

    /// Merge two walls and rewrite every door and room reference.
    fn merge(&mut self, a: WallId, b: WallId, report: &mut KeyFrameReport) -> Option<WallId> {
        let survivor = match self.walls.merge_walls(a, b) {
            Ok(id) => id,
            Err(e) => {
                report.skipped.push(e);
                return None;
            }
        };
        let absorbed = if survivor == a { b } else { a };

        self.doors.rewrite_wall_refs(absorbed, survivor);
        self.rooms.rewrite_wall_refs(absorbed, survivor);
        report.walls_merged.push((absorbed, survivor));
        Some(survivor)
    }

    /// Merge `id` with every other wall that now coincides with it.
    fn merge_coincident(&mut self, id: WallId, report: &mut KeyFrameReport) {
        let mut current = id;
        while let Some(other) = self.walls.find_merge_candidate(current) {
            match self.merge(current, other, report) {
                Some(survivor) => current = survivor,
                None => break,
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Publication
    // ─────────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> GraphSnapshot {
        let walls = self
            .walls
            .walls()
            .map(|wall| WallView {
                id: wall.id,
                local_opt_id: wall.opt_ids.local_or_unassigned(),
                global_opt_id: wall.opt_ids.global_or_unassigned(),
                plane: wall.plane,
                markers: wall.markers.iter().copied().collect(),
                support: wall.support,
            })
            .collect();

        let doors = self
            .doors
            .doors()
            .map(|door| DoorView {
                id: door.id,
                local_opt_id: door.opt_ids.local_or_unassigned(),
                global_opt_id: door.opt_ids.global_or_unassigned(),
                name: door.name.clone(),
                marker_id: door.marker_id,
                position: door.position(),
                host_wall: door.host_wall.and_then(|w| self.walls.resolve_id(w)),
            })
            .collect();

        let rooms = self
            .rooms
            .rooms()
            .map(|room| {
                let mut walls: Vec<WallId> = Vec::new();
                for wall in room.walls.iter().filter_map(|w| self.walls.resolve_id(*w)) {
                    if !walls.contains(&wall) {
                        walls.push(wall);
                    }
                }
                RoomView {
                    id: room.id,
                    local_opt_id: room.opt_ids.local_or_unassigned(),
                    global_opt_id: room.opt_ids.global_or_unassigned(),
                    prior_id: room.prior_id,
                    name: room.name.clone(),
                    walls,
                    doors: room.doors.clone(),
                    center: room.center,
                    all_markers_seen: room.all_markers_seen,
                    status: room.status(),
                }
            })
            .collect();

        GraphSnapshot {
            keyframes_processed: self.keyframes_processed,
            walls,
            doors,
            rooms,
        }
    }

    /// One landmark per wall (plane), door (point) and room (center point).
    pub fn landmarks(&self) -> Vec<LandmarkDescriptor> {
        let walls = self.walls.walls().map(|wall| {
            LandmarkDescriptor::new(
                EntityRef::Wall(wall.id),
                wall.opt_ids,
                LandmarkGeometry::Plane(wall.plane.coefficients()),
            )
        });
        let doors = self.doors.doors().map(|door| {
            LandmarkDescriptor::new(
                EntityRef::Door(door.id),
                door.opt_ids,
                LandmarkGeometry::Point(door.position()),
            )
        });
        let rooms = self.rooms.rooms().map(|room| {
            LandmarkDescriptor::new(
                EntityRef::Room(room.id),
                room.opt_ids,
                LandmarkGeometry::Point(room.center),
            )
        });
        walls.chain(doors).chain(rooms).collect()
    }

    /// Apply feedback from the optimizer.
    pub fn apply_optimizer_update(&mut self, update: OptimizerUpdate) -> Result<(), SemanticError> {
        match update {
            OptimizerUpdate::AssignIds { entity, ids } => match entity {
                EntityRef::Wall(id) => self.walls.set_optimizer_ids(id, ids),
                EntityRef::Door(id) => self.doors.set_optimizer_ids(id, ids),
                EntityRef::Room(id) => self.rooms.set_optimizer_ids(id, ids),
            },
            OptimizerUpdate::RefineWallPlane { wall, plane } => self.walls.refine_plane(wall, plane),
        }
    }
}
