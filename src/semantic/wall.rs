//! Walls and the registry that owns them.
//!
//! A wall is an oriented plane backed by one or more wall markers and the
//! map points found lying on it. The registry:
//! - Associates candidate planes with existing walls (normal angle + offset)
//! - Creates walls from unmatched candidates
//! - Accumulates supporting points and refits planes
//! - Merges walls that turn out to be the same surface
//!
//! Merged-away IDs are remembered, so references held elsewhere keep
//! resolving to the surviving wall.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use nalgebra::Vector3;
use tracing::{debug, info};

use crate::geometry::PlaneEquation;
use crate::map::{KeyFrame, KeyFrameId, MapPointId};

use super::config::{AssociationConfig, PlaneFitConfig};
use super::error::SemanticError;
use super::marker::Marker;
use super::plane_estimator::{is_point_on_plane, plane_from_points, points_near_location};
use super::types::{EntityRef, MarkerId, OptimizerIds, WallId};

/// Association scores closer than this are treated as equal.
const SCORE_TIE_EPSILON: f64 = 1e-9;

/// A planar wall of the scene graph.
#[derive(Debug, Clone)]
pub struct Wall {
    pub id: WallId,
    pub opt_ids: OptimizerIds,

    /// Oriented plane, normal pointing to the side the wall was observed from.
    pub plane: PlaneEquation,

    /// Wall markers claiming this wall as their boundary.
    pub markers: BTreeSet<MarkerId>,

    /// Map points found on the wall, at most `max_support_points` of them.
    pub supporting_points: BTreeMap<MapPointId, SupportPoint>,

    /// Inlier count of the last accepted fit over the supporting points.
    pub support: usize,

    pub last_observed: KeyFrameId,
}

/// A map point supporting a wall.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportPoint {
    /// Last known position.
    pub position: Vector3<f64>,
    /// Keyframe the point was last seen on the wall from.
    pub observed: KeyFrameId,
}

/// Outcome of matching a candidate plane against the registered walls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Association {
    Matched(WallId),
    NoMatch,
}

/// Owner of all walls.
pub struct WallRegistry {
    walls: BTreeMap<WallId, Wall>,

    /// Marker → wall that claims it.
    marker_owner: HashMap<MarkerId, WallId>,

    /// Merged-away wall → wall it was merged into.
    superseded: HashMap<WallId, WallId>,

    next_id: u64,

    association: AssociationConfig,
    plane_fit: PlaneFitConfig,
}

impl WallRegistry {
    pub fn new(association: AssociationConfig, plane_fit: PlaneFitConfig) -> Self {
        Self {
            walls: BTreeMap::new(),
            marker_owner: HashMap::new(),
            superseded: HashMap::new(),
            next_id: 0,
            association,
            plane_fit,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lookup
    // ─────────────────────────────────────────────────────────────────────────

    /// Live wall by exact ID (no supersession lookup).
    pub fn get(&self, id: WallId) -> Option<&Wall> {
        self.walls.get(&id)
    }

    /// Follow the supersession chain of `id` to a live wall.
    pub fn resolve_id(&self, id: WallId) -> Option<WallId> {
        let mut current = id;
        // Each merge removes one wall, so a chain is never longer than the number of merges.
        for _ in 0..=self.superseded.len() {
            if self.walls.contains_key(&current) {
                return Some(current);
            }
            current = *self.superseded.get(&current)?;
        }
        None
    }

    pub fn resolve(&self, id: WallId) -> Option<&Wall> {
        self.resolve_id(id).and_then(|id| self.walls.get(&id))
    }

    /// Live walls in ascending ID order.
    pub fn walls(&self) -> impl Iterator<Item = &Wall> {
        self.walls.values()
    }

    pub fn len(&self) -> usize {
        self.walls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.walls.is_empty()
    }

    /// Wall that claims `marker`, if any.
    pub fn wall_for_marker(&self, marker: MarkerId) -> Option<WallId> {
        self.marker_owner
            .get(&marker)
            .and_then(|id| self.resolve_id(*id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Association
    // ─────────────────────────────────────────────────────────────────────────

    /// Combined normalized distance between two oriented planes, `None` when
    /// either the angle or the offset difference exceeds its threshold.
    fn match_score(&self, a: &PlaneEquation, b: &PlaneEquation) -> Option<f64> {
        let max_angle = self.association.max_normal_angle_rad();
        let max_offset = self.association.max_offset_diff;

        let angle = a.angle_to(b);
        let offset_diff = (a.offset() - b.offset()).abs();
        if angle > max_angle || offset_diff > max_offset {
            return None;
        }

        let angle_term = if max_angle > 0.0 { angle / max_angle } else { 0.0 };
        let offset_term = if max_offset > 0.0 { offset_diff / max_offset } else { 0.0 };
        Some(angle_term + offset_term)
    }

    /// Best-scoring wall among `candidates`; near-equal scores go to the lowest ID.
    fn best_match<'a>(
        &self,
        plane: &PlaneEquation,
        candidates: impl Iterator<Item = &'a Wall>,
    ) -> Option<WallId> {
        let mut best: Option<(WallId, f64)> = None;
        let mut ambiguous = false;

        for wall in candidates {
            let Some(score) = self.match_score(plane, &wall.plane) else {
                continue;
            };
            match best {
                None => best = Some((wall.id, score)),
                Some((_, best_score)) if score < best_score - SCORE_TIE_EPSILON => {
                    ambiguous = false;
                    best = Some((wall.id, score));
                }
                Some((_, best_score)) if (score - best_score).abs() <= SCORE_TIE_EPSILON => {
                    ambiguous = true;
                }
                Some(_) => {}
            }
        }

        if ambiguous {
            if let Some((id, score)) = best {
                debug!("Ambiguous wall association (score {:.3}), choosing {}", score, id);
            }
        }
        best.map(|(id, _)| id)
    }

    /// Match a candidate plane against all walls.
    pub fn associate(&self, candidate: &PlaneEquation) -> Association {
        match self.best_match(candidate, self.walls.values()) {
            Some(id) => Association::Matched(id),
            None => Association::NoMatch,
        }
    }

    /// Another wall whose plane coincides with the plane of `id`.
    pub fn find_merge_candidate(&self, id: WallId) -> Option<WallId> {
        let id = self.resolve_id(id)?;
        let wall = self.walls.get(&id)?;
        self.best_match(&wall.plane, self.walls.values().filter(|w| w.id != id))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Creation and update
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a new wall for `marker` with the given plane.
    pub fn create_wall(
        &mut self,
        plane: PlaneEquation,
        marker: &Marker,
        keyframe: &KeyFrame,
    ) -> WallId {
        let id = WallId::new(self.next_id);
        self.next_id += 1;
        self.claim_marker(id, marker.id);

        let mut wall = Wall {
            id,
            opt_ids: OptimizerIds::unassigned(),
            plane,
            markers: BTreeSet::from([marker.id]),
            supporting_points: BTreeMap::new(),
            support: 0,
            last_observed: keyframe.id,
        };
        self.collect_points(&mut wall, marker, keyframe);
        refit(&mut wall, &self.plane_fit, self.association.max_normal_angle_rad());
        let plane = wall.plane;
        self.walls.insert(id, wall);

        info!(
            "Created wall {} from marker {} (normal [{:.2}, {:.2}, {:.2}], offset {:.2})",
            id,
            marker.id,
            plane.normal().x,
            plane.normal().y,
            plane.normal().z,
            plane.offset()
        );
        id
    }

    /// Add a new sighting of `marker` to wall `id`: claim the marker, gather the
    /// on-plane points around it and refit.
    ///
    /// Returns whether the plane was refined.
    pub fn update_wall(
        &mut self,
        id: WallId,
        marker: &Marker,
        keyframe: &KeyFrame,
    ) -> Result<bool, SemanticError> {
        let id = self
            .resolve_id(id)
            .ok_or(SemanticError::UnknownEntity(EntityRef::Wall(id)))?;
        self.claim_marker(id, marker.id);

        let Some(mut wall) = self.walls.remove(&id) else {
            return Err(SemanticError::UnknownEntity(EntityRef::Wall(id)));
        };
        wall.markers.insert(marker.id);
        wall.last_observed = keyframe.id;
        self.collect_points(&mut wall, marker, keyframe);
        let refined = refit(&mut wall, &self.plane_fit, self.association.max_normal_angle_rad());
        self.walls.insert(id, wall);

        Ok(refined)
    }

    /// Make `wall` the only owner of `marker`.
    fn claim_marker(&mut self, wall: WallId, marker: MarkerId) {
        if let Some(previous) = self.wall_for_marker(marker) {
            if previous != wall {
                if let Some(other) = self.walls.get_mut(&previous) {
                    other.markers.remove(&marker);
                }
            }
        }
        self.marker_owner.insert(marker, wall);
    }

    /// Add the keyframe's points near `marker` that lie on the wall surface.
    ///
    /// The local neighbourhood is fitted first: when that surface agrees with
    /// the wall (association thresholds), its inliers are taken even if they
    /// sit off the current plane. Otherwise points are tested against the
    /// wall plane directly.
    fn collect_points(&self, wall: &mut Wall, marker: &Marker, keyframe: &KeyFrame) {
        let near = points_near_location(
            keyframe.inlier_points(),
            &marker.position(),
            self.plane_fit.local_radius,
            self.plane_fit.max_local_points,
        );
        let positions: Vec<Vector3<f64>> = near.iter().map(|mp| mp.position).collect();

        let local_inliers = plane_from_points(&positions, &self.plane_fit)
            .ok()
            .filter(|fit| self.match_score(&fit.plane.aligned_with(&wall.plane.normal()), &wall.plane).is_some())
            .map(|fit| fit.inliers);

        for (i, mp) in near.iter().enumerate() {
            let on_surface = match &local_inliers {
                Some(inliers) => inliers.binary_search(&i).is_ok(),
                None => is_point_on_plane(
                    &wall.plane,
                    &mp.position,
                    self.association.point_on_plane_tolerance,
                ),
            };
            if on_surface {
                wall.supporting_points.insert(
                    mp.id,
                    SupportPoint {
                        position: mp.position,
                        observed: keyframe.id,
                    },
                );
            }
        }
        cap_support(wall, &self.plane_fit);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Merging
    // ─────────────────────────────────────────────────────────────────────────

    /// Coalesce two walls. The one with larger support survives (ties: lower ID);
    /// the other is removed and recorded as superseded.
    pub fn merge_walls(&mut self, a: WallId, b: WallId) -> Result<WallId, SemanticError> {
        let a = self
            .resolve_id(a)
            .ok_or(SemanticError::UnknownEntity(EntityRef::Wall(a)))?;
        let b = self
            .resolve_id(b)
            .ok_or(SemanticError::UnknownEntity(EntityRef::Wall(b)))?;
        if a == b {
            return Ok(a);
        }

        let support_of = |id: WallId| self.walls.get(&id).map_or(0, |w| w.support);
        let (survivor_id, absorbed_id) = match support_of(a).cmp(&support_of(b)) {
            Ordering::Greater => (a, b),
            Ordering::Less => (b, a),
            Ordering::Equal => (a.min(b), a.max(b)),
        };

        let Some(absorbed) = self.walls.remove(&absorbed_id) else {
            return Err(SemanticError::UnknownEntity(EntityRef::Wall(absorbed_id)));
        };
        let max_angle = self.association.max_normal_angle_rad();
        let Some(survivor) = self.walls.get_mut(&survivor_id) else {
            return Err(SemanticError::UnknownEntity(EntityRef::Wall(survivor_id)));
        };

        survivor.markers.extend(absorbed.markers.iter().copied());
        for (mp_id, point) in &absorbed.supporting_points {
            survivor
                .supporting_points
                .entry(*mp_id)
                .and_modify(|kept| {
                    if point.observed > kept.observed {
                        *kept = *point;
                    }
                })
                .or_insert(*point);
        }
        cap_support(survivor, &self.plane_fit);
        survivor.last_observed = survivor.last_observed.max(absorbed.last_observed);
        if survivor.opt_ids.local.is_none() {
            survivor.opt_ids.local = absorbed.opt_ids.local;
        }
        if survivor.opt_ids.global.is_none() {
            survivor.opt_ids.global = absorbed.opt_ids.global;
        }
        refit(survivor, &self.plane_fit, max_angle);

        for marker in &absorbed.markers {
            self.marker_owner.insert(*marker, survivor_id);
        }
        self.superseded.insert(absorbed_id, survivor_id);

        info!("Merged wall {} into wall {}", absorbed_id, survivor_id);
        Ok(survivor_id)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Optimizer write-back
    // ─────────────────────────────────────────────────────────────────────────

    pub fn set_optimizer_ids(&mut self, id: WallId, ids: OptimizerIds) -> Result<(), SemanticError> {
        let wall = self.resolve_mut(id)?;
        wall.opt_ids = ids;
        Ok(())
    }

    /// Replace the plane of a wall with an optimized estimate, keeping the
    /// wall's orientation convention.
    pub fn refine_plane(&mut self, id: WallId, plane: PlaneEquation) -> Result<(), SemanticError> {
        let wall = self.resolve_mut(id)?;
        wall.plane = plane.aligned_with(&wall.plane.normal());
        Ok(())
    }

    fn resolve_mut(&mut self, id: WallId) -> Result<&mut Wall, SemanticError> {
        let resolved = self
            .resolve_id(id)
            .ok_or(SemanticError::UnknownEntity(EntityRef::Wall(id)))?;
        self.walls
            .get_mut(&resolved)
            .ok_or(SemanticError::UnknownEntity(EntityRef::Wall(id)))
    }
}

/// Evict the oldest supporting points (farthest from the plane first among
/// equally old ones) until at most `max_support_points` remain.
fn cap_support(wall: &mut Wall, config: &PlaneFitConfig) {
    let excess = wall
        .supporting_points
        .len()
        .saturating_sub(config.max_support_points);
    if excess == 0 {
        return;
    }

    let mut order: Vec<(KeyFrameId, f64, MapPointId)> = wall
        .supporting_points
        .iter()
        .map(|(id, point)| (point.observed, wall.plane.distance(&point.position), *id))
        .collect();
    order.sort_by(|a, b| a.0.cmp(&b.0).then(b.1.total_cmp(&a.1)).then(a.2.cmp(&b.2)));
    for (_, _, id) in order.into_iter().take(excess) {
        wall.supporting_points.remove(&id);
    }

    // Support is measured against the retained points only.
    let retained = wall
        .supporting_points
        .values()
        .filter(|point| is_point_on_plane(&wall.plane, &point.position, config.inlier_threshold))
        .count();
    wall.support = wall.support.min(retained);
    debug!(
        "Wall {}: evicted {} supporting points, {} retained",
        wall.id,
        excess,
        wall.supporting_points.len()
    );
}

/// Refit the wall plane over its supporting points.
///
/// The fit is accepted only if it explains at least as many points as the
/// current plane did and stays within `max_angle` of the current normal.
fn refit(wall: &mut Wall, config: &PlaneFitConfig, max_angle: f64) -> bool {
    if wall.supporting_points.len() < config.min_points.max(3) {
        return false;
    }

    let points: Vec<Vector3<f64>> = wall.supporting_points.values().map(|point| point.position).collect();
    let Ok(fit) = plane_from_points(&points, config) else {
        return false;
    };
    if fit.support() < wall.support {
        return false;
    }

    let refined = fit.plane.aligned_with(&wall.plane.normal());
    if refined.angle_to(&wall.plane) > max_angle {
        debug!("Rejected refit of wall {}: normal moved too far", wall.id);
        return false;
    }

    wall.plane = refined;
    wall.support = fit.support();
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SE3;
    use crate::map::MapPoint;
    use crate::semantic::plane_estimator::{plane_from_marker_pose, raw_plane_from_marker_pose};
    use approx::assert_relative_eq;
    use std::f64::consts::{FRAC_PI_2, PI};

    fn registry() -> WallRegistry {
        WallRegistry::new(AssociationConfig::default(), PlaneFitConfig::default())
    }

    fn empty_keyframe(id: u64) -> KeyFrame {
        KeyFrame::new(KeyFrameId::new(id), id, SE3::identity(), Vec::new())
    }

    /// Marker on the plane x = `x`, facing -X (toward a camera at the origin).
    fn marker_on_x_wall(id: u32, x: f64) -> Marker {
        let pose = SE3::from_axis_angle(Vector3::new(0.0, -FRAC_PI_2, 0.0), Vector3::new(x, 0.0, 1.0));
        Marker::new(MarkerId::new(id), pose, 0)
    }

    fn x_plane(x: f64) -> PlaneEquation {
        PlaneEquation::from_normal_and_point(-Vector3::x(), &Vector3::new(x, 0.0, 0.0)).unwrap()
    }

    /// Keyframe seeing a grid of points on the plane x = `x` around (x, 0, 1).
    fn keyframe_with_x_wall(id: u64, x: f64, first_point: u64) -> KeyFrame {
        let mut points = Vec::new();
        let mut next = first_point;
        for i in 0..5 {
            for j in 0..5 {
                let p = Vector3::new(x, -0.4 + 0.2 * i as f64, 0.6 + 0.2 * j as f64);
                points.push(MapPoint::new(MapPointId::new(next), p));
                next += 1;
            }
        }
        KeyFrame::new(KeyFrameId::new(id), id, SE3::identity(), points)
    }

    #[test]
    fn test_associate_matches_within_thresholds() {
        let mut reg = registry();
        let kf = empty_keyframe(0);
        let id = reg.create_wall(x_plane(2.0), &marker_on_x_wall(1, 2.0), &kf);

        assert_eq!(reg.associate(&x_plane(2.1)), Association::Matched(id));
        assert_eq!(reg.associate(&x_plane(2.5)), Association::NoMatch);
        assert_eq!(reg.associate(&x_plane(2.0).flipped()), Association::NoMatch);
        assert_eq!(reg.wall_for_marker(MarkerId::new(1)), Some(id));
    }

    #[test]
    fn test_association_determinism_on_equidistant_walls() {
        let mut reg = registry();
        let kf = empty_keyframe(0);
        let w0 = reg.create_wall(x_plane(1.0), &marker_on_x_wall(1, 1.0), &kf);
        let _w1 = reg.create_wall(x_plane(1.2), &marker_on_x_wall(2, 1.2), &kf);

        let candidate = x_plane(1.1);
        for _ in 0..5 {
            assert_eq!(reg.associate(&candidate), Association::Matched(w0));
        }
    }

    #[test]
    fn test_canonicalization_enables_association() {
        let mut reg = registry();
        let viewpoint = Vector3::zeros();
        let kf = empty_keyframe(0);

        let marker = marker_on_x_wall(1, 2.0);
        let wall = reg.create_wall(plane_from_marker_pose(&marker.pose, &viewpoint), &marker, &kf);

        // Same wall position, marker rotated 180° about its own Y axis.
        let flipped_pose = marker
            .pose
            .compose(&SE3::from_axis_angle(Vector3::new(0.0, PI, 0.0), Vector3::zeros()));
        let raw_a = raw_plane_from_marker_pose(&marker.pose);
        let raw_b = raw_plane_from_marker_pose(&flipped_pose);
        assert_relative_eq!(raw_a.normal(), -raw_b.normal(), epsilon = 1e-9);

        assert_eq!(reg.associate(&raw_b), Association::NoMatch);
        assert_eq!(
            reg.associate(&plane_from_marker_pose(&flipped_pose, &viewpoint)),
            Association::Matched(wall)
        );
    }

    #[test]
    fn test_update_accumulates_points_and_refits() {
        let mut reg = registry();
        let marker = marker_on_x_wall(1, 2.0);
        // Initial plane slightly off the true surface.
        let initial = x_plane(2.03);
        let id = reg.create_wall(initial, &marker, &keyframe_with_x_wall(0, 2.0, 0));

        let wall = reg.get(id).unwrap();
        assert_eq!(wall.supporting_points.len(), 25);
        assert_eq!(wall.support, 25);
        assert_relative_eq!(wall.plane.offset(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(wall.plane.normal(), -Vector3::x(), epsilon = 1e-9);

        let refined = reg
            .update_wall(id, &marker, &keyframe_with_x_wall(1, 2.0, 100))
            .unwrap();
        assert!(refined);
        let wall = reg.get(id).unwrap();
        assert_eq!(wall.supporting_points.len(), 50);
        assert_eq!(wall.support, 50);
        assert_eq!(wall.last_observed, KeyFrameId::new(1));
    }

    #[test]
    fn test_update_never_regresses_support() {
        let mut reg = registry();
        let marker = marker_on_x_wall(1, 2.0);
        let id = reg.create_wall(x_plane(2.0), &marker, &keyframe_with_x_wall(0, 2.0, 0));
        let before = reg.get(id).unwrap().clone();

        // A keyframe with no points leaves plane and support untouched.
        reg.update_wall(id, &marker, &empty_keyframe(1)).unwrap();
        let after = reg.get(id).unwrap();
        assert_eq!(after.support, before.support);
        assert_eq!(after.plane, before.plane);
    }

    #[test]
    fn test_update_refines_plane_created_off_surface() {
        let mut reg = registry();
        let marker = marker_on_x_wall(1, 2.0);
        // 0.1 m off the true surface, beyond the on-plane tolerance.
        let id = reg.create_wall(x_plane(2.1), &marker, &empty_keyframe(0));
        assert_eq!(reg.get(id).unwrap().support, 0);

        let refined = reg
            .update_wall(id, &marker, &keyframe_with_x_wall(1, 2.0, 0))
            .unwrap();
        assert!(refined);
        let wall = reg.get(id).unwrap();
        assert_eq!(wall.supporting_points.len(), 25);
        assert_eq!(wall.support, 25);
        assert_relative_eq!(wall.plane.offset(), 2.0, epsilon = 1e-9);
        assert_relative_eq!(wall.plane.normal(), -Vector3::x(), epsilon = 1e-9);
    }

    #[test]
    fn test_support_points_capped_oldest_first() {
        let plane_fit = PlaneFitConfig {
            max_support_points: 100,
            ..PlaneFitConfig::default()
        };
        let mut reg = WallRegistry::new(AssociationConfig::default(), plane_fit);
        let marker = marker_on_x_wall(1, 2.0);
        let id = reg.create_wall(x_plane(2.0), &marker, &keyframe_with_x_wall(0, 2.0, 0));

        for kf in 1..60 {
            reg.update_wall(id, &marker, &keyframe_with_x_wall(kf, 2.0, kf * 100))
                .unwrap();
        }

        let wall = reg.get(id).unwrap();
        assert_eq!(wall.supporting_points.len(), 100);
        assert!(
            wall.supporting_points
                .values()
                .all(|point| point.observed >= KeyFrameId::new(56))
        );
        assert_eq!(wall.support, 100);
        assert_relative_eq!(wall.plane.offset(), 2.0, epsilon = 1e-9);
    }

    #[test]
    fn test_merge_keeps_larger_support_and_redirects() {
        let mut reg = registry();
        let small = reg.create_wall(x_plane(1.0), &marker_on_x_wall(1, 1.0), &empty_keyframe(0));
        let large = reg.create_wall(
            x_plane(1.05),
            &marker_on_x_wall(2, 1.05),
            &keyframe_with_x_wall(1, 1.05, 0),
        );
        assert!(reg.get(large).unwrap().support > 0);

        assert_eq!(reg.find_merge_candidate(small), Some(large));
        let survivor = reg.merge_walls(small, large).unwrap();
        assert_eq!(survivor, large);

        assert_eq!(reg.len(), 1);
        assert!(reg.get(small).is_none());
        assert_eq!(reg.resolve_id(small), Some(large));
        assert_eq!(reg.wall_for_marker(MarkerId::new(1)), Some(large));
        let wall = reg.resolve(small).unwrap();
        assert!(wall.markers.contains(&MarkerId::new(1)));
        assert!(wall.markers.contains(&MarkerId::new(2)));
    }

    #[test]
    fn test_merge_tie_keeps_lower_id_and_adopts_optimizer_ids() {
        let mut reg = registry();
        let kf = empty_keyframe(0);
        let a = reg.create_wall(x_plane(1.0), &marker_on_x_wall(1, 1.0), &kf);
        let b = reg.create_wall(x_plane(1.1), &marker_on_x_wall(2, 1.1), &kf);
        reg.set_optimizer_ids(
            b,
            OptimizerIds {
                local: Some(7),
                global: Some(8),
            },
        )
        .unwrap();

        assert_eq!(reg.merge_walls(b, a).unwrap(), a);
        let survivor = reg.get(a).unwrap();
        assert_eq!(survivor.opt_ids.local, Some(7));
        assert_eq!(survivor.opt_ids.global, Some(8));

        // Stale ID still resolves for write-back.
        reg.refine_plane(b, x_plane(1.02).flipped()).unwrap();
        assert_relative_eq!(reg.get(a).unwrap().plane.normal(), -Vector3::x(), epsilon = 1e-12);
        assert_relative_eq!(reg.get(a).unwrap().plane.offset(), 1.02, epsilon = 1e-12);
    }

    #[test]
    fn test_unknown_wall_errors() {
        let mut reg = registry();
        let err = reg
            .set_optimizer_ids(WallId::new(42), OptimizerIds::unassigned())
            .unwrap_err();
        assert_eq!(err, SemanticError::UnknownEntity(EntityRef::Wall(WallId::new(42))));
        assert!(reg.merge_walls(WallId::new(0), WallId::new(1)).is_err());
    }
}
