//! Configuration for the semantic scene graph.
//!
//! Every section has sensible defaults; a YAML file may override any subset
//! of fields:
//!
//! ```yaml
//! plane_fit:
//!   source: marker_pose
//! worker:
//!   keyframe_queue_capacity: 8
//! ```

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How a candidate plane is derived for a wall marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaneSource {
    /// Plane taken directly from the marker pose (forward axis as normal).
    MarkerPose,
    /// RANSAC fit over map points around the marker, checked against the marker pose.
    MapPoints,
}

/// Configuration for plane estimation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneFitConfig {
    /// Which estimator provides candidate planes for wall markers.
    pub source: PlaneSource,

    /// Maximum number of RANSAC iterations.
    pub max_iterations: usize,

    /// Perpendicular distance (meters) under which a point is an inlier.
    pub inlier_threshold: f64,

    /// Minimum number of points (and inliers) for a valid fit.
    pub min_points: usize,

    /// Minimum fraction of the input points the best plane must explain.
    pub min_inlier_ratio: f64,

    /// Maximum number of total-least-squares refinement passes.
    pub max_refinement_passes: usize,

    /// Radius (meters) of the point neighbourhood gathered around a marker.
    pub local_radius: f64,

    /// Cap on the neighbourhood size, nearest points first.
    pub max_local_points: usize,

    /// Cap on the map points a wall keeps as support; the oldest are evicted first.
    pub max_support_points: usize,

    /// RNG seed; identical input always yields the identical fit.
    pub seed: u64,
}

impl Default for PlaneFitConfig {
    fn default() -> Self {
        Self {
            source: PlaneSource::MapPoints,
            max_iterations: 200,
            inlier_threshold: 0.03,
            min_points: 3,
            min_inlier_ratio: 0.5,
            max_refinement_passes: 5,
            local_radius: 1.0,
            max_local_points: 500,
            max_support_points: 1000,
            seed: 0x5eed,
        }
    }
}

/// Configuration for wall association and door attachment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AssociationConfig {
    /// Maximum angle (degrees) between oriented normals of matching planes.
    pub max_normal_angle_deg: f64,

    /// Maximum difference (meters) between plane offsets of matching planes.
    pub max_offset_diff: f64,

    /// Distance (meters) under which a map point counts as lying on a wall.
    pub point_on_plane_tolerance: f64,

    /// Distance (meters) under which a door marker counts as embedded in a wall.
    pub door_wall_tolerance: f64,

    /// Treat markers missing from the prior as wall markers instead of ignoring them.
    pub unregistered_markers_are_walls: bool,
}

impl Default for AssociationConfig {
    fn default() -> Self {
        Self {
            max_normal_angle_deg: 10.0,
            max_offset_diff: 0.2,
            point_on_plane_tolerance: 0.05,
            door_wall_tolerance: 0.15,
            unregistered_markers_are_walls: false,
        }
    }
}

impl AssociationConfig {
    pub fn max_normal_angle_rad(&self) -> f64 {
        self.max_normal_angle_deg.to_radians()
    }
}

/// Configuration for room assembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RoomConfig {
    /// Two walls bounding a room from opposite sides are paired when their
    /// (unoriented) normals differ by less than this angle (degrees).
    pub parallel_tolerance_deg: f64,

    /// Two wall pairs span a four-wall room when their normals differ by
    /// at least this angle (degrees).
    pub min_pair_separation_deg: f64,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            parallel_tolerance_deg: 20.0,
            min_pair_separation_deg: 60.0,
        }
    }
}

/// Configuration for the semantic worker thread and its hand-off.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Capacity of the keyframe channel to the semantic worker.
    pub keyframe_queue_capacity: usize,

    /// Backlogged keyframes beyond this count lose their marker sightings.
    pub max_backlog_with_markers: usize,

    /// Number of timestamped sighting sets retained by the marker buffer.
    pub marker_buffer_capacity: usize,

    /// Sightings further than this from a keyframe timestamp are not attached to it.
    pub max_marker_time_offset_ns: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            keyframe_queue_capacity: 5,
            max_backlog_with_markers: 10,
            marker_buffer_capacity: 300,
            max_marker_time_offset_ns: 50_000_000,
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticConfig {
    pub plane_fit: PlaneFitConfig,
    pub association: AssociationConfig,
    pub room: RoomConfig,
    pub worker: WorkerConfig,
}

impl SemanticConfig {
    /// Parse a (possibly partial) YAML configuration.
    pub fn from_yaml_str(contents: &str) -> Result<Self> {
        serde_yaml::from_str(contents).context("Failed to parse semantic configuration")
    }

    /// Load a (possibly partial) YAML configuration file.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).with_context(|| format!("Failed to open config {:?}", path))?;
        serde_yaml::from_reader(file).with_context(|| format!("Failed to parse config {:?}", path))
    }
}
