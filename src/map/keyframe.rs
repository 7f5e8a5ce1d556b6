//! KeyFrame - immutable per-keyframe snapshot consumed by the semantic layer.

use nalgebra::Vector3;

use crate::geometry::SE3;

use super::map_point::MapPoint;
use super::types::KeyFrameId;

/// A keyframe with its pose and the map points visible from it.
#[derive(Debug, Clone)]
pub struct KeyFrame {
    /// Unique identifier for this KeyFrame.
    pub id: KeyFrameId,

    /// Timestamp in nanoseconds.
    pub timestamp_ns: u64,

    /// Pose: transform from camera to world (T_wc).
    pub pose: SE3,

    /// Map points visible from this keyframe, including flagged outliers.
    pub map_points: Vec<MapPoint>,
}

impl KeyFrame {
    pub fn new(id: KeyFrameId, timestamp_ns: u64, pose: SE3, map_points: Vec<MapPoint>) -> Self {
        Self {
            id,
            timestamp_ns,
            pose,
            map_points,
        }
    }

    /// Camera centre in world frame.
    pub fn camera_center(&self) -> Vector3<f64> {
        self.pose.translation
    }

    /// Visible map points not flagged as outliers.
    pub fn inlier_points(&self) -> impl Iterator<Item = &MapPoint> {
        self.map_points.iter().filter(|mp| !mp.is_outlier)
    }
}
