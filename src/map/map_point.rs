//! MapPoint - A 3D landmark as seen by the semantic layer.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

use super::types::MapPointId;

/// A triangulated map point visible from a keyframe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapPoint {
    /// Identifier assigned by the mapping front-end.
    pub id: MapPointId,

    /// 3D position in world frame.
    pub position: Vector3<f64>,

    /// Set by the front-end for points it considers unreliable.
    /// Outliers never take part in plane fitting.
    pub is_outlier: bool,
}

impl MapPoint {
    /// Create an inlier map point.
    pub fn new(id: MapPointId, position: Vector3<f64>) -> Self {
        Self {
            id,
            position,
            is_outlier: false,
        }
    }
}
