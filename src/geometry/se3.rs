//! SE3: 6-DOF rigid body transformation (rotation + translation).
//!
//! Used for camera poses (T_wc) and fiducial marker poses (T_wm).
//! A marker's local +Z axis is its forward axis: it points out of the
//! printed face, toward the side the marker can be observed from.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Rigid transformation: p' = R * p + t.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    /// Identity transformation.
    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Construct from quaternion (w, x, y, z) and translation.
    ///
    /// The quaternion is normalized, so slightly denormalized input
    /// (e.g. parsed from text with limited precision) is accepted.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, translation: Vector3<f64>) -> Self {
        let rotation = UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(qw, qx, qy, qz));
        Self {
            rotation,
            translation,
        }
    }

    /// Construct from an axis-angle rotation vector and translation.
    pub fn from_axis_angle(axis_angle: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::from_scaled_axis(axis_angle),
            translation,
        }
    }

    /// Compose two transforms: self ∘ other.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    /// The local +Z axis expressed in the parent frame.
    ///
    /// For a marker pose this is the marker's forward axis; for a camera
    /// pose (camera convention) it is the optical axis.
    pub fn forward_axis(&self) -> Vector3<f64> {
        self.rotation * Vector3::z()
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}
