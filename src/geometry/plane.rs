//! Plane equations in Hessian normal form.
//!
//! A plane is stored as `n · x + d = 0` with `|n| = 1`. The sign of the
//! pair `(n, d)` is meaningful for wall association: two observations of
//! the same wall only compare equal when their normals point to the same
//! side, see [`PlaneEquation::canonicalized_toward`].

use nalgebra::{Unit, Vector3, Vector4};
use serde::Serialize;

/// Normals shorter than this are rejected as degenerate.
const MIN_NORMAL_NORM: f64 = 1e-9;

/// Plane `normal · x + offset = 0` with a unit-length normal.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PlaneEquation {
    normal: Vector3<f64>,
    offset: f64,
}

impl PlaneEquation {
    /// Build from (not necessarily unit) coefficients `a x + b y + c z + d = 0`.
    ///
    /// Returns `None` when the normal is degenerate.
    pub fn new(normal: Vector3<f64>, offset: f64) -> Option<Self> {
        let norm = normal.norm();
        if !norm.is_finite() || norm < MIN_NORMAL_NORM || !offset.is_finite() {
            return None;
        }
        Some(Self {
            normal: normal / norm,
            offset: offset / norm,
        })
    }

    /// Plane through `point` with the given normal direction.
    pub fn from_normal_and_point(normal: Vector3<f64>, point: &Vector3<f64>) -> Option<Self> {
        let norm = normal.norm();
        if !norm.is_finite() || norm < MIN_NORMAL_NORM {
            return None;
        }
        let unit = normal / norm;
        Some(Self {
            normal: unit,
            offset: -unit.dot(point),
        })
    }

    /// Plane through `point` with an already normalized normal.
    pub fn from_unit_normal_and_point(normal: &Unit<Vector3<f64>>, point: &Vector3<f64>) -> Self {
        Self {
            normal: normal.into_inner(),
            offset: -normal.dot(point),
        }
    }

    /// Plane through three points, `None` if they are (nearly) collinear.
    pub fn from_points(a: &Vector3<f64>, b: &Vector3<f64>, c: &Vector3<f64>) -> Option<Self> {
        let normal = (b - a).cross(&(c - a));
        Self::from_normal_and_point(normal, a)
    }

    pub fn normal(&self) -> Vector3<f64> {
        self.normal
    }

    pub fn offset(&self) -> f64 {
        self.offset
    }

    /// Coefficients `[a, b, c, d]` as consumed by plane landmarks in the optimizer.
    pub fn coefficients(&self) -> Vector4<f64> {
        Vector4::new(self.normal.x, self.normal.y, self.normal.z, self.offset)
    }

    /// Signed perpendicular distance, positive on the side the normal points to.
    pub fn signed_distance(&self, point: &Vector3<f64>) -> f64 {
        self.normal.dot(point) + self.offset
    }

    /// Unsigned perpendicular distance.
    pub fn distance(&self, point: &Vector3<f64>) -> f64 {
        self.signed_distance(point).abs()
    }

    /// Orthogonal projection of `point` onto the plane.
    pub fn project(&self, point: &Vector3<f64>) -> Vector3<f64> {
        point - self.normal * self.signed_distance(point)
    }

    /// Same plane with the opposite orientation.
    pub fn flipped(&self) -> Self {
        Self {
            normal: -self.normal,
            offset: -self.offset,
        }
    }

    /// Orient the plane so that `viewpoint` lies on its positive side.
    ///
    /// A viewpoint lying exactly on the plane leaves the orientation unchanged.
    pub fn canonicalized_toward(&self, viewpoint: &Vector3<f64>) -> Self {
        if self.signed_distance(viewpoint) < 0.0 {
            self.flipped()
        } else {
            *self
        }
    }

    /// Orient the plane so that its offset is non-negative.
    ///
    /// Used when no viewpoint is available (raw fits).
    pub fn with_non_negative_offset(&self) -> Self {
        if self.offset < 0.0 { self.flipped() } else { *self }
    }

    /// Orient the plane so its normal agrees with `reference` (non-negative dot product).
    pub fn aligned_with(&self, reference: &Vector3<f64>) -> Self {
        if self.normal.dot(reference) < 0.0 {
            self.flipped()
        } else {
            *self
        }
    }

    /// Angle between the two oriented normals in radians, in `[0, π]`.
    pub fn angle_to(&self, other: &PlaneEquation) -> f64 {
        self.normal.dot(&other.normal).clamp(-1.0, 1.0).acos()
    }
}
