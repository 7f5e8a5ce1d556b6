//! Geometry utilities: SE3 transforms and plane equations.

pub mod plane;
pub mod se3;

pub use plane::PlaneEquation;
pub use se3::SE3;
