//! Recoverable error conditions of the semantic layer.
//!
//! None of these is fatal to the pipeline: a degraded scene graph is always
//! an acceptable output. They are collected in per-keyframe reports and
//! logged, never propagated out of keyframe processing.

use thiserror::Error;

use super::types::{EntityRef, MarkerId, WallId};

/// Plane fitting failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlaneFitError {
    /// Too few points, or no candidate plane reached the minimum inlier fraction.
    #[error("insufficient support: {inliers} inliers out of {points} points")]
    InsufficientSupport { points: usize, inliers: usize },
}

/// Conditions reported while building the scene graph.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SemanticError {
    /// The marker could not be turned into a plane this frame; retried on the next sighting.
    #[error("marker {marker} skipped: {source}")]
    InsufficientSupport {
        marker: MarkerId,
        #[source]
        source: PlaneFitError,
    },

    /// A sighted marker is absent from the prior database.
    #[error("marker {0} is not registered in the prior database")]
    UnknownMarker(MarkerId),

    /// An entity points to a wall that no longer resolves (merged away or never created).
    #[error("{entity} references wall {wall} which does not resolve")]
    StaleReference { entity: EntityRef, wall: WallId },

    /// An optimizer update addressed an entity that does not exist.
    #[error("unknown entity {0}")]
    UnknownEntity(EntityRef),
}
