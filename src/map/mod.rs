//! Map module - the keyframe snapshots handed over by the front-end.
//!
//! The tracking/mapping pipeline owns the real map. The semantic layer only
//! ever sees immutable per-keyframe snapshots:
//! - [`KeyFrame`] - pose, timestamp and the map points visible from it
//! - [`MapPoint`] - a triangulated 3D landmark with an outlier flag
//!
//! Snapshots are shared as `Arc<KeyFrame>` so the semantic worker never
//! observes a keyframe being modified while it processes it.

pub mod keyframe;
pub mod map_point;
pub mod types;

pub use keyframe::KeyFrame;
pub use map_point::MapPoint;
pub use types::{KeyFrameId, MapPointId};
