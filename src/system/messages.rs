//! Inter-thread message types.

use std::sync::Arc;

use crate::map::KeyFrame;
use crate::semantic::Marker;

/// Message sent from the front-end to the semantic worker for every new keyframe.
///
/// The keyframe is an immutable snapshot shared with the front-end; the
/// markers are the sighting set nearest in time to it (possibly empty).
#[derive(Debug, Clone)]
pub struct SemanticKeyFrameMsg {
    pub keyframe: Arc<KeyFrame>,
    pub markers: Vec<Marker>,
}
