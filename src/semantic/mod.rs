//! Semantic scene graph: walls, doors and rooms built from fiducial markers
//! and map points.

pub mod association;
pub mod config;
pub mod door;
pub mod error;
pub mod marker;
pub mod plane_estimator;
pub mod room;
pub mod scene_graph;
pub mod snapshot;
pub mod types;
pub mod wall;

pub use association::{MarkerAssociationIndex, MarkerClass};
pub use config::{PlaneSource, SemanticConfig};
pub use error::{PlaneFitError, SemanticError};
pub use marker::{Marker, MarkerBuffer};
pub use room::RoomStatus;
pub use scene_graph::{KeyFrameReport, SemanticSceneGraph};
pub use snapshot::{GraphSnapshot, LandmarkDescriptor, LandmarkGeometry, OptimizerUpdate};
pub use types::{DoorId, EntityRef, MarkerId, OptimizerIds, RoomId, WallId};
