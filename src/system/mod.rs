//! Semantic system orchestration and thread management.
//!
//! This module contains the top-level `SemanticSystem` that spawns and feeds
//! the semantic worker thread, along with shared state and inter-thread
//! messaging types.

pub mod messages;
pub mod shared_state;
mod semantic_system;

pub use messages::SemanticKeyFrameMsg;
pub use semantic_system::SemanticSystem;
pub use shared_state::{PublishedGraph, SharedState};
