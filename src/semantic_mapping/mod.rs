//! Semantic mapping thread.
//!
//! The worker receives keyframes from the front-end and:
//! - Integrates them into the semantic scene graph
//! - Applies optimizer feedback between keyframes
//! - Publishes the graph snapshot and landmarks to the shared state

mod semantic_worker;

pub use semantic_worker::SemanticWorker;
