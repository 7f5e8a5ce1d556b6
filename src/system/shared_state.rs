//! State shared between the front-end and the semantic worker.
//!
//! The worker owns the scene graph; after every keyframe it publishes a
//! snapshot and the landmark list here for readers on other threads.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;

use crate::semantic::{GraphSnapshot, LandmarkDescriptor};

/// Latest published view of the scene graph.
#[derive(Debug, Clone, Default)]
pub struct PublishedGraph {
    pub snapshot: GraphSnapshot,
    pub landmarks: Vec<LandmarkDescriptor>,
}

/// Shared state accessible by the front-end and the semantic worker.
#[derive(Debug, Default)]
pub struct SharedState {
    /// Snapshot and landmarks, replaced together by the worker.
    pub graph: RwLock<PublishedGraph>,

    /// Flow control: true while keyframes wait in the producer-side backlog.
    pub backlogged: AtomicBool,

    /// Keyframes fully processed by the worker.
    pub keyframes_processed: AtomicU64,

    /// Markers skipped by the worker (insufficient support, unknown, stale).
    pub markers_skipped: AtomicU64,
}

impl SharedState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Check whether the worker is behind.
    pub fn is_backlogged(&self) -> bool {
        self.backlogged.load(Ordering::SeqCst)
    }

    pub fn set_backlogged(&self, value: bool) {
        self.backlogged.store(value, Ordering::SeqCst);
    }

    pub fn keyframes_processed(&self) -> u64 {
        self.keyframes_processed.load(Ordering::SeqCst)
    }

    pub fn markers_skipped(&self) -> u64 {
        self.markers_skipped.load(Ordering::SeqCst)
    }

    /// Replace the published graph.
    pub fn publish(&self, published: PublishedGraph) {
        *self.graph.write() = published;
    }

    /// Copy of the latest snapshot.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.graph.read().snapshot.clone()
    }

    /// Copy of the latest landmark list.
    pub fn landmarks(&self) -> Vec<LandmarkDescriptor> {
        self.graph.read().landmarks.clone()
    }
}
