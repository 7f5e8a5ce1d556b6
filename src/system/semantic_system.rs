//! Semantic System - front-end handle and thread orchestration.
//!
//! The `SemanticSystem` is the struct the front-end talks to. It buffers
//! marker sightings, pairs each keyframe with its nearest sighting set and
//! hands it to the semantic worker thread without ever blocking the caller.

use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded, unbounded};
use tracing::{debug, info, warn};

use crate::map::KeyFrame;
use crate::prior::PriorDatabase;
use crate::semantic::config::WorkerConfig;
use crate::semantic::{GraphSnapshot, LandmarkDescriptor, Marker, MarkerBuffer, OptimizerUpdate, SemanticConfig};
use crate::semantic_mapping::SemanticWorker;

use super::messages::SemanticKeyFrameMsg;
use super::shared_state::SharedState;

/// Front-end handle to the semantic subsystem.
pub struct SemanticSystem {
    /// Shared state (published graph, flags) accessible by all threads.
    shared: Arc<SharedState>,

    /// Channel sender for keyframes (front-end -> worker). `None` after shutdown.
    kf_sender: Option<Sender<SemanticKeyFrameMsg>>,

    /// Channel sender for optimizer feedback (optimizer -> worker).
    feedback_sender: Sender<OptimizerUpdate>,

    /// Keyframes that did not fit in the channel, oldest first.
    backlog: VecDeque<SemanticKeyFrameMsg>,

    /// Recent marker sightings waiting to be paired with keyframes.
    markers: MarkerBuffer,

    config: WorkerConfig,

    /// Handle to the worker thread.
    worker_handle: Option<JoinHandle<()>>,
}

impl SemanticSystem {
    /// Create the system and spawn the semantic worker thread.
    pub fn new(prior: PriorDatabase, config: SemanticConfig) -> Result<Self> {
        let shared = SharedState::new();
        let worker_config = config.worker.clone();

        let (kf_sender, kf_receiver) =
            bounded::<SemanticKeyFrameMsg>(worker_config.keyframe_queue_capacity.max(1));
        let (feedback_sender, feedback_receiver) = unbounded::<OptimizerUpdate>();

        let worker_handle =
            Self::spawn_worker(prior, config, kf_receiver, feedback_receiver, shared.clone())?;

        Ok(Self {
            shared,
            kf_sender: Some(kf_sender),
            feedback_sender,
            backlog: VecDeque::new(),
            markers: MarkerBuffer::new(worker_config.marker_buffer_capacity),
            config: worker_config,
            worker_handle: Some(worker_handle),
        })
    }

    fn spawn_worker(
        prior: PriorDatabase,
        config: SemanticConfig,
        kf_receiver: Receiver<SemanticKeyFrameMsg>,
        feedback_receiver: Receiver<OptimizerUpdate>,
        shared: Arc<SharedState>,
    ) -> Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("semantic_mapping".to_string())
            .spawn(move || {
                let mut worker = SemanticWorker::new(&prior, config);
                worker.run(kf_receiver, feedback_receiver, shared);
            })
            .context("Failed to spawn semantic worker thread")
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Producer side
    // ─────────────────────────────────────────────────────────────────────────

    /// Record the marker sightings detected at `timestamp_ns`.
    pub fn add_marker_sightings(&mut self, timestamp_ns: u64, markers: Vec<Marker>) {
        self.markers.push(timestamp_ns, markers);
    }

    /// Hand a keyframe to the worker together with its nearest marker sightings.
    ///
    /// Never blocks: if the worker is behind, the keyframe waits in the
    /// backlog and is sent on a later call. After [`shutdown`](Self::shutdown)
    /// the keyframe is dropped and `false` is returned.
    pub fn submit_keyframe(&mut self, keyframe: Arc<KeyFrame>) -> bool {
        if self.kf_sender.is_none() {
            warn!("Semantic system is shut down, dropping {}", keyframe.id);
            return false;
        }

        let markers = self
            .markers
            .nearest(keyframe.timestamp_ns, self.config.max_marker_time_offset_ns)
            .map(|(offset, markers)| {
                debug!("{}: {} markers at offset {} ns", keyframe.id, markers.len(), offset);
                markers.to_vec()
            })
            .unwrap_or_default();

        self.backlog.push_back(SemanticKeyFrameMsg { keyframe, markers });
        self.flush_backlog();

        let stripped = strip_excess_markers(&mut self.backlog, self.config.max_backlog_with_markers);
        if stripped > 0 {
            warn!(
                "Semantic worker behind by {} keyframes, dropped markers of {} keyframes",
                self.backlog.len(),
                stripped
            );
        }
        self.shared.set_backlogged(!self.backlog.is_empty());
        true
    }

    /// Send as many backlogged keyframes as the channel accepts, oldest first.
    pub fn flush_backlog(&mut self) {
        let Some(sender) = &self.kf_sender else {
            return;
        };
        while let Some(msg) = self.backlog.pop_front() {
            match sender.try_send(msg) {
                Ok(()) => {}
                Err(TrySendError::Full(msg)) => {
                    self.backlog.push_front(msg);
                    break;
                }
                Err(TrySendError::Disconnected(msg)) => {
                    warn!("Semantic worker is gone, keeping {} in backlog", msg.keyframe.id);
                    self.backlog.push_front(msg);
                    break;
                }
            }
        }
        self.shared.set_backlogged(!self.backlog.is_empty());
    }

    /// Number of keyframes waiting for room in the channel.
    pub fn backlog_len(&self) -> usize {
        self.backlog.len()
    }

    /// Sender through which the optimizer reports landmark IDs and refined planes.
    pub fn optimizer_feedback(&self) -> Sender<OptimizerUpdate> {
        self.feedback_sender.clone()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Readers
    // ─────────────────────────────────────────────────────────────────────────

    /// Get a reference to the shared state.
    pub fn shared_state(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> GraphSnapshot {
        self.shared.snapshot()
    }

    /// Latest published landmarks.
    pub fn landmarks(&self) -> Vec<LandmarkDescriptor> {
        self.shared.landmarks()
    }

    /// Shutdown the system gracefully.
    ///
    /// Delivers every backlogged keyframe, closes the channel and waits for
    /// the worker to drain it.
    pub fn shutdown(&mut self) {
        if let Some(sender) = self.kf_sender.take() {
            let pending = self.backlog.len();
            while let Some(msg) = self.backlog.pop_front() {
                if sender.send(msg).is_err() {
                    warn!("Semantic worker exited early, {} keyframes lost", self.backlog.len() + 1);
                    self.backlog.clear();
                    break;
                }
            }
            if pending > 0 {
                debug!("Flushed {} backlogged keyframes on shutdown", pending);
            }
            // Dropping the sender lets the worker exit once the channel is drained.
        }
        self.shared.set_backlogged(false);

        if let Some(handle) = self.worker_handle.take() {
            if handle.join().is_err() {
                warn!("Semantic worker thread panicked");
            } else {
                info!(
                    "Semantic system shut down after {} keyframes",
                    self.shared.keyframes_processed()
                );
            }
        }
    }
}

impl Drop for SemanticSystem {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Drop the marker sightings of the oldest backlogged keyframes so that at
/// most `max_with_markers` of them still carry markers. The keyframes stay.
///
/// Returns how many keyframes lost their markers.
fn strip_excess_markers(backlog: &mut VecDeque<SemanticKeyFrameMsg>, max_with_markers: usize) -> usize {
    let excess = backlog.len().saturating_sub(max_with_markers);
    let mut stripped = 0;
    for msg in backlog.iter_mut().take(excess) {
        if !msg.markers.is_empty() {
            msg.markers.clear();
            stripped += 1;
        }
    }
    stripped
}
