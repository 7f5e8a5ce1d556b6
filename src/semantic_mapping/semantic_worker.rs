//! Semantic Worker - keyframe-driven thread owning the scene graph.

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, info, warn};

use crate::prior::PriorDatabase;
use crate::semantic::{OptimizerUpdate, SemanticConfig, SemanticSceneGraph};
use crate::system::messages::SemanticKeyFrameMsg;
use crate::system::shared_state::{PublishedGraph, SharedState};

/// Timeout for receiving keyframes. Optimizer feedback is drained at least this often.
const RECV_TIMEOUT: Duration = Duration::from_millis(100);

/// Semantic mapping thread state.
pub struct SemanticWorker {
    graph: SemanticSceneGraph,
}

impl SemanticWorker {
    pub fn new(prior: &PriorDatabase, config: SemanticConfig) -> Self {
        Self {
            graph: SemanticSceneGraph::new(prior, config),
        }
    }

    /// Main loop. Returns once the keyframe channel is closed and drained.
    pub fn run(
        &mut self,
        kf_receiver: Receiver<SemanticKeyFrameMsg>,
        feedback_receiver: Receiver<OptimizerUpdate>,
        shared: Arc<SharedState>,
    ) {
        info!("Semantic worker started");
        loop {
            if self.apply_feedback(&feedback_receiver) {
                self.publish(&shared);
            }

            match kf_receiver.recv_timeout(RECV_TIMEOUT) {
                Ok(msg) => {
                    self.process_keyframe(msg, &shared);
                }
                Err(RecvTimeoutError::Timeout) => {
                    continue;
                }
                Err(RecvTimeoutError::Disconnected) => {
                    break;
                }
            }
        }

        if self.apply_feedback(&feedback_receiver) {
            self.publish(&shared);
        }
        info!(
            "Semantic worker finished after {} keyframes",
            self.graph.keyframes_processed()
        );
    }

    /// Process a single keyframe message and publish the result.
    fn process_keyframe(&mut self, msg: SemanticKeyFrameMsg, shared: &Arc<SharedState>) {
        let report = self.graph.process_keyframe(&msg.keyframe, &msg.markers);
        if !report.skipped.is_empty() {
            debug!("{}: {} markers skipped", report.keyframe, report.skipped.len());
            shared
                .markers_skipped
                .fetch_add(report.skipped.len() as u64, Ordering::SeqCst);
        }
        self.publish(shared);
        shared.keyframes_processed.fetch_add(1, Ordering::SeqCst);
    }

    /// Apply every pending optimizer update. Returns true if any was received.
    fn apply_feedback(&mut self, feedback_receiver: &Receiver<OptimizerUpdate>) -> bool {
        let mut received = false;
        for update in feedback_receiver.try_iter() {
            received = true;
            if let Err(e) = self.graph.apply_optimizer_update(update) {
                warn!("Ignoring optimizer update: {}", e);
            }
        }
        received
    }

    fn publish(&self, shared: &Arc<SharedState>) {
        shared.publish(PublishedGraph {
            snapshot: self.graph.snapshot(),
            landmarks: self.graph.landmarks(),
        });
    }
}
