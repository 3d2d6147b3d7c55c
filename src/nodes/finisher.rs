//! The collection-finisher node: termination detection.

use std::collections::HashSet;
use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::debug;

use crate::collectors::ProgressReporter;
use crate::nodes::Envelope;
use crate::types::NodeId;

/// Node behavior for the singleton finisher.
///
/// Tracks the datapoint nodes that have yet to report. The node holds the
/// sending half of the completion signal; dropping it closes the signal,
/// which can happen only once, so completion is idempotent by construction.
/// The builder forces this node to the minimum priority so it is evaluated
/// after every other node in a round and never reports completion
/// prematurely.
pub(crate) struct CollectionFinisherNode {
    progress_reporter: Arc<dyn ProgressReporter>,
    total_datapoints: usize,
    remaining_datapoints: HashSet<NodeId>,
    done: Option<Sender<()>>,
    invalidated: bool,
}

impl CollectionFinisherNode {
    pub(crate) fn new(progress_reporter: Arc<dyn ProgressReporter>, done: Sender<()>) -> Self {
        Self {
            progress_reporter,
            total_datapoints: 0,
            remaining_datapoints: HashSet::new(),
            done: Some(done),
            invalidated: false,
        }
    }

    /// Registers a datapoint node whose report is required for completion.
    pub(crate) fn track_datapoint(&mut self, id: impl Into<NodeId>) {
        if self.remaining_datapoints.insert(id.into()) {
            self.total_datapoints += 1;
        }
    }

    pub(crate) fn initialize(&mut self) {
        if self.remaining_datapoints.is_empty() {
            self.invalidated = true;
        }
    }

    /// Marks the reporting datapoint as finished.
    pub(crate) fn consume(&mut self, from: &str, _data: &Envelope) {
        if self.remaining_datapoints.is_empty() {
            return;
        }
        debug!(datapoint = %from, "datapoint finished");
        self.remaining_datapoints.remove(from);
        self.invalidated = true;
    }

    /// Reports progress and closes the completion signal once every
    /// datapoint has reported.
    pub(crate) fn recalculate(&mut self) -> Option<Envelope> {
        if !self.invalidated {
            return None;
        }
        self.progress_reporter.progress(
            self.total_datapoints - self.remaining_datapoints.len(),
            self.total_datapoints,
        );
        self.invalidated = false;
        if self.remaining_datapoints.is_empty() {
            debug!("graph has received all datapoints");
            // Dropping the sender closes the completion signal
            self.done.take();
        }
        None
    }
}
