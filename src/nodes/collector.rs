//! The datapoint-collector node: sink boundary for reportable results.

use std::collections::HashMap;
use std::sync::Arc;

use crate::collectors::DatapointCollector;
use crate::nodes::Envelope;
use crate::result::RawResult;
use crate::types::Checksum;

/// Node behavior for the singleton collector.
///
/// Buffers newly consumed results by checksum and flushes the whole buffer
/// to every registered collector on recalculation. Unlike datapoint nodes
/// it can fire on every round that produced new data.
pub(crate) struct DatapointCollectorNode {
    collectors: Vec<Arc<dyn DatapointCollector>>,
    unreported: HashMap<Checksum, RawResult>,
    invalidated: bool,
}

impl DatapointCollectorNode {
    pub(crate) fn new(collectors: Vec<Arc<dyn DatapointCollector>>) -> Self {
        Self {
            collectors,
            unreported: HashMap::new(),
            invalidated: false,
        }
    }

    pub(crate) fn initialize(&mut self) {
        if !self.unreported.is_empty() {
            self.invalidated = true;
        }
    }

    /// Buffers a reported datapoint.
    pub(crate) fn consume(&mut self, _from: &str, data: &Envelope) {
        if let Some(res) = &data.res {
            self.unreported.insert(res.checksum.clone(), res.clone());
            self.invalidated = true;
        }
    }

    /// Flushes the buffered datapoints to the configured collectors.
    pub(crate) fn recalculate(&mut self) -> Option<Envelope> {
        if !self.invalidated {
            return None;
        }
        self.invalidated = false;

        let mut batch: Vec<RawResult> = self.unreported.drain().map(|(_, res)| res).collect();
        // Sorted flush order keeps collector output deterministic
        batch.sort_by(|a, b| a.checksum.cmp(&b.checksum));

        for collector in &self.collectors {
            collector.sink_data(&batch);
        }

        None
    }
}
