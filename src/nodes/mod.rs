//! Graph node kinds and their shared behavior contract.
//!
//! Every node implements the same three-phase contract:
//!
//! - `initialize` is called once before the event loop starts and may mark
//!   the node invalidated if it already has something to do.
//! - `consume` feeds the node a message from one of its in-edges (or from
//!   the executor itself, for datapoint nodes) and may invalidate it.
//! - `recalculate` re-derives the node's state if it was invalidated and
//!   returns an [`Envelope`] when dependents must be notified.
//!
//! Node kinds form a closed set, so dispatch is a plain enum rather than
//! trait objects: node state stays inline and the executor never needs
//! dynamic downcasting.

pub(crate) mod collector;
pub(crate) mod datapoint;
pub(crate) mod execution_query;
pub(crate) mod finisher;

use crate::result::RawResult;
use crate::types::NodeId;

pub(crate) use collector::DatapointCollectorNode;
pub(crate) use datapoint::DatapointNode;
pub(crate) use execution_query::ExecutionQueryNode;
pub(crate) use finisher::CollectionFinisherNode;

/// Reserved node ID of the singleton datapoint-collector node.
pub(crate) const DATAPOINT_COLLECTOR_ID: &str = "__datapoint_collector__";

/// Reserved node ID of the singleton collection-finisher node.
pub(crate) const COLLECTION_FINISHER_ID: &str = "__collection_finisher__";

/// Synthetic sender ID used when the event loop feeds results into
/// datapoint nodes directly.
pub(crate) const EXECUTOR_ID: &str = "__executor__";

/// The message passed along an edge during propagation.
///
/// An envelope without a result still signals "something changed", which
/// keeps the propagation contract uniform across node kinds.
#[derive(Clone, Debug, Default)]
pub(crate) struct Envelope {
    pub res: Option<RawResult>,
}

impl Envelope {
    pub(crate) fn empty() -> Self {
        Self { res: None }
    }

    pub(crate) fn with_result(res: RawResult) -> Self {
        Self { res: Some(res) }
    }
}

/// The kind of a graph node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum NodeKind {
    /// A compiled query pending execution. Notified by the datapoint nodes
    /// that resolve its properties.
    ExecutionQuery,
    /// Holds the first-received result for one checksum. Fed by the
    /// executor when results arrive; its out-edges connect it to dependent
    /// execution queries, the collector, and the finisher.
    Datapoint,
    /// The singleton sink boundary for all reportable results.
    DatapointCollector,
    /// The singleton termination detector. Always has the lowest priority
    /// so all other work in a round completes before it reports.
    CollectionFinisher,
}

/// A node of the execution graph: identity plus kind-specific behavior.
pub(crate) struct Node {
    pub id: NodeId,
    pub kind: NodeKind,
    pub data: NodeData,
}

/// Closed dispatch over the four node behaviors.
pub(crate) enum NodeData {
    ExecutionQuery(ExecutionQueryNode),
    Datapoint(DatapointNode),
    Collector(DatapointCollectorNode),
    Finisher(CollectionFinisherNode),
}

impl NodeData {
    /// Prepares the node for a run.
    pub(crate) fn initialize(&mut self) {
        match self {
            NodeData::ExecutionQuery(n) => n.initialize(),
            NodeData::Datapoint(n) => n.initialize(),
            NodeData::Collector(n) => n.initialize(),
            NodeData::Finisher(n) => n.initialize(),
        }
    }

    /// Delivers a message from `from` to this node.
    pub(crate) fn consume(&mut self, from: &str, data: &Envelope) {
        match self {
            NodeData::ExecutionQuery(n) => n.consume(from, data),
            NodeData::Datapoint(n) => n.consume(from, data),
            NodeData::Collector(n) => n.consume(from, data),
            NodeData::Finisher(n) => n.consume(from, data),
        }
    }

    /// Re-derives the node's state if invalidated.
    ///
    /// Returns an envelope when the node's dependents must be notified.
    pub(crate) fn recalculate(&mut self) -> Option<Envelope> {
        match self {
            NodeData::ExecutionQuery(n) => n.recalculate(),
            NodeData::Datapoint(n) => n.recalculate(),
            NodeData::Collector(n) => n.recalculate(),
            NodeData::Finisher(n) => n.recalculate(),
        }
    }
}
