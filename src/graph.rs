//! The graph executor: drives recalculation rounds until completion.
//!
//! The executor owns the node, edge, and priority maps and mutates them
//! only from its own event loop; the execution manager and interpreter
//! threads communicate with it exclusively through channels. Each drain of
//! the priority queue is one "round": within a round, every node
//! recalculates at most once, and a node is always fed (`consume`) before
//! it is re-queued, so it sees the latest upstream state when it runs.

use std::collections::{BinaryHeap, HashMap, HashSet};
use std::sync::Arc;

use crossbeam_channel::{select, Receiver, TryRecvError};
use tracing::debug;

use crate::collectors::BufferedCollector;
use crate::error::ExecutionError;
use crate::manager::ExecutionManager;
use crate::nodes::{Envelope, Node, EXECUTOR_ID};
use crate::result::RawResult;
use crate::types::{Checksum, NodeId};

/// A priority queue of node IDs with at-most-once membership.
///
/// Pops are highest-priority-first, so nodes farther from the sinks are
/// recalculated before their dependents; insertion order breaks ties.
/// Pushing an ID that is already queued is a no-op, which bounds every
/// node to one recalculation per drain.
pub(crate) struct NodeQueue {
    heap: BinaryHeap<QueueEntry>,
    queued: HashSet<NodeId>,
    next_seq: u64,
}

struct QueueEntry {
    priority: i64,
    seq: u64,
    id: NodeId,
}

impl PartialEq for QueueEntry {
    fn eq(&self, other: &Self) -> bool {
        self.priority == other.priority && self.seq == other.seq
    }
}

impl Eq for QueueEntry {}

impl PartialOrd for QueueEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Higher priority first; earlier insertion first among equals
        self.priority
            .cmp(&other.priority)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl NodeQueue {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            queued: HashSet::new(),
            next_seq: 0,
        }
    }

    pub(crate) fn push(&mut self, id: NodeId, priority: i64) {
        if self.queued.insert(id.clone()) {
            self.heap.push(QueueEntry {
                priority,
                seq: self.next_seq,
                id,
            });
            self.next_seq += 1;
        }
    }

    pub(crate) fn pop(&mut self) -> Option<NodeId> {
        let entry = self.heap.pop()?;
        self.queued.remove(&entry.id);
        Some(entry.id)
    }
}

/// Executes a built graph to completion.
///
/// Produced by [`GraphBuilder::build`](crate::GraphBuilder::build);
/// the graph is executed once and discarded.
pub struct GraphExecutor {
    pub(crate) nodes: HashMap<NodeId, Node>,
    pub(crate) edges: HashMap<NodeId, Vec<NodeId>>,
    pub(crate) priorities: HashMap<NodeId, i64>,
    pub(crate) manager: ExecutionManager,
    pub(crate) results: Receiver<RawResult>,
    pub(crate) errors: Receiver<ExecutionError>,
    pub(crate) done: Receiver<()>,
    pub(crate) collected: Arc<BufferedCollector>,
}

impl GraphExecutor {
    /// Runs the graph until every expected datapoint has reported or a
    /// fatal fault occurs.
    ///
    /// Returns the map of collected results keyed by checksum. Individual
    /// query failures appear as per-checksum error results inside the map;
    /// only fatal manager faults surface as an `Err`, and results already
    /// flushed to sinks before the fault are not retracted.
    pub fn execute(self) -> Result<HashMap<Checksum, RawResult>, ExecutionError> {
        let GraphExecutor {
            mut nodes,
            edges,
            priorities,
            manager,
            results,
            mut errors,
            done,
            collected,
        } = self;

        // The worker exits when the run queue disconnects, which happens
        // when the execution-query nodes are dropped at the end of this
        // function.
        let _worker = manager.spawn();

        let mut queue = NodeQueue::new();
        for (id, node) in nodes.iter_mut() {
            node.data.initialize();
            queue.push(id.clone(), i64::MAX);
        }

        loop {
            drain_queue(&mut nodes, &edges, &priorities, &mut queue);

            if signal_closed(&done) {
                break;
            }

            select! {
                recv(results) -> msg => match msg {
                    Ok(res) => {
                        feed_result(&mut nodes, &priorities, &mut queue, res);
                        // Batch the round: pick up everything that is
                        // already available before recalculating
                        while let Ok(more) = results.try_recv() {
                            feed_result(&mut nodes, &priorities, &mut queue, more);
                        }
                    }
                    Err(_) => {
                        if let Ok(err) = errors.try_recv() {
                            return Err(err);
                        }
                        if signal_closed(&done) {
                            break;
                        }
                        return Err(ExecutionError::ResultChannelClosed);
                    }
                },
                recv(errors) -> msg => match msg {
                    Ok(err) => return Err(err),
                    // Disconnection just means the worker exited cleanly
                    Err(_) => errors = crossbeam_channel::never(),
                },
                recv(done) -> msg => {
                    if msg.is_err() {
                        break;
                    }
                }
            }
        }

        drop(nodes);
        Ok(collected.take_results())
    }
}

/// Drains the priority queue, recalculating each popped node and
/// propagating notifications along its out-edges.
fn drain_queue(
    nodes: &mut HashMap<NodeId, Node>,
    edges: &HashMap<NodeId, Vec<NodeId>>,
    priorities: &HashMap<NodeId, i64>,
    queue: &mut NodeQueue,
) {
    while let Some(id) = queue.pop() {
        let Some(node) = nodes.get_mut(&id) else {
            continue;
        };
        let Some(envelope) = node.data.recalculate() else {
            continue;
        };

        let Some(targets) = edges.get(&id) else {
            continue;
        };
        for target in targets.clone() {
            if let Some(target_node) = nodes.get_mut(&target) {
                target_node.data.consume(&id, &envelope);
                let priority = priorities.get(&target).copied().unwrap_or(0);
                queue.push(target, priority);
            }
        }
    }
}

/// Feeds one interpreter result into its datapoint node.
fn feed_result(
    nodes: &mut HashMap<NodeId, Node>,
    priorities: &HashMap<NodeId, i64>,
    queue: &mut NodeQueue,
    res: RawResult,
) {
    let node_id = res.checksum.clone();
    match nodes.get_mut(&node_id) {
        Some(node) => {
            node.data.consume(EXECUTOR_ID, &Envelope::with_result(res));
            let priority = priorities.get(&node_id).copied().unwrap_or(0);
            queue.push(node_id, priority);
        }
        None => debug!(checksum = %node_id, "received result for unknown checksum"),
    }
}

fn signal_closed(done: &Receiver<()>) -> bool {
    matches!(done.try_recv(), Err(TryRecvError::Disconnected))
}
