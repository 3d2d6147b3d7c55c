//! The graph builder: the public entry point of the crate.
//!
//! Accepts compiled queries, result sinks, and configuration, and produces
//! a ready-to-run [`GraphExecutor`]. One execution-query node and one
//! datapoint node are created per distinct codepoint checksum across all
//! queries; queries whose minimum-runtime-version requirement is unmet are
//! not scheduled, and their orphaned checksums receive permanent error
//! results instead. Priorities are computed last, after all edges exist.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{bounded, Sender};
use semver::Version;
use serde_json::Value;
use tracing::warn;

use crate::collectors::{
    BufferedCollector, DatapointCollector, NoopProgressReporter, ProgressReporter,
};
use crate::graph::GraphExecutor;
use crate::manager::{ExecutionManager, QueryInterpreter, RunQueueItem};
use crate::nodes::{
    CollectionFinisherNode, DatapointCollectorNode, DatapointNode, ExecutionQueryNode, Node,
    NodeData, NodeKind, COLLECTION_FINISHER_ID, DATAPOINT_COLLECTOR_ID,
};
use crate::query::CompiledQuery;
use crate::result::{DataValue, RawResult};
use crate::types::{Checksum, NodeId, QueryId, ValueKind};

const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(5 * 60);
const RESULT_CHANNEL_CAPACITY: usize = 128;

struct QuerySpec {
    query: Arc<CompiledQuery>,
    required_props: HashMap<String, Checksum>,
    resolved_props: HashMap<String, Value>,
}

/// Builds an execution graph from compiled queries and configuration.
///
/// # Example
///
/// ```ignore
/// let results = GraphBuilder::new()
///     .add_query(query, HashMap::new(), HashMap::new())
///     .collect_datapoint("checksum1")
///     .with_query_timeout(Duration::from_secs(30))
///     .build(interpreter)
///     .execute()?;
/// ```
pub struct GraphBuilder {
    queries: Vec<QuerySpec>,
    collectors: Vec<Arc<dyn DatapointCollector>>,
    collect_checksums: Vec<Checksum>,
    datapoint_kinds: HashMap<Checksum, ValueKind>,
    progress_reporter: Arc<dyn ProgressReporter>,
    runtime_version: Option<String>,
    query_timeout: Duration,
}

impl Default for GraphBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self {
            queries: Vec::new(),
            collectors: Vec::new(),
            collect_checksums: Vec::new(),
            datapoint_kinds: HashMap::new(),
            progress_reporter: Arc::new(NoopProgressReporter),
            runtime_version: None,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }

    /// Adds a compiled query to be executed.
    ///
    /// `required_props` maps property names to the checksums that resolve
    /// them; `resolved_props` supplies property values known up front.
    pub fn add_query(
        mut self,
        query: Arc<CompiledQuery>,
        required_props: HashMap<String, Checksum>,
        resolved_props: HashMap<String, Value>,
    ) -> Self {
        self.queries.push(QuerySpec {
            query,
            required_props,
            resolved_props,
        });
        self
    }

    /// Declares the expected value kind for a datapoint checksum. Reported
    /// values of a different kind are cast before storage.
    pub fn add_datapoint_type(mut self, checksum: impl Into<Checksum>, kind: ValueKind) -> Self {
        self.datapoint_kinds.insert(checksum.into(), kind);
        self
    }

    /// Requests that the given checksum be collected and sent to the
    /// configured collectors, even if no query references it directly.
    pub fn collect_datapoint(mut self, checksum: impl Into<Checksum>) -> Self {
        self.collect_checksums.push(checksum.into());
        self
    }

    /// Adds a result sink. Collected datapoints are sent to every
    /// registered collector.
    pub fn add_collector(mut self, collector: Arc<dyn DatapointCollector>) -> Self {
        self.collectors.push(collector);
        self
    }

    /// Sets the receiver of `(completed, total)` progress updates.
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = reporter;
        self
    }

    /// Sets the runtime version used to gate queries with a
    /// minimum-version requirement. Without a version, all queries run.
    pub fn with_runtime_version(mut self, version: impl Into<String>) -> Self {
        self.runtime_version = Some(version.into());
        self
    }

    /// Sets how long the execution manager waits for a single query to
    /// report all of its datapoints.
    pub fn with_query_timeout(mut self, timeout: Duration) -> Self {
        self.query_timeout = timeout;
        self
    }

    /// Builds the execution graph.
    pub fn build(self, interpreter: Arc<dyn QueryInterpreter>) -> GraphExecutor {
        let (run_queue_tx, run_queue_rx) = bounded(self.queries.len().max(1));
        let (results_tx, results_rx) = bounded(RESULT_CHANNEL_CAPACITY);
        let (errors_tx, errors_rx) = bounded(1);
        let (done_tx, done_rx) = bounded(1);

        // Later registrations of the same query ID win
        let mut queries: HashMap<QueryId, QuerySpec> = HashMap::with_capacity(self.queries.len());
        for spec in self.queries {
            queries.insert(spec.query.id.clone(), spec);
        }

        let collected = Arc::new(BufferedCollector::new());
        let mut collectors = self.collectors;
        collectors.push(Arc::clone(&collected) as Arc<dyn DatapointCollector>);

        let mut ge = GraphExecutor {
            nodes: HashMap::new(),
            edges: HashMap::new(),
            priorities: HashMap::new(),
            manager: ExecutionManager::new(
                interpreter,
                run_queue_rx,
                results_tx,
                errors_tx,
                self.query_timeout,
            ),
            results: results_rx,
            errors: errors_rx,
            done: done_rx,
            collected,
        };

        ge.nodes.insert(
            DATAPOINT_COLLECTOR_ID.to_string(),
            Node {
                id: DATAPOINT_COLLECTOR_ID.to_string(),
                kind: NodeKind::DatapointCollector,
                data: NodeData::Collector(DatapointCollectorNode::new(collectors)),
            },
        );

        let runtime_version = self.runtime_version.and_then(|raw| match Version::parse(&raw) {
            Ok(version) => Some(version),
            Err(err) => {
                warn!(version = %raw, error = %err, "unable to parse runtime version");
                None
            }
        });

        let mut unrunnable = Vec::new();
        for (query_id, spec) in queries {
            if check_version(&spec.query, runtime_version.as_ref()) {
                ge.add_execution_query_node(&run_queue_tx, &query_id, spec, &self.datapoint_kinds);
            } else {
                unrunnable.push(spec);
            }
        }

        for checksum in &self.collect_checksums {
            ge.add_edge(checksum.clone(), DATAPOINT_COLLECTOR_ID.to_string());
        }

        ge.handle_unrunnable_queries(unrunnable);

        ge.create_finisher_node(self.progress_reporter, done_tx);

        let node_ids: Vec<NodeId> = ge.nodes.keys().cloned().collect();
        for node_id in node_ids {
            prioritize_node(&ge.edges, &mut ge.priorities, &node_id);
        }

        // The finisher must only be notified after every other node in a
        // round has been recalculated
        ge.priorities
            .insert(COLLECTION_FINISHER_ID.to_string(), i64::MIN);

        ge
    }
}

impl GraphExecutor {
    fn add_edge(&mut self, from: NodeId, to: NodeId) {
        insert_sorted(self.edges.entry(from).or_default(), to);
    }

    fn add_execution_query_node(
        &mut self,
        run_queue: &Sender<RunQueueItem>,
        query_id: &str,
        spec: QuerySpec,
        datapoint_kinds: &HashMap<Checksum, ValueKind>,
    ) {
        let node_id = format!("execution_query/{query_id}");
        if self.nodes.contains_key(&node_id) {
            return;
        }

        let mut data = ExecutionQueryNode::new(Arc::clone(&spec.query), run_queue.clone());

        // These edges don't report anything, but they make the graph
        // connected
        for checksum in spec.query.codepoint_checksums() {
            self.add_datapoint_node(&checksum, datapoint_kinds.get(&checksum).copied(), None);
            self.add_edge(node_id.clone(), checksum);
        }

        for (name, checksum) in &spec.required_props {
            data.require_property(name, checksum.clone());
            self.add_edge(checksum.clone(), node_id.clone());
        }

        for (name, value) in spec.resolved_props {
            data.resolve_property(name, DataValue::value(value));
        }

        self.nodes.insert(
            node_id.clone(),
            Node {
                id: node_id,
                kind: NodeKind::ExecutionQuery,
                data: NodeData::ExecutionQuery(data),
            },
        );
    }

    fn add_datapoint_node(
        &mut self,
        checksum: &str,
        expected_kind: Option<ValueKind>,
        preset: Option<RawResult>,
    ) {
        if self.nodes.contains_key(checksum) {
            return;
        }

        self.nodes.insert(
            checksum.to_string(),
            Node {
                id: checksum.to_string(),
                kind: NodeKind::Datapoint,
                data: NodeData::Datapoint(DatapointNode::new(expected_kind, preset)),
            },
        );
    }

    /// Marks the datapoints of version-gated queries as errored, unless
    /// another runnable query reports them.
    fn handle_unrunnable_queries(&mut self, unrunnable: Vec<QuerySpec>) {
        for spec in unrunnable {
            let required = spec
                .query
                .min_runtime_version
                .as_deref()
                .unwrap_or("unknown");
            for checksum in spec.query.codepoint_checksums() {
                if self.nodes.contains_key(&checksum) {
                    continue;
                }
                let preset = RawResult::error(
                    checksum.clone(),
                    format!("unable to run query, runtime version {required} required"),
                );
                self.add_datapoint_node(&checksum, None, Some(preset));
            }
        }
    }

    fn create_finisher_node(&mut self, reporter: Arc<dyn ProgressReporter>, done: Sender<()>) {
        let mut data = CollectionFinisherNode::new(reporter, done);

        let datapoint_ids: Vec<NodeId> = self
            .nodes
            .values()
            .filter(|n| n.kind == NodeKind::Datapoint)
            .map(|n| n.id.clone())
            .collect();
        for datapoint_id in datapoint_ids {
            data.track_datapoint(datapoint_id.clone());
            self.add_edge(datapoint_id, COLLECTION_FINISHER_ID.to_string());
        }

        self.nodes.insert(
            COLLECTION_FINISHER_ID.to_string(),
            Node {
                id: COLLECTION_FINISHER_ID.to_string(),
                kind: NodeKind::CollectionFinisher,
                data: NodeData::Finisher(data),
            },
        );
    }
}

/// Assigns each node a priority reflecting its topological distance from
/// the terminal sinks: sinks get 1, every other node gets one more than
/// the maximum priority of its out-edge targets. Draining the queue in
/// descending priority order then acts like a breadth-first traversal,
/// minimizing the number of recalculations per batch of incoming results.
fn prioritize_node(
    edges: &HashMap<NodeId, Vec<NodeId>>,
    priorities: &mut HashMap<NodeId, i64>,
    node_id: &str,
) -> i64 {
    if let Some(&priority) = priorities.get(node_id) {
        return priority;
    }

    let mut children_max = 0;
    if let Some(children) = edges.get(node_id) {
        for child in children {
            children_max = children_max.max(prioritize_node(edges, priorities, child));
        }
    }

    let priority = children_max + 1;
    priorities.insert(node_id.to_string(), priority);
    priority
}

fn check_version(query: &CompiledQuery, runtime: Option<&Version>) -> bool {
    if let (Some(runtime), Some(required)) = (runtime, query.min_runtime_version.as_deref()) {
        if let Ok(min) = Version::parse(required) {
            if *runtime < min {
                return false;
            }
        }
    }
    true
}

fn insert_sorted(list: &mut Vec<NodeId>, id: NodeId) {
    if let Err(pos) = list.binary_search(&id) {
        list.insert(pos, id);
    }
}
