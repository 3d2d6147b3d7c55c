//! End-to-end execution tests driving the full graph through a scripted
//! interpreter.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Value};

use queryflow::{
    CompiledQuery, DataValue, ExecutionError, FnProgressReporter, FuncCollector, GraphBuilder,
    QueryHandle, QueryId, QueryInterpreter, RawResult, ResultHandler,
};

/// What the interpreter does when a given query is started.
enum Script {
    /// Report these results synchronously, then return a handle.
    Report(Vec<RawResult>),
    /// Return a handle but never report anything.
    Silent,
    /// Fail to start.
    Fail(String),
}

#[derive(Default)]
struct ScriptedInterpreter {
    scripts: HashMap<QueryId, Script>,
    invocations: Mutex<Vec<QueryId>>,
    unregistered: Mutex<Vec<QueryId>>,
}

impl ScriptedInterpreter {
    fn new(scripts: HashMap<QueryId, Script>) -> Arc<Self> {
        Arc::new(Self {
            scripts,
            invocations: Mutex::new(Vec::new()),
            unregistered: Mutex::new(Vec::new()),
        })
    }

    fn invocations(&self) -> Vec<QueryId> {
        self.invocations.lock().clone()
    }

    fn unregistered(&self) -> Vec<QueryId> {
        self.unregistered.lock().clone()
    }
}

struct ScriptedHandle {
    query_id: QueryId,
    unregistered: Arc<Mutex<Vec<QueryId>>>,
}

impl QueryHandle for ScriptedHandle {
    fn unregister(&mut self) {
        self.unregistered.lock().push(self.query_id.clone());
    }
}

impl QueryInterpreter for ScriptedInterpreter {
    fn start_query(
        &self,
        query: &CompiledQuery,
        _props: &HashMap<String, DataValue>,
        on_result: ResultHandler,
    ) -> Result<Box<dyn QueryHandle>, ExecutionError> {
        self.invocations.lock().push(query.id.clone());

        match self.scripts.get(&query.id) {
            Some(Script::Report(results)) => {
                for res in results {
                    on_result(res.clone());
                }
            }
            Some(Script::Silent) | None => {}
            Some(Script::Fail(message)) => {
                return Err(ExecutionError::QueryStart {
                    query_id: query.id.clone(),
                    message: message.clone(),
                })
            }
        }

        Ok(Box::new(ScriptedHandle {
            query_id: query.id.clone(),
            unregistered: Arc::new(Mutex::new(Vec::new())),
        }))
    }
}

/// Variant of the scripted interpreter whose handles share the recording
/// state, so tests can observe unregister calls.
struct TrackingInterpreter {
    inner: Arc<ScriptedInterpreter>,
    unregistered: Arc<Mutex<Vec<QueryId>>>,
}

impl QueryInterpreter for TrackingInterpreter {
    fn start_query(
        &self,
        query: &CompiledQuery,
        props: &HashMap<String, DataValue>,
        on_result: ResultHandler,
    ) -> Result<Box<dyn QueryHandle>, ExecutionError> {
        self.inner.start_query(query, props, on_result)?;
        Ok(Box::new(ScriptedHandle {
            query_id: query.id.clone(),
            unregistered: Arc::clone(&self.unregistered),
        }))
    }
}

#[test]
fn test_executes_queries_and_collects_results() {
    let q1 = Arc::new(CompiledQuery::new("q1").with_entrypoint("c1").with_datapoint("c2"));
    let q2 = Arc::new(CompiledQuery::new("q2").with_entrypoint("c3"));
    let interpreter = ScriptedInterpreter::new(HashMap::from([
        (
            "q1".to_string(),
            Script::Report(vec![
                RawResult::new("c1", json!(true)),
                RawResult::new("c2", json!([1, 2, 3])),
            ]),
        ),
        (
            "q2".to_string(),
            Script::Report(vec![RawResult::new("c3", json!("value"))]),
        ),
    ]));

    let results = GraphBuilder::new()
        .add_query(q1, HashMap::new(), HashMap::new())
        .add_query(q2, HashMap::new(), HashMap::new())
        .collect_datapoint("c1")
        .collect_datapoint("c2")
        .collect_datapoint("c3")
        .build(Arc::clone(&interpreter) as Arc<dyn QueryInterpreter>)
        .execute()
        .expect("graph execution failed");

    assert_eq!(results.len(), 3);
    assert_eq!(results["c1"].data.value, json!(true));
    assert_eq!(results["c2"].data.value, json!([1, 2, 3]));
    assert_eq!(results["c3"].data.value, json!("value"));
}

#[test]
fn test_each_query_is_executed_at_most_once() {
    let q1 = Arc::new(CompiledQuery::new("q1").with_entrypoint("c1"));
    let interpreter = ScriptedInterpreter::new(HashMap::from([(
        "q1".to_string(),
        Script::Report(vec![RawResult::new("c1", json!(1))]),
    )]));

    GraphBuilder::new()
        .add_query(Arc::clone(&q1), HashMap::new(), HashMap::new())
        .add_query(q1, HashMap::new(), HashMap::new())
        .build(Arc::clone(&interpreter) as Arc<dyn QueryInterpreter>)
        .execute()
        .expect("graph execution failed");

    assert_eq!(interpreter.invocations(), vec!["q1".to_string()]);
}

#[test]
fn test_shared_checksum_keeps_one_result() {
    // Both queries promise c2; whichever reports first wins, the other
    // report is discarded without conflict
    let q1 = Arc::new(CompiledQuery::new("q1").with_entrypoint("c2"));
    let q2 = Arc::new(CompiledQuery::new("q2").with_entrypoint("c2"));
    let interpreter = ScriptedInterpreter::new(HashMap::from([
        (
            "q1".to_string(),
            Script::Report(vec![RawResult::new("c2", json!("from-q1"))]),
        ),
        (
            "q2".to_string(),
            Script::Report(vec![RawResult::new("c2", json!("from-q2"))]),
        ),
    ]));

    let results = GraphBuilder::new()
        .add_query(q1, HashMap::new(), HashMap::new())
        .add_query(q2, HashMap::new(), HashMap::new())
        .collect_datapoint("c2")
        .build(Arc::clone(&interpreter) as Arc<dyn QueryInterpreter>)
        .execute()
        .expect("graph execution failed");

    assert_eq!(results.len(), 1);
    let value = &results["c2"].data.value;
    assert!(value == &json!("from-q1") || value == &json!("from-q2"));
}

#[test]
fn test_unsupported_runtime_version_skips_query() {
    let q1 = Arc::new(
        CompiledQuery::new("q1")
            .with_entrypoint("c3")
            .with_min_runtime_version("9999.0.0"),
    );
    let interpreter = ScriptedInterpreter::new(HashMap::new());

    let results = GraphBuilder::new()
        .add_query(q1, HashMap::new(), HashMap::new())
        .with_runtime_version("1.0.0")
        .collect_datapoint("c3")
        .build(Arc::clone(&interpreter) as Arc<dyn QueryInterpreter>)
        .execute()
        .expect("graph execution failed");

    assert!(interpreter.invocations().is_empty());
    let error = results["c3"].data.error.as_deref().expect("expected error");
    assert!(error.contains("9999.0.0"));
}

#[test]
fn test_empty_graph_completes_immediately() {
    let reports: Arc<Mutex<Vec<(usize, usize)>>> = Arc::new(Mutex::new(Vec::new()));
    let reports_inner = Arc::clone(&reports);
    let interpreter = ScriptedInterpreter::new(HashMap::new());

    let results = GraphBuilder::new()
        .with_progress_reporter(Arc::new(FnProgressReporter::new(move |completed, total| {
            reports_inner.lock().push((completed, total));
        })))
        .build(interpreter as Arc<dyn QueryInterpreter>)
        .execute()
        .expect("graph execution failed");

    assert!(results.is_empty());
    assert_eq!(reports.lock().as_slice(), &[(0, 0)]);
}

#[test]
fn test_property_error_poisons_dependent_query() {
    // q1 fails to produce c1, which q2 needs as a property
    let q1 = Arc::new(CompiledQuery::new("q1").with_entrypoint("c1"));
    let q2 = Arc::new(
        CompiledQuery::new("q2")
            .with_entrypoint("c2")
            .with_required_prop("prop1", "c1"),
    );
    let interpreter = ScriptedInterpreter::new(HashMap::from([(
        "q1".to_string(),
        Script::Report(vec![RawResult::error("c1", "lookup failed")]),
    )]));

    let results = GraphBuilder::new()
        .add_query(q1, HashMap::new(), HashMap::new())
        .add_query(Arc::clone(&q2), q2.required_props.clone(), HashMap::new())
        .collect_datapoint("c2")
        .build(Arc::clone(&interpreter) as Arc<dyn QueryInterpreter>)
        .execute()
        .expect("graph execution failed");

    // q2 is never handed to the interpreter
    assert_eq!(interpreter.invocations(), vec!["q1".to_string()]);
    let error = results["c2"].data.error.as_deref().expect("expected error");
    assert!(error.contains("prop1"));
    assert!(error.contains("lookup failed"));
}

#[test]
fn test_resolved_properties_are_passed_to_interpreter() {
    let q1 = Arc::new(CompiledQuery::new("q1").with_entrypoint("c1"));
    let seen_props: Arc<Mutex<Option<HashMap<String, DataValue>>>> = Arc::new(Mutex::new(None));

    struct PropCapture {
        seen: Arc<Mutex<Option<HashMap<String, DataValue>>>>,
    }
    struct NoopHandle;
    impl QueryHandle for NoopHandle {
        fn unregister(&mut self) {}
    }
    impl QueryInterpreter for PropCapture {
        fn start_query(
            &self,
            query: &CompiledQuery,
            props: &HashMap<String, DataValue>,
            on_result: ResultHandler,
        ) -> Result<Box<dyn QueryHandle>, ExecutionError> {
            *self.seen.lock() = Some(props.clone());
            for checksum in query.codepoint_checksums() {
                on_result(RawResult::new(checksum, json!(null)));
            }
            Ok(Box::new(NoopHandle))
        }
    }

    GraphBuilder::new()
        .add_query(
            q1,
            HashMap::new(),
            HashMap::from([("name".to_string(), Value::from("alice"))]),
        )
        .build(Arc::new(PropCapture {
            seen: Arc::clone(&seen_props),
        }))
        .execute()
        .expect("graph execution failed");

    let props = seen_props.lock().take().expect("interpreter never invoked");
    assert_eq!(props["name"], DataValue::value(json!("alice")));
}

#[test]
fn test_timed_out_query_does_not_block_others() {
    let stuck = Arc::new(CompiledQuery::new("stuck").with_entrypoint("c1"));
    let healthy = Arc::new(CompiledQuery::new("healthy").with_entrypoint("c2"));
    let inner = ScriptedInterpreter::new(HashMap::from([
        ("stuck".to_string(), Script::Silent),
        (
            "healthy".to_string(),
            Script::Report(vec![RawResult::new("c2", json!("done"))]),
        ),
    ]));
    let unregistered = Arc::new(Mutex::new(Vec::new()));
    let interpreter = TrackingInterpreter {
        inner: Arc::clone(&inner),
        unregistered: Arc::clone(&unregistered),
    };

    let results = GraphBuilder::new()
        .add_query(stuck, HashMap::new(), HashMap::new())
        .add_query(healthy, HashMap::new(), HashMap::new())
        .collect_datapoint("c1")
        .collect_datapoint("c2")
        .with_query_timeout(Duration::from_millis(50))
        .build(Arc::new(interpreter))
        .execute()
        .expect("graph execution failed");

    assert_eq!(results["c2"].data.value, json!("done"));
    let error = results["c1"].data.error.as_deref().expect("expected error");
    assert!(error.contains("timed out"));
    assert!(unregistered.lock().contains(&"stuck".to_string()));
}

#[test]
fn test_fatal_start_error_aborts_execution() {
    let q1 = Arc::new(CompiledQuery::new("q1").with_entrypoint("c1"));
    let interpreter = ScriptedInterpreter::new(HashMap::from([(
        "q1".to_string(),
        Script::Fail("runtime unavailable".to_string()),
    )]));

    let err = GraphBuilder::new()
        .add_query(q1, HashMap::new(), HashMap::new())
        .build(interpreter as Arc<dyn QueryInterpreter>)
        .execute()
        .expect_err("expected execution to fail");

    match err {
        ExecutionError::QueryStart { query_id, message } => {
            assert_eq!(query_id, "q1");
            assert!(message.contains("runtime unavailable"));
        }
        other => panic!("expected QueryStart error, got {other:?}"),
    }
}

#[test]
fn test_collectors_receive_flushed_batches() {
    let q1 = Arc::new(CompiledQuery::new("q1").with_entrypoint("c1"));
    let interpreter = ScriptedInterpreter::new(HashMap::from([(
        "q1".to_string(),
        Script::Report(vec![RawResult::new("c1", json!(42))]),
    )]));

    let sink: Arc<Mutex<Vec<RawResult>>> = Arc::new(Mutex::new(Vec::new()));
    let sink_inner = Arc::clone(&sink);

    GraphBuilder::new()
        .add_query(q1, HashMap::new(), HashMap::new())
        .collect_datapoint("c1")
        .add_collector(Arc::new(FuncCollector::new(move |results: &[RawResult]| {
            sink_inner.lock().extend_from_slice(results);
        })))
        .build(interpreter as Arc<dyn QueryInterpreter>)
        .execute()
        .expect("graph execution failed");

    let seen = sink.lock();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].checksum, "c1");
    assert_eq!(seen[0].data.value, json!(42));
}
