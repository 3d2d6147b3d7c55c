//! The execution manager: a single worker that runs queued queries.
//!
//! The manager owns the boundary to the external query interpreter. It
//! pulls runnable queries off the run queue, resolves their properties,
//! starts the interpreter, and forwards every produced result to the
//! executor's result channel. A per-query timeout bounds how long the
//! manager waits for all promised checksums to report.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, warn};

use crate::error::ExecutionError;
use crate::query::CompiledQuery;
use crate::result::{DataValue, RawResult};
use crate::types::Checksum;
use crate::waitgroup::WaitGroup;

/// Callback invoked by the interpreter once per produced result.
///
/// May be called from interpreter-internal threads.
pub type ResultHandler = Arc<dyn Fn(RawResult) + Send + Sync>;

/// The external bytecode interpreter boundary.
///
/// Implementations begin asynchronous execution of a compiled query and
/// invoke the provided handler once per produced result (out-of-order and
/// duplicate reports are tolerated by the caller).
pub trait QueryInterpreter: Send + Sync {
    /// Starts executing a query against the implementation's runtime.
    ///
    /// A fatal startup failure aborts the entire graph run; per-checksum
    /// failures should instead be reported through `on_result` as error
    /// results.
    fn start_query(
        &self,
        query: &CompiledQuery,
        props: &HashMap<String, DataValue>,
        on_result: ResultHandler,
    ) -> Result<Box<dyn QueryHandle>, ExecutionError>;
}

/// A handle to one running query.
///
/// `unregister` is called exactly once and must release all
/// interpreter-side resources synchronously.
pub trait QueryHandle: Send {
    fn unregister(&mut self);
}

/// Releases the interpreter handle on every exit path, including timeout
/// and error.
struct HandleGuard {
    handle: Box<dyn QueryHandle>,
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.handle.unregister();
    }
}

/// The unit of work handed to the execution manager.
pub struct RunQueueItem {
    pub query: Arc<CompiledQuery>,
    pub props: HashMap<String, DataValue>,
}

/// A single long-lived worker consuming the run queue.
pub(crate) struct ExecutionManager {
    interpreter: Arc<dyn QueryInterpreter>,
    run_queue: Receiver<RunQueueItem>,
    results: Sender<RawResult>,
    errors: Sender<ExecutionError>,
    query_timeout: Duration,
}

impl ExecutionManager {
    pub(crate) fn new(
        interpreter: Arc<dyn QueryInterpreter>,
        run_queue: Receiver<RunQueueItem>,
        results: Sender<RawResult>,
        errors: Sender<ExecutionError>,
        query_timeout: Duration,
    ) -> Self {
        Self {
            interpreter,
            run_queue,
            results,
            errors,
            query_timeout,
        }
    }

    /// Starts the worker thread.
    ///
    /// The worker exits when the run queue disconnects (all execution-query
    /// nodes dropped) or when a fatal error occurs.
    pub(crate) fn spawn(self) -> thread::JoinHandle<()> {
        thread::spawn(move || self.run())
    }

    fn run(self) {
        while let Ok(item) = self.run_queue.recv() {
            if let Err(err) = self.execute_query(item) {
                let _ = self.errors.send(err);
                return;
            }
        }
    }

    fn execute_query(&self, item: RunQueueItem) -> Result<(), ExecutionError> {
        let checksums: HashSet<Checksum> = item.query.codepoint_checksums().into_iter().collect();

        // A property that failed to resolve poisons every checksum this
        // query would have reported; the query itself is never executed.
        for (name, value) in &item.props {
            if let Some(err) = &value.error {
                debug!(query_id = %item.query.id, property = %name, "property resolution failed, skipping query");
                for checksum in &checksums {
                    let res = RawResult::error(
                        checksum.clone(),
                        format!("failed to resolve property {name}: {err}"),
                    );
                    if self.results.send(res).is_err() {
                        return Ok(());
                    }
                }
                return Ok(());
            }
        }

        let wg = Arc::new(WaitGroup::new());
        for checksum in &checksums {
            wg.add(checksum.clone());
        }

        let handler: ResultHandler = {
            let results = self.results.clone();
            let wg = Arc::clone(&wg);
            let expected = checksums.clone();
            Arc::new(move |res: RawResult| {
                let checksum = res.checksum.clone();
                let _ = results.send(res);
                if expected.contains(&checksum) {
                    wg.done(&checksum);
                }
            })
        };

        let handle = self
            .interpreter
            .start_query(&item.query, &item.props, handler)?;
        let guard = HandleGuard { handle };

        if wg.wait_timeout(self.query_timeout) {
            return Ok(());
        }

        let unreported = wg.decommission();
        warn!(
            query_id = %item.query.id,
            checksums = ?unreported,
            "query timed out before reporting all datapoints"
        );
        // Release the interpreter handle before publishing the synthesized
        // errors: late reports from this query must not race the timeout
        drop(guard);
        for checksum in unreported {
            let res = RawResult::error(checksum, format!("query {} timed out", item.query.id));
            let _ = self.results.send(res);
        }

        Ok(())
    }
}
