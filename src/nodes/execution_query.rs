//! The execution-query node: one compiled query pending execution.

use std::collections::HashMap;
use std::sync::Arc;

use crossbeam_channel::Sender;
use tracing::debug;

use crate::manager::RunQueueItem;
use crate::nodes::Envelope;
use crate::query::CompiledQuery;
use crate::result::DataValue;
use crate::types::Checksum;

/// One required property of a query, tagged with the checksum that
/// resolves it.
#[derive(Clone, Debug)]
struct QueryProperty {
    name: String,
    checksum: Checksum,
    value: Option<DataValue>,
    resolved: bool,
}

impl QueryProperty {
    fn resolve(&mut self, value: DataValue) {
        self.value = Some(value);
        self.resolved = true;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum RunState {
    NotReady,
    Ready,
    Executed,
}

/// Node behavior for a compiled query waiting on its properties.
///
/// The node transitions `NotReady -> Ready -> Executed`; `Executed` is
/// terminal, so a query is enqueued for execution at most once per run no
/// matter how often its dependencies re-resolve.
pub(crate) struct ExecutionQueryNode {
    query: Arc<CompiledQuery>,
    invalidated: bool,
    required_properties: HashMap<String, QueryProperty>,
    run_state: RunState,
    run_queue: Sender<RunQueueItem>,
}

impl ExecutionQueryNode {
    pub(crate) fn new(query: Arc<CompiledQuery>, run_queue: Sender<RunQueueItem>) -> Self {
        Self {
            query,
            invalidated: false,
            required_properties: HashMap::new(),
            run_state: RunState::NotReady,
            run_queue,
        }
    }

    /// Declares a property that must be resolved by the given checksum
    /// before the query can run.
    pub(crate) fn require_property(&mut self, name: impl Into<String>, checksum: impl Into<Checksum>) {
        let name = name.into();
        self.required_properties.insert(
            name.clone(),
            QueryProperty {
                name,
                checksum: checksum.into(),
                value: None,
                resolved: false,
            },
        );
    }

    /// Resolves a property with an externally supplied value.
    ///
    /// Values provided up front may cover properties that were never
    /// declared as checksum dependencies; those are stored as resolved
    /// without a checksum.
    pub(crate) fn resolve_property(&mut self, name: impl Into<String>, value: DataValue) {
        let name = name.into();
        match self.required_properties.get_mut(&name) {
            Some(prop) => prop.resolve(value),
            None => {
                self.required_properties.insert(
                    name.clone(),
                    QueryProperty {
                        name,
                        checksum: Checksum::new(),
                        value: Some(value),
                        resolved: true,
                    },
                );
            }
        }
    }

    pub(crate) fn initialize(&mut self) {
        self.update_run_state();
        if self.run_state == RunState::Ready {
            self.invalidated = true;
        }
    }

    /// Saves any received result that matches a required property.
    pub(crate) fn consume(&mut self, _from: &str, data: &Envelope) {
        if self.run_state == RunState::Executed {
            // Nothing can change once the query has been executed
            return;
        }

        if self.required_properties.is_empty() {
            self.invalidated = true;
        }

        if let Some(res) = &data.res {
            for prop in self.required_properties.values_mut() {
                if prop.checksum == res.checksum {
                    prop.resolve(res.data.clone());
                    self.invalidated = true;
                }
            }
        }
    }

    /// Checks whether all required properties are satisfied and, if the
    /// query just became runnable, enqueues it for execution.
    ///
    /// Always returns an empty envelope when invalidated: the downstream
    /// datapoint nodes ignore the message, but the contract is that any
    /// state change pushes a notification through the graph.
    pub(crate) fn recalculate(&mut self) -> Option<Envelope> {
        if !self.invalidated {
            return None;
        }

        self.update_run_state();
        self.invalidated = false;

        if self.run_state == RunState::Ready {
            self.run();
        }

        Some(Envelope::empty())
    }

    fn run(&mut self) {
        let mut props = HashMap::with_capacity(self.required_properties.len());
        for prop in self.required_properties.values() {
            if let Some(value) = &prop.value {
                props.insert(prop.name.clone(), value.clone());
            }
        }

        self.run_state = RunState::Executed;

        let item = RunQueueItem {
            query: Arc::clone(&self.query),
            props,
        };
        if self.run_queue.send(item).is_err() {
            debug!(query_id = %self.query.id, "run queue closed, dropping query");
        }
    }

    fn update_run_state(&mut self) {
        if self.run_state == RunState::Ready {
            return;
        }

        let runnable = self.required_properties.values().all(|p| p.resolved);
        self.run_state = if runnable {
            RunState::Ready
        } else {
            RunState::NotReady
        };
    }
}
