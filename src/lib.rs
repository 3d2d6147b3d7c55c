//! An execution graph scheduler for compiled, content-addressed queries.
//!
//! Queries arrive as opaque [`CompiledQuery`] artifacts that promise to
//! report a set of checksums and may depend on properties resolved by other
//! queries' checksums. The [`GraphBuilder`] wires them into a directed graph
//! of nodes (execution queries, datapoints, a result collector, and a
//! completion detector), and [`GraphExecutor::execute`] drives the graph
//! through incremental recalculation rounds until every expected datapoint
//! has reported.
//!
//! Actual query execution is delegated to a [`QueryInterpreter`]
//! implementation; the scheduler's job is ordering, deduplication,
//! property resolution, timeout handling, and termination detection.
//!
//! # Example
//!
//! ```
//! use std::collections::HashMap;
//! use std::sync::Arc;
//!
//! use queryflow::{
//!     CompiledQuery, DataValue, ExecutionError, GraphBuilder, QueryHandle,
//!     QueryInterpreter, RawResult, ResultHandler,
//! };
//!
//! struct EchoInterpreter;
//!
//! struct EchoHandle;
//!
//! impl QueryHandle for EchoHandle {
//!     fn unregister(&mut self) {}
//! }
//!
//! impl QueryInterpreter for EchoInterpreter {
//!     fn start_query(
//!         &self,
//!         query: &CompiledQuery,
//!         _props: &HashMap<String, DataValue>,
//!         on_result: ResultHandler,
//!     ) -> Result<Box<dyn QueryHandle>, ExecutionError> {
//!         for checksum in query.codepoint_checksums() {
//!             on_result(RawResult::new(checksum, serde_json::json!("ok")));
//!         }
//!         Ok(Box::new(EchoHandle))
//!     }
//! }
//!
//! let query = Arc::new(CompiledQuery::new("example").with_entrypoint("c1"));
//! let results = GraphBuilder::new()
//!     .add_query(query, HashMap::new(), HashMap::new())
//!     .collect_datapoint("c1")
//!     .build(Arc::new(EchoInterpreter))
//!     .execute()?;
//!
//! assert_eq!(results["c1"].data.value, serde_json::json!("ok"));
//! # Ok::<(), ExecutionError>(())
//! ```

mod builder;
mod collectors;
mod error;
mod graph;
mod manager;
mod nodes;
mod query;
mod result;
mod types;
mod waitgroup;

pub use builder::GraphBuilder;
pub use collectors::{
    BufferedCollector, DatapointCollector, FnProgressReporter, FuncCollector,
    NoopProgressReporter, ProgressReporter,
};
pub use error::ExecutionError;
pub use graph::GraphExecutor;
pub use manager::{QueryHandle, QueryInterpreter, ResultHandler, RunQueueItem};
pub use query::CompiledQuery;
pub use result::{DataValue, RawResult};
pub use types::{cast_value, value_kind, Checksum, NodeId, QueryId, ValueKind};
pub use waitgroup::WaitGroup;
