//! Error types for graph execution.

use thiserror::Error;

use crate::types::QueryId;

/// Fatal faults that abort a graph run.
///
/// Local failures (unresolved properties, version incompatibilities,
/// per-query timeouts) are surfaced as per-checksum error results instead
/// and never abort the run.
#[derive(Error, Debug)]
pub enum ExecutionError {
    /// The interpreter failed to start executing a query.
    #[error("failed to start query {query_id}: {message}")]
    QueryStart { query_id: QueryId, message: String },

    /// The result channel disconnected before the graph completed.
    #[error("result channel closed before all datapoints were collected")]
    ResultChannelClosed,
}
