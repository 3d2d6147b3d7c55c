//! The compiled query artifact consumed by the graph builder.
//!
//! A [`CompiledQuery`] is produced by an external compiler and treated as
//! opaque here: the scheduler only needs its identity, the checksums it
//! promises to report, its minimum-runtime-version requirement, and the
//! checksums of the properties it depends on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::{Checksum, QueryId};

/// A compiled, content-addressed query.
///
/// The scheduler never looks inside the bytecode; execution is delegated to
/// a [`QueryInterpreter`](crate::QueryInterpreter).
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CompiledQuery {
    /// Content-derived identifier of this query.
    pub id: QueryId,
    /// Checksums of the query's final/user-visible result values.
    pub entrypoints: Vec<Checksum>,
    /// Checksums of intermediate values the query also exposes for reporting.
    pub datapoints: Vec<Checksum>,
    /// Minimum runtime version required to execute this query, if any.
    pub min_runtime_version: Option<String>,
    /// Map from property name to the checksum that resolves it.
    pub required_props: HashMap<String, Checksum>,
}

impl CompiledQuery {
    /// Creates a compiled query with the given identifier.
    pub fn new(id: impl Into<QueryId>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    /// Adds an entrypoint checksum.
    pub fn with_entrypoint(mut self, checksum: impl Into<Checksum>) -> Self {
        self.entrypoints.push(checksum.into());
        self
    }

    /// Adds a datapoint checksum.
    pub fn with_datapoint(mut self, checksum: impl Into<Checksum>) -> Self {
        self.datapoints.push(checksum.into());
        self
    }

    /// Sets the minimum runtime version requirement.
    pub fn with_min_runtime_version(mut self, version: impl Into<String>) -> Self {
        self.min_runtime_version = Some(version.into());
        self
    }

    /// Declares a required property resolved by the given checksum.
    pub fn with_required_prop(
        mut self,
        name: impl Into<String>,
        checksum: impl Into<Checksum>,
    ) -> Self {
        self.required_props.insert(name.into(), checksum.into());
        self
    }

    /// Returns every checksum this query promises to report: entrypoints
    /// followed by datapoints, in declared order.
    pub fn codepoint_checksums(&self) -> Vec<Checksum> {
        let mut checksums = self.entrypoints.clone();
        checksums.extend(self.datapoints.iter().cloned());
        checksums
    }
}
