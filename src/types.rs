//! Core type definitions for the query execution graph.
//!
//! This module defines the identifier aliases and the dynamic value kinds
//! used throughout the scheduler.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Content-derived identifier for one reportable unit of a compiled query
/// (an entrypoint or a datapoint).
pub type Checksum = String;

/// Unique identifier for a node in the execution graph.
///
/// Datapoint nodes use their checksum as their node ID; execution-query
/// nodes use a kind-prefixed query ID; the collector and finisher nodes
/// use reserved singleton IDs.
pub type NodeId = String;

/// Stable identifier of a compiled query artifact.
pub type QueryId = String;

/// The runtime kind of a dynamic query value.
///
/// Compiled queries may declare an expected kind for a datapoint checksum;
/// when the reported value's kind differs, the datapoint node casts the
/// value before storing it (see [`cast_value`]).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ValueKind {
    Null,
    Bool,
    Int,
    Float,
    String,
    Array,
    Object,
}

/// Returns the [`ValueKind`] of a dynamic value.
pub fn value_kind(value: &Value) -> ValueKind {
    match value {
        Value::Null => ValueKind::Null,
        Value::Bool(_) => ValueKind::Bool,
        Value::Number(n) => {
            if n.is_f64() {
                ValueKind::Float
            } else {
                ValueKind::Int
            }
        }
        Value::String(_) => ValueKind::String,
        Value::Array(_) => ValueKind::Array,
        Value::Object(_) => ValueKind::Object,
    }
}

/// Casts a dynamic value to the given kind using loose coercion rules.
///
/// Coercions mirror the query runtime's conversions: truthiness for bools,
/// numeric parsing for ints/floats, stringification for strings, and
/// single-element wrapping for arrays. Values that cannot be sensibly
/// converted are returned unchanged.
pub fn cast_value(value: Value, kind: ValueKind) -> Value {
    match kind {
        ValueKind::Null => Value::Null,
        ValueKind::Bool => Value::Bool(truthy(&value)),
        ValueKind::Int => match &value {
            Value::Number(n) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f as i64))
                .map(Value::from)
                .unwrap_or(value),
            Value::String(s) => s.parse::<i64>().map(Value::from).unwrap_or(value),
            Value::Bool(b) => Value::from(*b as i64),
            _ => value,
        },
        ValueKind::Float => match &value {
            Value::Number(n) => n.as_f64().map(Value::from).unwrap_or(value),
            Value::String(s) => s.parse::<f64>().map(Value::from).unwrap_or(value),
            _ => value,
        },
        ValueKind::String => match value {
            Value::String(_) => value,
            Value::Null => Value::String(String::new()),
            other => Value::String(other.to_string()),
        },
        ValueKind::Array => match value {
            Value::Array(_) => value,
            other => Value::Array(vec![other]),
        },
        ValueKind::Object => value,
    }
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}
