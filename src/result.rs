//! Result types produced by query execution.
//!
//! A [`RawResult`] is the unit of output flowing from the interpreter into
//! the execution graph: one value (or error) keyed by the checksum it
//! satisfies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{value_kind, Checksum, ValueKind};

/// One produced value or error, without its checksum.
///
/// Resolved query properties are also represented as `DataValue`s so that a
/// property carrying an error can poison the queries depending on it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataValue {
    /// The produced value. `Null` when the result is an error.
    pub value: Value,
    /// The error message, if this result represents a failure.
    pub error: Option<String>,
}

impl DataValue {
    /// Creates a successful data value.
    pub fn value(value: impl Into<Value>) -> Self {
        Self {
            value: value.into(),
            error: None,
        }
    }

    /// Creates an error data value.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            value: Value::Null,
            error: Some(message.into()),
        }
    }

    /// Returns true if this data value carries an error.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Returns the runtime kind of the carried value.
    pub fn kind(&self) -> ValueKind {
        value_kind(&self.value)
    }
}

/// A single execution result keyed by the checksum it satisfies.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RawResult {
    /// The checksum this result reports.
    pub checksum: Checksum,
    /// The value or error that was produced.
    pub data: DataValue,
}

impl RawResult {
    /// Creates a successful result for the given checksum.
    pub fn new(checksum: impl Into<Checksum>, value: impl Into<Value>) -> Self {
        Self {
            checksum: checksum.into(),
            data: DataValue::value(value),
        }
    }

    /// Creates an error result for the given checksum.
    pub fn error(checksum: impl Into<Checksum>, message: impl Into<String>) -> Self {
        Self {
            checksum: checksum.into(),
            data: DataValue::error(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_data_value_success() {
        let dv = DataValue::value(json!(42));
        assert!(!dv.is_error());
        assert_eq!(dv.kind(), ValueKind::Int);
        assert_eq!(dv.value, json!(42));
    }

    #[test]
    fn test_data_value_error() {
        let dv = DataValue::error("boom");
        assert!(dv.is_error());
        assert_eq!(dv.value, Value::Null);
        assert_eq!(dv.error.as_deref(), Some("boom"));
    }

    #[test]
    fn test_raw_result_serialization() {
        let res = RawResult::new("checksum1", json!({"key": "value"}));
        let encoded = serde_json::to_string(&res).unwrap();
        let decoded: RawResult = serde_json::from_str(&encoded).unwrap();
        assert_eq!(res, decoded);
    }
}
