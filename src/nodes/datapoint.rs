//! The datapoint node: holds the first-received result for one checksum.

use crate::nodes::Envelope;
use crate::result::RawResult;
use crate::types::{cast_value, ValueKind};

/// Node behavior for a single reportable checksum.
///
/// Datapoints are at-most-one-write: the first result recorded for the
/// checksum is the value reported for the rest of the run; later results
/// are discarded without conflict resolution.
#[derive(Default)]
pub(crate) struct DatapointNode {
    expected_kind: Option<ValueKind>,
    is_reported: bool,
    invalidated: bool,
    res: Option<RawResult>,
}

impl DatapointNode {
    /// Creates a datapoint node, optionally with an expected value kind and
    /// a preset result (used for synthesized errors such as unsupported
    /// runtime versions).
    pub(crate) fn new(expected_kind: Option<ValueKind>, res: Option<RawResult>) -> Self {
        Self {
            expected_kind,
            is_reported: res.is_some(),
            invalidated: false,
            res,
        }
    }

    pub(crate) fn initialize(&mut self) {
        if let Some(res) = self.res.take() {
            self.set(res);
        }
    }

    /// Saves the datapoint's result.
    pub(crate) fn consume(&mut self, _from: &str, data: &Envelope) {
        if self.is_reported {
            // No change detection: the first reported value is the value
            // used for the rest of the run
            return;
        }
        let Some(res) = &data.res else {
            // Empty envelopes come from execution-query nodes keeping the
            // graph connected; they carry nothing to store
            return;
        };

        self.set(res.clone());
    }

    fn set(&mut self, res: RawResult) {
        self.invalidated = true;
        self.is_reported = true;

        let needs_cast = match self.expected_kind {
            Some(expected) => {
                !res.data.is_error()
                    && res.data.kind() != ValueKind::Null
                    && res.data.kind() != expected
            }
            None => false,
        };

        if needs_cast {
            let expected = self.expected_kind.expect("checked above");
            let mut cast = res;
            cast.data.value = cast_value(cast.data.value, expected);
            self.res = Some(cast);
        } else {
            self.res = Some(res);
        }
    }

    /// Passes on the stored result once, then goes quiet.
    pub(crate) fn recalculate(&mut self) -> Option<Envelope> {
        if !self.invalidated {
            return None;
        }

        self.invalidated = false;

        Some(Envelope {
            res: self.res.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::nodes::EXECUTOR_ID;

    #[test]
    fn test_no_recalculation_without_data() {
        let mut node = DatapointNode::default();
        node.initialize();
        assert!(node.recalculate().is_none());
    }

    #[test]
    fn test_recalculates_with_preset_data() {
        let mut node = DatapointNode::new(None, Some(RawResult::new("checksum", json!(true))));

        node.initialize();
        let data = node.recalculate().expect("expected notification");
        let res = data.res.expect("expected result");

        assert_eq!(res.checksum, "checksum");
        assert_eq!(res.data.value, json!(true));
    }

    #[test]
    fn test_ignores_empty_envelopes() {
        let mut node = DatapointNode::default();
        node.initialize();
        node.recalculate();

        node.consume(EXECUTOR_ID, &Envelope::empty());
        assert!(node.recalculate().is_none());
    }

    #[test]
    fn test_recalculates_when_data_arrives() {
        let mut node = DatapointNode::default();
        node.initialize();
        node.recalculate();

        node.consume(
            EXECUTOR_ID,
            &Envelope::with_result(RawResult::new("checksum", json!(true))),
        );
        let data = node.recalculate().expect("expected notification");
        assert_eq!(data.res.unwrap().data.value, json!(true));
    }

    #[test]
    fn test_first_write_wins() {
        let mut node = DatapointNode::new(None, Some(RawResult::new("checksum", json!(true))));

        node.initialize();
        let data = node.recalculate();
        assert!(data.is_some());

        node.consume(
            EXECUTOR_ID,
            &Envelope::with_result(RawResult::new("checksum", json!(false))),
        );
        // The second write is discarded, nothing new to report
        assert!(node.recalculate().is_none());
    }

    #[test]
    fn test_casts_to_expected_kind() {
        let mut node = DatapointNode::new(Some(ValueKind::Bool), None);
        node.initialize();
        node.recalculate();

        node.consume(
            EXECUTOR_ID,
            &Envelope::with_result(RawResult::new("checksum", json!("hello"))),
        );
        let data = node.recalculate().expect("expected notification");
        assert_eq!(data.res.unwrap().data.value, json!(true));
    }

    #[test]
    fn test_skips_cast_when_kinds_match() {
        let mut node = DatapointNode::new(Some(ValueKind::String), None);
        node.initialize();
        node.recalculate();

        node.consume(
            EXECUTOR_ID,
            &Envelope::with_result(RawResult::new("checksum", json!("hello"))),
        );
        let data = node.recalculate().expect("expected notification");
        assert_eq!(data.res.unwrap().data.value, json!("hello"));
    }

    #[test]
    fn test_skips_cast_on_error_results() {
        let mut node = DatapointNode::new(Some(ValueKind::String), None);
        node.initialize();
        node.recalculate();

        node.consume(
            EXECUTOR_ID,
            &Envelope::with_result(RawResult::error("checksum", "error happened")),
        );
        let data = node.recalculate().expect("expected notification");
        let res = data.res.unwrap();
        assert_eq!(res.data.error.as_deref(), Some("error happened"));
        assert_eq!(res.data.value, serde_json::Value::Null);
    }

    #[test]
    fn test_skips_cast_on_null_values() {
        let mut node = DatapointNode::new(Some(ValueKind::Bool), None);
        node.initialize();
        node.recalculate();

        node.consume(
            EXECUTOR_ID,
            &Envelope::with_result(RawResult::new("checksum", json!(null))),
        );
        let data = node.recalculate().expect("expected notification");
        assert_eq!(data.res.unwrap().data.value, json!(null));
    }
}
