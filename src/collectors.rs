//! Result sinks and progress reporting.
//!
//! Collectors receive batches of finished results from the graph's
//! datapoint-collector node. The [`BufferedCollector`] accumulates results
//! by checksum for retrieval after the run; the [`FuncCollector`] adapts a
//! plain closure. Both may be invoked while the executor's event loop is
//! running, so implementations must be thread-safe.

use std::collections::HashMap;

use parking_lot::Mutex;

use crate::result::RawResult;
use crate::types::Checksum;

/// A sink for batches of finished results.
pub trait DatapointCollector: Send + Sync {
    /// Accepts a batch of results. Called once per recalculation round that
    /// produced new datapoints.
    fn sink_data(&self, results: &[RawResult]);
}

/// Adapts a closure into a [`DatapointCollector`].
pub struct FuncCollector<F>
where
    F: Fn(&[RawResult]) + Send + Sync,
{
    func: F,
}

impl<F> FuncCollector<F>
where
    F: Fn(&[RawResult]) + Send + Sync,
{
    /// Creates a collector that forwards every batch to `func`.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> DatapointCollector for FuncCollector<F>
where
    F: Fn(&[RawResult]) + Send + Sync,
{
    fn sink_data(&self, results: &[RawResult]) {
        (self.func)(results);
    }
}

/// Buffers results by checksum.
///
/// The first result received for a checksum wins; later writes for the same
/// checksum are ignored, matching the at-most-one-write contract of
/// datapoint nodes.
#[derive(Default)]
pub struct BufferedCollector {
    results: Mutex<HashMap<Checksum, RawResult>>,
}

impl BufferedCollector {
    /// Creates an empty buffered collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of the buffered results.
    pub fn results(&self) -> HashMap<Checksum, RawResult> {
        self.results.lock().clone()
    }

    /// Drains and returns the buffered results.
    pub fn take_results(&self) -> HashMap<Checksum, RawResult> {
        std::mem::take(&mut *self.results.lock())
    }
}

impl DatapointCollector for BufferedCollector {
    fn sink_data(&self, results: &[RawResult]) {
        let mut buffer = self.results.lock();
        for res in results {
            buffer
                .entry(res.checksum.clone())
                .or_insert_with(|| res.clone());
        }
    }
}

/// Receives `(completed, total)` datapoint counts as collection progresses.
///
/// Invoked at least once per change in the completion count; not guaranteed
/// to be invoked for every individual datapoint.
pub trait ProgressReporter: Send + Sync {
    /// Reports that `completed` of `total` expected datapoints have arrived.
    fn progress(&self, completed: usize, total: usize);
}

/// A progress reporter that discards all updates.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProgressReporter;

impl ProgressReporter for NoopProgressReporter {
    fn progress(&self, _completed: usize, _total: usize) {}
}

/// Adapts a closure into a [`ProgressReporter`].
pub struct FnProgressReporter<F>
where
    F: Fn(usize, usize) + Send + Sync,
{
    func: F,
}

impl<F> FnProgressReporter<F>
where
    F: Fn(usize, usize) + Send + Sync,
{
    /// Creates a reporter that forwards every update to `func`.
    pub fn new(func: F) -> Self {
        Self { func }
    }
}

impl<F> ProgressReporter for FnProgressReporter<F>
where
    F: Fn(usize, usize) + Send + Sync,
{
    fn progress(&self, completed: usize, total: usize) {
        (self.func)(completed, total);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_func_collector_forwards_batches() {
        let count = AtomicUsize::new(0);
        let collector = FuncCollector::new(|results: &[RawResult]| {
            count.fetch_add(results.len(), Ordering::SeqCst);
        });

        collector.sink_data(&[
            RawResult::new("c1", json!(1)),
            RawResult::new("c2", json!(2)),
        ]);
        collector.sink_data(&[RawResult::new("c3", json!(3))]);

        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_buffered_collector_first_write_wins() {
        let collector = BufferedCollector::new();
        collector.sink_data(&[RawResult::new("c1", json!("first"))]);
        collector.sink_data(&[RawResult::new("c1", json!("second"))]);

        let results = collector.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results["c1"].data.value, json!("first"));
    }

    #[test]
    fn test_buffered_collector_take_drains() {
        let collector = BufferedCollector::new();
        collector.sink_data(&[RawResult::new("c1", json!(true))]);

        let taken = collector.take_results();
        assert_eq!(taken.len(), 1);
        assert!(collector.results().is_empty());
    }

    #[test]
    fn test_fn_progress_reporter() {
        let calls = AtomicUsize::new(0);
        let reporter = FnProgressReporter::new(|completed, total| {
            calls.fetch_add(1, Ordering::SeqCst);
            assert!(completed <= total);
        });
        reporter.progress(1, 2);
        reporter.progress(2, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
