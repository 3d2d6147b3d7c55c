//! A keyed wait group with forced unblocking.
//!
//! Standard wait groups count anonymous work items and do not support
//! releasing waiters early. The execution manager needs both: it registers
//! every checksum a query promises to report, tolerates duplicate
//! completions (interpreters may report the same checksum more than once
//! per run), and must be able to give up on a slow query without losing
//! track of which checksums never reported.
//!
//! Misuse of the group is a bug in the caller's checksum bookkeeping, not a
//! runtime condition, so `add` of an already-active ID and `done` of a
//! never-added ID both panic.

use std::collections::HashSet;
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct WaitGroupState {
    active: HashSet<String>,
    completed: HashSet<String>,
    decommissioned: bool,
}

/// Tracks completion of a named set of in-flight work items.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use queryflow::WaitGroup;
///
/// let wg = WaitGroup::new();
/// wg.add("checksum1");
/// wg.done("checksum1");
/// assert!(wg.wait_timeout(Duration::from_millis(10)));
/// ```
#[derive(Default)]
pub struct WaitGroup {
    state: Mutex<WaitGroupState>,
    cond: Condvar,
}

impl WaitGroup {
    /// Creates an empty wait group.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a work item.
    ///
    /// # Panics
    ///
    /// Panics if `id` is already active.
    pub fn add(&self, id: impl Into<String>) {
        let id = id.into();
        let mut state = self.state.lock();
        if !state.active.insert(id.clone()) {
            panic!("wait group: duplicate add of active id {id:?}");
        }
    }

    /// Marks a work item as completed.
    ///
    /// Completing an already-completed item is a no-op, so duplicate
    /// reports for the same checksum are tolerated. Completions after
    /// decommissioning are also no-ops.
    ///
    /// # Panics
    ///
    /// Panics if `id` was never added.
    pub fn done(&self, id: &str) {
        let mut state = self.state.lock();
        if state.active.remove(id) {
            state.completed.insert(id.to_string());
            if state.active.is_empty() {
                self.cond.notify_all();
            }
        } else if !state.completed.contains(id) && !state.decommissioned {
            panic!("wait group: done called for unknown id {id:?}");
        }
    }

    /// Blocks until every active work item completes or the group is
    /// decommissioned.
    pub fn wait(&self) {
        let mut state = self.state.lock();
        while !state.active.is_empty() && !state.decommissioned {
            self.cond.wait(&mut state);
        }
    }

    /// Blocks until every active work item completes, the group is
    /// decommissioned, or the timeout elapses.
    ///
    /// Returns true if all work items completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut state = self.state.lock();
        while !state.active.is_empty() && !state.decommissioned {
            if self.cond.wait_for(&mut state, timeout).timed_out() {
                break;
            }
        }
        state.active.is_empty()
    }

    /// Forcibly releases all waiters without normal completion.
    ///
    /// Returns the sorted list of work items that were still active. After
    /// decommissioning, late completions for those items are ignored.
    pub fn decommission(&self) -> Vec<String> {
        let mut state = self.state.lock();
        state.decommissioned = true;
        let mut still_active: Vec<String> = state.active.drain().collect();
        still_active.sort();
        self.cond.notify_all();
        still_active
    }
}
