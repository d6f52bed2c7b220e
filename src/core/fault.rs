//! Out-of-band fault collection for a group of producing tasks.
//!
//! Producer bodies never throw across the channel boundary. They record
//! failures here, and the merged stream replays everything at its true end,
//! after the consumer has observed every already-buffered item.

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

/// Shared fault sink for the producers feeding one merged stream.
#[derive(Default)]
pub struct TaskGroup {
    faults: Mutex<Vec<anyhow::Error>>,
    ended: AtomicBool,
    succeeded: AtomicBool,
}

impl TaskGroup {
    /// Create an empty group.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a producer-body failure. Safe to call from any worker thread;
    /// the failure is surfaced to the consumer only at stream end.
    pub fn report_fault(&self, error: anyhow::Error) {
        warn!(error = %error, "producer fault recorded");
        self.faults.lock().push(error);
    }

    /// True when at least one fault has been recorded.
    #[must_use]
    pub fn has_faults(&self) -> bool {
        !self.faults.lock().is_empty()
    }

    /// Mark the query finished. Called by the merged stream once every
    /// channel is retired. Idempotent; only the first call records the
    /// outcome.
    pub fn end_of_query(&self, success: bool) {
        if self.ended.swap(true, Ordering::AcqRel) {
            return;
        }
        self.succeeded.store(success, Ordering::Release);
        debug!(success, "query ended");
    }

    /// True once `end_of_query` has been called.
    #[must_use]
    pub fn is_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// True when the query ended without faults.
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.succeeded.load(Ordering::Acquire)
    }

    /// Take all recorded faults, leaving the group empty.
    pub fn drain_faults(&self) -> Vec<anyhow::Error> {
        std::mem::take(&mut *self.faults.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn faults_accumulate_until_drained() {
        let group = TaskGroup::new();
        assert!(!group.has_faults());
        group.report_fault(anyhow::anyhow!("first"));
        group.report_fault(anyhow::anyhow!("second"));
        assert!(group.has_faults());
        let drained = group.drain_faults();
        assert_eq!(drained.len(), 2);
        assert!(!group.has_faults());
    }

    #[test]
    fn end_of_query_records_first_outcome_only() {
        let group = TaskGroup::new();
        assert!(!group.is_ended());
        group.end_of_query(false);
        group.end_of_query(true);
        assert!(group.is_ended());
        assert!(!group.succeeded());
    }
}
