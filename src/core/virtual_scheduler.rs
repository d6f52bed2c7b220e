//! Virtual clock scheduler for deterministic concurrency tests.
//!
//! Executes a program's scheduled actions on one logical thread under an
//! artificial, monotonically advancing clock. All "concurrent" producers and
//! consumers scheduled through this clock run in non-decreasing virtual-time
//! order, FIFO within the same instant, which makes interleavings
//! reproducible bit for bit while preserving the causal ordering contract a
//! real scheduler honors.
//!
//! Interior state lives behind a parking_lot mutex so programs can hold the
//! scheduler in an `Arc` across producer closures; determinism comes from
//! the single drain loop, not from thread exclusion.

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::core::event_queue::{EventQueue, Timed};
use crate::core::scheduler::{Action, ActionCell, CancelHandle, QueuedAction, Scheduler};

struct VirtualState {
    queue: EventQueue<QueuedAction>,
    ticks: u64,
    sequence: u64,
    draining: bool,
}

/// Single-threaded cooperative scheduler over a virtual clock.
pub struct VirtualScheduler {
    state: Mutex<VirtualState>,
}

impl Default for VirtualScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl VirtualScheduler {
    /// Create a scheduler with the clock at tick zero.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(VirtualState {
                queue: EventQueue::new(),
                ticks: 0,
                sequence: 0,
                draining: false,
            }),
        }
    }

    /// Drain the queue to completion.
    ///
    /// Pops the minimum entry, advances the clock to its due tick (never
    /// backward), and executes it unless cancelled. Actions scheduled while
    /// draining land in the same queue and are included in the same drain.
    /// A nested `run` call from inside an action is a no-op; the outer drain
    /// already covers the queue.
    pub fn run(&self) {
        {
            let mut state = self.state.lock();
            if state.draining {
                return;
            }
            state.draining = true;
        }
        debug!("virtual drain started");
        let mut executed = 0u64;
        loop {
            let entry = {
                let mut state = self.state.lock();
                match state.queue.pop() {
                    Some(entry) => {
                        if entry.due > state.ticks {
                            state.ticks = entry.due;
                        }
                        entry
                    }
                    None => {
                        state.draining = false;
                        break;
                    }
                }
            };
            if entry.value.cancel.is_cancelled() {
                trace!(due = entry.due, sequence = entry.sequence, "skipped cancelled action");
                continue;
            }
            (entry.value.action.0)();
            executed += 1;
        }
        debug!(executed, ticks = self.now(), "virtual drain finished");
    }

    /// Advance the clock without draining, simulating a consumer pause
    /// between checks. Saturates at `u64::MAX`.
    pub fn sleep(&self, ticks: u64) {
        let mut state = self.state.lock();
        state.ticks = state.ticks.saturating_add(ticks);
    }

    /// Number of actions still queued (cancelled entries included until
    /// their turn comes up).
    #[must_use]
    pub fn pending(&self) -> usize {
        self.state.lock().queue.len()
    }
}

impl Scheduler for VirtualScheduler {
    fn now(&self) -> u64 {
        self.state.lock().ticks
    }

    /// Schedule `action` at `due` virtual ticks from the current clock.
    ///
    /// A zero due time is coerced to one tick so an action scheduled for
    /// "now" is never observed before the caller's current statement
    /// completes; same-tick producers keep their causal ordering. The run
    /// tick saturates at `u64::MAX`.
    fn schedule(&self, due: u64, action: Action) -> CancelHandle {
        let cancel = CancelHandle::new();
        let mut state = self.state.lock();
        let due = due.max(1);
        let run_at = state.ticks.saturating_add(due);
        let sequence = state.sequence;
        state.sequence += 1;
        trace!(run_at, sequence, "action scheduled");
        state.queue.enqueue(Timed::new(
            run_at,
            sequence,
            QueuedAction {
                cancel: cancel.clone(),
                action: ActionCell(action),
            },
        ));
        cancel
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::core::scheduler::SchedulerExt;

    #[test]
    fn ties_execute_in_schedule_order() {
        let scheduler = VirtualScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (due, tag) in [(5, "a"), (5, "b"), (3, "c")] {
            let log = Arc::clone(&log);
            scheduler.schedule_fn(due, move || log.lock().push(tag));
        }
        scheduler.run();
        assert_eq!(*log.lock(), vec!["c", "a", "b"]);
    }

    #[test]
    fn zero_due_runs_one_tick_later() {
        let scheduler = VirtualScheduler::new();
        let observed = Arc::new(Mutex::new(None));
        {
            let observed = Arc::clone(&observed);
            scheduler.schedule_fn(0, move || *observed.lock() = Some(()));
        }
        scheduler.run();
        assert_eq!(scheduler.now(), 1);
        assert!(observed.lock().is_some());
    }

    #[test]
    fn sleep_advances_clock_without_running() {
        let scheduler = VirtualScheduler::new();
        let ran = Arc::new(Mutex::new(false));
        {
            let ran = Arc::clone(&ran);
            scheduler.schedule_fn(5, move || *ran.lock() = true);
        }
        scheduler.sleep(10);
        assert_eq!(scheduler.now(), 10);
        assert!(!*ran.lock());
        scheduler.run();
        // The clock never moves backward to a stale due tick.
        assert_eq!(scheduler.now(), 10);
        assert!(*ran.lock());
    }

    #[test]
    fn cancelled_action_is_skipped() {
        let scheduler = VirtualScheduler::new();
        let ran = Arc::new(Mutex::new(false));
        let handle = {
            let ran = Arc::clone(&ran);
            scheduler.schedule_fn(1, move || *ran.lock() = true)
        };
        handle.cancel();
        scheduler.run();
        assert!(!*ran.lock());
    }

    #[test]
    fn saturating_due_does_not_wrap() {
        let scheduler = VirtualScheduler::new();
        let ran = Arc::new(Mutex::new(false));
        {
            let ran = Arc::clone(&ran);
            scheduler.schedule_fn(u64::MAX, move || *ran.lock() = true);
        }
        scheduler.run();
        assert_eq!(scheduler.now(), u64::MAX);
        assert!(*ran.lock());
    }
}
