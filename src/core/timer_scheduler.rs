//! Wall-clock scheduler backed by a dedicated timer thread.
//!
//! Implements the same [`Scheduler`] contract as the virtual variant, so
//! code exercised deterministically in tests runs unchanged in production.
//! One named thread owns the event queue, sleeps on a condvar until the
//! earliest due entry, and re-validates after every wake: a newly scheduled
//! earlier entry or a shutdown request may have arrived while it slept.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace, warn};

use crate::core::event_queue::{EventQueue, Timed};
use crate::core::scheduler::{Action, ActionCell, CancelHandle, QueuedAction, Scheduler};

struct TimerState {
    queue: EventQueue<QueuedAction>,
    sequence: u64,
    shutdown: bool,
}

struct TimerShared {
    origin: Instant,
    state: Mutex<TimerState>,
    wake: Condvar,
}

impl TimerShared {
    fn now_ms(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Wall-clock [`Scheduler`] with millisecond ticks since construction.
pub struct TimerScheduler {
    shared: Arc<TimerShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl Default for TimerScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl TimerScheduler {
    /// Create the scheduler and spawn its timer thread.
    #[must_use]
    pub fn new() -> Self {
        let shared = Arc::new(TimerShared {
            origin: Instant::now(),
            state: Mutex::new(TimerState {
                queue: EventQueue::new(),
                sequence: 0,
                shutdown: false,
            }),
            wake: Condvar::new(),
        });
        let worker = {
            let shared = Arc::clone(&shared);
            thread::Builder::new()
                .name("pms-timer".into())
                .spawn(move || timer_loop(&shared))
                .expect("failed to spawn timer thread")
        };
        Self {
            shared,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Stop the timer thread and join it. Queued actions that have not come
    /// due are dropped. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.shared.wake.notify_all();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                warn!("timer thread panicked during shutdown");
            }
        }
        debug!("timer scheduler shut down");
    }
}

impl Drop for TimerScheduler {
    fn drop(&mut self) {
        // Signal but do not join: a stuck action body must not hang the
        // dropping thread. Explicit shutdown() joins.
        let mut state = self.shared.state.lock();
        if !state.shutdown {
            state.shutdown = true;
            drop(state);
            self.shared.wake.notify_all();
        }
    }
}

impl Scheduler for TimerScheduler {
    fn now(&self) -> u64 {
        self.shared.now_ms()
    }

    /// Schedule `action` to run `due` milliseconds from now on the timer
    /// thread. After shutdown the action is dropped and the returned handle
    /// is already cancelled.
    fn schedule(&self, due: u64, action: Action) -> CancelHandle {
        let cancel = CancelHandle::new();
        let run_at = self.shared.now_ms().saturating_add(due);
        {
            let mut state = self.shared.state.lock();
            if state.shutdown {
                cancel.cancel();
                return cancel;
            }
            let sequence = state.sequence;
            state.sequence += 1;
            trace!(run_at, sequence, "action scheduled on timer");
            state.queue.enqueue(Timed::new(
                run_at,
                sequence,
                QueuedAction {
                    cancel: cancel.clone(),
                    action: ActionCell(action),
                },
            ));
        }
        self.shared.wake.notify_one();
        cancel
    }
}

fn timer_loop(shared: &TimerShared) {
    debug!("timer thread started");
    loop {
        let entry = {
            let mut state = shared.state.lock();
            loop {
                if state.shutdown {
                    debug!("timer thread exiting");
                    return;
                }
                let Ok(next) = state.queue.peek() else {
                    shared.wake.wait(&mut state);
                    continue;
                };
                let due = next.due;
                let now = shared.now_ms();
                if due > now {
                    let timeout = Duration::from_millis(due - now);
                    shared.wake.wait_for(&mut state, timeout);
                    // Re-validate: an earlier entry or shutdown may have
                    // arrived while sleeping.
                    continue;
                }
                break;
            }
            let Some(entry) = state.queue.pop() else {
                continue;
            };
            entry
        };
        if entry.value.cancel.is_cancelled() {
            trace!(due = entry.due, "skipped cancelled timer action");
            continue;
        }
        (entry.value.action.0)();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use super::*;
    use crate::core::scheduler::SchedulerExt;

    fn wait_until(deadline_ms: u64, condition: impl Fn() -> bool) -> bool {
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(deadline_ms) {
            if condition() {
                return true;
            }
            thread::sleep(Duration::from_millis(1));
        }
        condition()
    }

    #[test]
    fn runs_immediate_action() {
        let scheduler = TimerScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            scheduler.schedule_fn(0, move || {
                count.fetch_add(1, Ordering::Relaxed);
            });
        }
        assert!(wait_until(2_000, || count.load(Ordering::Relaxed) == 1));
        scheduler.shutdown();
    }

    #[test]
    fn delayed_actions_run_in_due_order() {
        let scheduler = TimerScheduler::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for (due, tag) in [(60u64, "late"), (5, "early")] {
            let log = Arc::clone(&log);
            scheduler.schedule_fn(due, move || log.lock().push(tag));
        }
        assert!(wait_until(2_000, || log.lock().len() == 2));
        assert_eq!(*log.lock(), vec!["early", "late"]);
        scheduler.shutdown();
    }

    #[test]
    fn cancel_prevents_execution() {
        let scheduler = TimerScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));
        let handle = {
            let count = Arc::clone(&count);
            scheduler.schedule_fn(30, move || {
                count.fetch_add(1, Ordering::Relaxed);
            })
        };
        handle.cancel();
        thread::sleep(Duration::from_millis(80));
        assert_eq!(count.load(Ordering::Relaxed), 0);
        scheduler.shutdown();
    }

    #[test]
    fn schedule_after_shutdown_is_cancelled() {
        let scheduler = TimerScheduler::new();
        scheduler.shutdown();
        let handle = scheduler.schedule_fn(0, || {});
        assert!(handle.is_cancelled());
    }
}
