//! Scheduler contract shared by the virtual and wall-clock implementations.
//!
//! Producer and consumer code takes `&dyn Scheduler` (or a generic bound)
//! and is portable between deterministic tests and production. There are no
//! process-wide default instances; schedulers are constructed explicitly and
//! passed by reference with conventional lifetime scoping.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A scheduled action body. Boxed so both schedulers can own heterogeneous
/// closures; `Send` because the wall-clock scheduler runs actions on its
/// timer thread.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Cooperative cancellation flag shared by the canceller and the scheduler.
///
/// The flag is checked immediately before the action body is invoked, inside
/// the same step that consumes the queue entry, so there is no window where
/// a cancelled action can still start. Cancellation never removes the entry
/// from the queue; a cancelled action occupies its slot until its turn and
/// then no-ops.
#[derive(Debug, Clone, Default)]
pub struct CancelHandle {
    cancelled: Arc<AtomicBool>,
}

impl CancelHandle {
    /// Create a handle in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent; has no effect once the action has
    /// started running.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// True once `cancel` has been called.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// An action queued for execution, paired with its cancellation flag.
#[derive(Debug)]
pub(crate) struct QueuedAction {
    pub(crate) cancel: CancelHandle,
    pub(crate) action: ActionCell,
}

/// Wrapper so [`QueuedAction`] can derive Debug around an opaque closure.
pub(crate) struct ActionCell(pub(crate) Action);

impl std::fmt::Debug for ActionCell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ActionCell(..)")
    }
}

/// Clock plus deferred execution, implemented identically by
/// [`VirtualScheduler`](crate::core::VirtualScheduler) and
/// [`TimerScheduler`](crate::core::TimerScheduler).
pub trait Scheduler {
    /// Current tick count. Virtual ticks for the virtual scheduler,
    /// milliseconds since construction for the wall-clock one.
    fn now(&self) -> u64;

    /// Schedule `action` to run `due` ticks from now. Returns the
    /// cancellation handle for the queued action.
    fn schedule(&self, due: u64, action: Action) -> CancelHandle;
}

/// Extension helpers for any [`Scheduler`].
pub trait SchedulerExt: Scheduler {
    /// Schedule a plain closure without boxing at the call site.
    fn schedule_fn<F>(&self, due: u64, action: F) -> CancelHandle
    where
        F: FnOnce() + Send + 'static,
    {
        self.schedule(due, Box::new(action))
    }
}

impl<S: Scheduler + ?Sized> SchedulerExt for S {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_handle_flips_once() {
        let handle = CancelHandle::new();
        assert!(!handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
        handle.cancel();
        assert!(handle.is_cancelled());
    }

    #[test]
    fn cancel_handle_clones_share_state() {
        let handle = CancelHandle::new();
        let observer = handle.clone();
        handle.cancel();
        assert!(observer.is_cancelled());
    }
}
