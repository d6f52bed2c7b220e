//! One-shot, re-armable wake signals and a blocking wait-any.
//!
//! A [`ResetEvent`] is a manual-reset flag a producer sets to wake a single
//! consumer. The consumer may poll `is_set` cheaply, or block on a whole set
//! of events with [`wait_any`], which registers one waiter token with every
//! event and parks until some event fires the token.
//!
//! The set/register protocol never loses a wake: `set` publishes the flag
//! before taking the registration lock, and `register` checks the flag under
//! that same lock. A setter that beats the registration causes `register` to
//! report the event as already set; a setter that arrives after finds the
//! registration and fires it.
//!
//! At most one waiter is supported per event at a time, which matches the
//! single-consumer contract of the merge path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};

#[derive(Default)]
struct WaitToken {
    fired: Mutex<Option<usize>>,
    wake: Condvar,
}

impl WaitToken {
    /// Record `index` as the firing event and wake the parked waiter. Only
    /// the first firing wins; later ones keep their own `set` flags and are
    /// observed by the consumer's next sweep.
    fn fire(&self, index: usize) {
        let mut fired = self.fired.lock();
        if fired.is_none() {
            *fired = Some(index);
            self.wake.notify_one();
        }
    }

    fn wait(&self) -> usize {
        let mut fired = self.fired.lock();
        loop {
            if let Some(index) = *fired {
                return index;
            }
            self.wake.wait(&mut fired);
        }
    }
}

struct Registration {
    token: Arc<WaitToken>,
    index: usize,
}

#[derive(Default)]
struct EventInner {
    set: AtomicBool,
    waiter: Mutex<Option<Registration>>,
}

/// Manual-reset wake signal. Cloning shares the underlying flag; a channel
/// holds one clone while the consumer keeps the other.
#[derive(Clone, Default)]
pub struct ResetEvent {
    inner: Arc<EventInner>,
}

impl ResetEvent {
    /// Create an unset event.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the flag and fire any registered waiter. The flag stays set
    /// until [`ResetEvent::reset`].
    pub fn set(&self) {
        self.inner.set.store(true, Ordering::Release);
        let registration = self.inner.waiter.lock().take();
        if let Some(registration) = registration {
            registration.token.fire(registration.index);
        }
    }

    /// Clear the flag so the event can be armed again.
    pub fn reset(&self) {
        self.inner.set.store(false, Ordering::Release);
    }

    /// Cheap flag read for the spin phase of a wait.
    #[must_use]
    pub fn is_set(&self) -> bool {
        self.inner.set.load(Ordering::Acquire)
    }

    /// Attach a waiter token under the registration lock. Returns false when
    /// the event is already set, in which case nothing is registered.
    fn register(&self, token: &Arc<WaitToken>, index: usize) -> bool {
        let mut waiter = self.inner.waiter.lock();
        if self.inner.set.load(Ordering::Acquire) {
            return false;
        }
        *waiter = Some(Registration {
            token: Arc::clone(token),
            index,
        });
        true
    }

    fn deregister(&self) {
        *self.inner.waiter.lock() = None;
    }
}

impl std::fmt::Debug for ResetEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResetEvent")
            .field("set", &self.is_set())
            .finish()
    }
}

/// Block until any of `events` is set and return the index of one that
/// fired, relative to the slice passed in.
///
/// Events already set at call time short-circuit without parking. Spurious
/// condvar wakes are absorbed by the token; callers must still re-validate
/// channel state after waking, because more than one event may have fired.
///
/// # Panics
///
/// Panics when `events` is empty; there is nothing to wait for.
#[must_use]
pub fn wait_any(events: &[&ResetEvent]) -> usize {
    assert!(!events.is_empty(), "wait_any over an empty signal set");
    let token = Arc::new(WaitToken::default());
    for (index, event) in events.iter().enumerate() {
        if !event.register(&token, index) {
            for armed in &events[..index] {
                armed.deregister();
            }
            return index;
        }
    }
    let index = token.wait();
    for event in events {
        event.deregister();
    }
    index
}
