//! Single-producer/single-consumer channel with a completion flag.
//!
//! A channel is the hand-off point between one producing worker and the
//! merge path: an in-process buffer, a `done` flag the producer sets exactly
//! once, and an optional wake signal the consumer arms when it is about to
//! block. Buffer, flag, and signal share one mutex, so `done` and `empty`
//! are always observed as a single snapshot; there is no window where a
//! freshly pushed final item can hide behind a stale emptiness read.
//!
//! Exactly one producer writes and exactly one consumer reads. Neither
//! handle is cloneable; a second reader is never valid.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::core::error::ChannelError;
use crate::event::ResetEvent;

struct ChannelState<T> {
    buffer: VecDeque<T>,
    done: bool,
    disposed: bool,
    signal: Option<ResetEvent>,
}

struct Shared<T> {
    state: Mutex<ChannelState<T>>,
}

/// Combined `done`/`empty` snapshot taken under the channel lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelStatus {
    /// Producer has called `mark_done`.
    pub done: bool,
    /// Buffer held no items at snapshot time.
    pub empty: bool,
}

impl ChannelStatus {
    /// True when the channel can never yield another item: the producer is
    /// finished and everything buffered has been consumed.
    #[must_use]
    pub const fn is_drained(self) -> bool {
        self.done && self.empty
    }
}

/// Write side of a channel. Owned by exactly one producing worker.
pub struct Producer<T> {
    shared: Arc<Shared<T>>,
}

/// Read side of a channel. Owned by exactly one consumer, typically a
/// merged stream.
pub struct Consumer<T> {
    shared: Arc<Shared<T>>,
}

/// Create a connected producer/consumer pair.
#[must_use]
pub fn channel<T>() -> (Producer<T>, Consumer<T>) {
    let shared = Arc::new(Shared {
        state: Mutex::new(ChannelState {
            buffer: VecDeque::new(),
            done: false,
            disposed: false,
            signal: None,
        }),
    });
    (
        Producer {
            shared: Arc::clone(&shared),
        },
        Consumer { shared },
    )
}

impl<T> Producer<T> {
    /// Buffer an item and fire the armed wake signal, if any.
    ///
    /// Pushing into a disposed channel is a silent drop: the consumer has
    /// walked away and there is nobody left to deliver to.
    ///
    /// # Errors
    ///
    /// [`ChannelError::Completed`] when `mark_done` was already called.
    pub fn push(&self, item: T) -> Result<(), ChannelError> {
        let mut state = self.shared.state.lock();
        if state.disposed {
            debug!("push into disposed channel dropped");
            return Ok(());
        }
        if state.done {
            return Err(ChannelError::Completed);
        }
        state.buffer.push_back(item);
        if let Some(signal) = &state.signal {
            signal.set();
        }
        Ok(())
    }

    /// Flip the terminal `done` flag and fire the armed wake signal, if
    /// any. Idempotent; also a no-op on a disposed channel.
    pub fn mark_done(&self) {
        let mut state = self.shared.state.lock();
        if state.disposed || state.done {
            return;
        }
        state.done = true;
        debug!(buffered = state.buffer.len(), "channel marked done");
        if let Some(signal) = &state.signal {
            signal.set();
        }
    }
}

impl<T> Consumer<T> {
    /// Non-blocking pop. Never fails; an empty buffer yields `None`.
    pub fn try_dequeue(&self) -> Option<T> {
        let mut state = self.shared.state.lock();
        assert!(!state.disposed, "channel read after dispose");
        state.buffer.pop_front()
    }

    /// Non-blocking pop that arms `signal` on emptiness.
    ///
    /// When the buffer is empty the signal is installed to fire on the next
    /// push or on `mark_done`; if the channel is already done it fires
    /// before this call returns, so a waiter always wakes to observe the
    /// terminal state.
    pub fn try_dequeue_or_arm(&self, signal: &ResetEvent) -> Option<T> {
        let mut state = self.shared.state.lock();
        assert!(!state.disposed, "channel read after dispose");
        if let Some(item) = state.buffer.pop_front() {
            return Some(item);
        }
        state.signal = Some(signal.clone());
        if state.done {
            signal.set();
        }
        None
    }

    /// True once the producer has called `mark_done`.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.status().done
    }

    /// True when no items are currently buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.status().empty
    }

    /// Atomic `done`/`empty` snapshot. Retirement decisions use this rather
    /// than two separate reads.
    #[must_use]
    pub fn status(&self) -> ChannelStatus {
        let state = self.shared.state.lock();
        assert!(!state.disposed, "channel read after dispose");
        ChannelStatus {
            done: state.done,
            empty: state.buffer.is_empty(),
        }
    }

    /// Release the channel: clear the installed signal reference first, so
    /// a waiter can never park on a signal belonging to a dead channel,
    /// then drop any remaining buffered items.
    ///
    /// Disposing twice is a programmer error and asserts.
    pub fn dispose(&self) {
        let mut state = self.shared.state.lock();
        assert!(!state.disposed, "channel disposed twice");
        state.signal = None;
        let dropped = state.buffer.len();
        state.buffer.clear();
        state.disposed = true;
        if dropped > 0 {
            debug!(dropped, "channel disposed with buffered items");
        }
    }
}
