//! Assertion helpers for virtual-time programs.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A consumer's virtual-time lifetime: the tick it subscribed and the tick
/// it unsubscribed, the latter open-ended until explicitly closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    /// Tick at which the consumer subscribed.
    pub subscribed_at: u16,
    /// Tick at which the consumer unsubscribed, or [`Subscription::OPEN`].
    pub unsubscribed_at: u16,
}

impl Subscription {
    /// Sentinel for a subscription that has not been closed.
    pub const OPEN: u16 = u16::MAX;

    /// A subscription opened at `subscribed_at` and still running.
    #[must_use]
    pub const fn new(subscribed_at: u16) -> Self {
        Self {
            subscribed_at,
            unsubscribed_at: Self::OPEN,
        }
    }

    /// A subscription with both endpoints known.
    #[must_use]
    pub const fn closed(subscribed_at: u16, unsubscribed_at: u16) -> Self {
        Self {
            subscribed_at,
            unsubscribed_at,
        }
    }

    /// Close an open subscription at `tick`.
    #[must_use]
    pub const fn unsubscribe(self, tick: u16) -> Self {
        Self {
            subscribed_at: self.subscribed_at,
            unsubscribed_at: tick,
        }
    }

    /// True while the unsubscribe tick is still the open sentinel.
    #[must_use]
    pub const fn is_open(self) -> bool {
        self.unsubscribed_at == Self::OPEN
    }
}

impl fmt::Display for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, ", self.subscribed_at)?;
        if self.is_open() {
            write!(f, "inf)")
        } else {
            write!(f, "{})", self.unsubscribed_at)
        }
    }
}

/// A value paired with the virtual tick at which it was observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recorded<T> {
    /// Virtual tick of the observation.
    pub time: u64,
    /// Observed value.
    pub value: T,
}

impl<T> Recorded<T> {
    /// Pair `value` with its observation tick.
    pub const fn new(time: u64, value: T) -> Self {
        Self { time, value }
    }
}

impl<T: fmt::Display> fmt::Display for Recorded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.value, self.time)
    }
}
