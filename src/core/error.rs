//! Error types for the scheduling core.

use std::fmt;

use thiserror::Error;

/// Dequeue or peek on an empty event queue. Programmer error: schedulers
/// check `len` before removal, so seeing this outside a drain loop means the
/// queue's accounting is broken.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("event queue is empty")]
pub struct EmptyQueue;

/// Errors produced by channel producers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    /// The producer already called `mark_done`; the completion flag is
    /// terminal and no further items are accepted.
    #[error("push after mark_done")]
    Completed,
}

/// Errors produced by the work scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// The shared pool queue is at capacity.
    #[error("work queue full: {0}")]
    QueueFull(String),
    /// The scheduler has been shut down.
    #[error("scheduler shut down")]
    Shutdown,
    /// A dedicated worker thread could not be spawned.
    #[error("thread spawn failed: {0}")]
    Spawn(String),
}

/// Errors surfaced by a merged stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// The stream already produced its terminal result; merged streams are
    /// single-pass and cannot be restarted.
    #[error("merged stream already consumed")]
    AlreadyConsumed,
    /// One or more producer bodies faulted. Raised only once every channel
    /// is drained, after all buffered items were delivered.
    #[error(transparent)]
    Faulted(#[from] AggregateFault),
}

/// One or more producer failures collected by a task group and replayed to
/// the consumer at the true end of the merged stream.
#[derive(Debug)]
pub struct AggregateFault {
    faults: Vec<anyhow::Error>,
}

impl AggregateFault {
    /// Bundle recorded faults, preserving report order.
    #[must_use]
    pub fn new(faults: Vec<anyhow::Error>) -> Self {
        Self { faults }
    }

    /// The individual recorded faults, in report order.
    #[must_use]
    pub fn faults(&self) -> &[anyhow::Error] {
        &self.faults
    }

    /// Number of recorded faults.
    #[must_use]
    pub fn len(&self) -> usize {
        self.faults.len()
    }

    /// True when no faults were recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.faults.is_empty()
    }
}

impl fmt::Display for AggregateFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} producer task(s) faulted", self.faults.len())?;
        if let Some(first) = self.faults.first() {
            write!(f, ": {first}")?;
        }
        Ok(())
    }
}

impl std::error::Error for AggregateFault {}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
