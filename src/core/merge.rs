//! Fan-in of N channels into one ordered consumer stream.
//!
//! The stream pulls items with a biased round robin: a fast path that tries
//! the channel under the cursor, and a slow path that sweeps every live
//! channel, retires the drained ones, and blocks on a wait-any over the
//! remaining wake signals instead of busy-polling.
//!
//! Cross-channel ordering is fair, not temporal. Items from one channel are
//! always observed in push order, but the interleaving between channels
//! depends on arrival timing; consumers needing strict wall-clock order
//! must use a single channel or timestamp the items themselves.

use std::sync::Arc;

use tracing::{debug, trace};
use uuid::Uuid;

use crate::channel::Consumer;
use crate::config::MergeConfig;
use crate::core::error::{AggregateFault, StreamError};
use crate::core::fault::TaskGroup;
use crate::event::{self, ResetEvent};

/// Per-channel wake-signal state. A retired channel is done, drained, and
/// disposed; it is never touched again.
enum SignalSlot {
    Active(ResetEvent),
    Retired,
}

struct ChannelSlot<T> {
    consumer: Consumer<T>,
    signal: SignalSlot,
}

enum StreamState {
    Active,
    Consumed,
}

/// Lazy, single-pass merge over a set of channel consumers.
///
/// Iterating to exhaustion is the only supported usage; after the terminal
/// result every further pull fails with
/// [`StreamError::AlreadyConsumed`](crate::core::error::StreamError).
pub struct MergedStream<T> {
    slots: Vec<ChannelSlot<T>>,
    cursor: usize,
    live: usize,
    spin_limit: u32,
    group: Option<Arc<TaskGroup>>,
    state: StreamState,
    stream_id: Uuid,
}

/// Merge `consumers` into one stream with default tuning and no fault
/// group.
#[must_use]
pub fn merge<T>(consumers: Vec<Consumer<T>>) -> MergedStream<T> {
    MergedStream::new(consumers)
}

impl<T> MergedStream<T> {
    /// Create a stream over `consumers`. Each consumer must be the only
    /// reader of its channel.
    #[must_use]
    pub fn new(consumers: Vec<Consumer<T>>) -> Self {
        let slots: Vec<ChannelSlot<T>> = consumers
            .into_iter()
            .map(|consumer| ChannelSlot {
                consumer,
                signal: SignalSlot::Active(ResetEvent::new()),
            })
            .collect();
        let live = slots.len();
        let stream_id = Uuid::new_v4();
        debug!(%stream_id, channels = live, "merged stream created");
        Self {
            slots,
            cursor: 0,
            live,
            spin_limit: MergeConfig::default().spin_limit,
            group: None,
            state: StreamState::Active,
            stream_id,
        }
    }

    /// Attach the task group whose recorded faults are replayed at stream
    /// end.
    #[must_use]
    pub fn with_task_group(mut self, group: Arc<TaskGroup>) -> Self {
        self.group = Some(group);
        self
    }

    /// Apply merge tuning.
    #[must_use]
    pub fn with_config(mut self, config: &MergeConfig) -> Self {
        self.spin_limit = config.spin_limit;
        self
    }

    /// Number of channels not yet retired.
    #[must_use]
    pub fn live_channels(&self) -> usize {
        self.live
    }

    /// Pull the next merged item.
    ///
    /// `Ok(Some(item))` delivers an item, `Ok(None)` is the clean end of
    /// the stream. Blocks only when every live channel is momentarily
    /// empty.
    ///
    /// # Errors
    ///
    /// [`StreamError::Faulted`] once all channels are drained and the task
    /// group recorded producer failures; [`StreamError::AlreadyConsumed`]
    /// on any pull after the terminal result.
    pub fn try_next(&mut self) -> Result<Option<T>, StreamError> {
        if matches!(self.state, StreamState::Consumed) {
            return Err(StreamError::AlreadyConsumed);
        }
        if self.live == 0 {
            return self.finish();
        }
        let n = self.slots.len();
        // Fast path: the channel under the cursor, then rotate.
        if let SignalSlot::Active(_) = self.slots[self.cursor].signal {
            if let Some(item) = self.slots[self.cursor].consumer.try_dequeue() {
                self.cursor = (self.cursor + 1) % n;
                return Ok(Some(item));
            }
        }
        self.pull_slow()
    }

    /// Slow path: sweep, retire, arm, block.
    fn pull_slow(&mut self) -> Result<Option<T>, StreamError> {
        let n = self.slots.len();
        loop {
            // Sweep every channel once, starting at the cursor. Channels
            // observed done and empty in one snapshot are retired for good.
            let mut index = self.cursor;
            for _ in 0..n {
                if let SignalSlot::Active(_) = self.slots[index].signal {
                    if let Some(item) = self.slots[index].consumer.try_dequeue() {
                        self.cursor = (index + 1) % n;
                        return Ok(Some(item));
                    }
                    let status = self.slots[index].consumer.status();
                    if status.done {
                        // A final item may land between the failed dequeue
                        // and the done read; drain before retiring.
                        if let Some(item) = self.slots[index].consumer.try_dequeue() {
                            self.cursor = (index + 1) % n;
                            return Ok(Some(item));
                        }
                        self.retire(index);
                    }
                }
                index = (index + 1) % n;
            }
            if self.live == 0 {
                return self.finish();
            }
            // Arm a signal on every live channel. Arming can itself surface
            // an item that arrived after the sweep passed the channel.
            if let Some((index, item)) = self.arm_live_signals() {
                self.cursor = (index + 1) % n;
                return Ok(Some(item));
            }
            let woken = self.wait_for_any();
            trace!(stream = %self.stream_id, channel = woken, "merge woke");
            self.cursor = woken;
        }
    }

    fn arm_live_signals(&mut self) -> Option<(usize, T)> {
        for (index, slot) in self.slots.iter().enumerate() {
            if let SignalSlot::Active(signal) = &slot.signal {
                signal.reset();
                if let Some(item) = slot.consumer.try_dequeue_or_arm(signal) {
                    return Some((index, item));
                }
            }
        }
        None
    }

    /// Wait until any live channel signals: a bounded spin over the cheap
    /// `is_set` flags first, then a true blocking wait-any over the
    /// compacted list of live signals. The compacted result index maps back
    /// to a channel index through the same filtered view.
    fn wait_for_any(&self) -> usize {
        for _ in 0..self.spin_limit {
            for (index, slot) in self.slots.iter().enumerate() {
                if let SignalSlot::Active(signal) = &slot.signal {
                    if signal.is_set() {
                        return index;
                    }
                }
            }
            std::hint::spin_loop();
        }
        let compacted: Vec<(usize, &ResetEvent)> = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| match &slot.signal {
                SignalSlot::Active(signal) => Some((index, signal)),
                SignalSlot::Retired => None,
            })
            .collect();
        let signals: Vec<&ResetEvent> = compacted.iter().map(|(_, signal)| *signal).collect();
        let fired = event::wait_any(&signals);
        compacted[fired].0
    }

    fn retire(&mut self, index: usize) {
        self.slots[index].signal = SignalSlot::Retired;
        self.slots[index].consumer.dispose();
        self.live -= 1;
        debug!(stream = %self.stream_id, channel = index, live = self.live, "channel retired");
    }

    /// Terminal transition. Runs once: reports end-of-query to the owning
    /// task group and replays any recorded faults.
    fn finish(&mut self) -> Result<Option<T>, StreamError> {
        self.state = StreamState::Consumed;
        if let Some(group) = &self.group {
            let faults = group.drain_faults();
            group.end_of_query(faults.is_empty());
            if !faults.is_empty() {
                debug!(stream = %self.stream_id, faults = faults.len(), "stream ended faulted");
                return Err(StreamError::Faulted(AggregateFault::new(faults)));
            }
        }
        debug!(stream = %self.stream_id, "stream ended");
        Ok(None)
    }
}

impl<T> Iterator for MergedStream<T> {
    type Item = Result<T, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, StreamState::Consumed) {
            return None;
        }
        match self.try_next() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(error) => Some(Err(error)),
        }
    }
}

impl<T> Drop for MergedStream<T> {
    fn drop(&mut self) {
        // Early abandonment: release the channels that were never retired.
        // Dispose clears each channel's signal reference before dropping
        // its buffer, so producers cannot fire a signal of a dead channel.
        for slot in &mut self.slots {
            if let SignalSlot::Active(_) = slot.signal {
                slot.signal = SignalSlot::Retired;
                slot.consumer.dispose();
            }
        }
    }
}
