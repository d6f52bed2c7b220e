//! Work scheduler: shared worker pool, dedicated threads, inline steal.
//!
//! Pool items travel through a bounded crossbeam channel, the one internally
//! synchronized pool structure. Workers block on `recv`, so the pool never
//! polls; dropping the sender during shutdown unblocks everyone.
//!
//! # Claim protocol
//!
//! Every item carries an atomic state. The queued-to-running transition is a
//! single compare-and-swap shared by three paths: a pool worker receiving
//! the item, a worker popping it from the locality slot, and a caller
//! stealing it with [`WorkHandle::try_inline`]. Whoever wins the CAS takes
//! the body; everyone else observes a claimed item and skips it, so an item
//! can never start twice. Cancellation is the same CAS toward a terminal
//! state and is therefore equally race-free.
//!
//! Long-running items never enter the pool. Each gets one dedicated named
//! thread, keeping blocking work away from the shared workers.

use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use tracing::{debug, info, trace, warn};
use uuid::Uuid;

use crate::config::WorkPoolConfig;
use crate::core::error::SchedulerError;

const STATE_QUEUED: u8 = 0;
const STATE_RUNNING: u8 = 1;
const STATE_COMPLETED: u8 = 2;
const STATE_CANCELLED: u8 = 3;

type WorkBody = Box<dyn FnOnce() + Send + 'static>;

/// Placement options for a submitted work item.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkOptions {
    /// Run on a dedicated thread instead of the shared pool. For bodies
    /// that block or run for a long time; they would otherwise starve the
    /// pool.
    pub long_running: bool,
    /// Request global FIFO placement. When false the item is also published
    /// to a LIFO slot that idle workers and inline stealers check first,
    /// trading fairness for locality.
    pub prefer_fairness: bool,
}

/// Lifecycle of a work item as observed through its handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkStatus {
    /// Waiting in the pool queue or locality slot.
    Queued,
    /// Claimed by a worker, a dedicated thread, or an inline steal.
    Running,
    /// Body finished.
    Completed,
    /// Cancelled before any path claimed it.
    Cancelled,
}

struct WorkItem {
    id: Uuid,
    state: AtomicU8,
    body: Mutex<Option<WorkBody>>,
}

impl WorkItem {
    fn new(body: WorkBody) -> Self {
        Self {
            id: Uuid::new_v4(),
            state: AtomicU8::new(STATE_QUEUED),
            body: Mutex::new(Some(body)),
        }
    }

    fn claim(&self) -> bool {
        self.state
            .compare_exchange(
                STATE_QUEUED,
                STATE_RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Pool statistics counters, all lock-free atomics.
#[derive(Default)]
struct WorkCounters {
    submitted: AtomicU64,
    completed: AtomicU64,
    inline_runs: AtomicU64,
    cancelled: AtomicU64,
    long_running: AtomicU64,
    active: AtomicU64,
}

/// Point-in-time snapshot of pool activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkStats {
    /// Items accepted by `submit`.
    pub submitted: u64,
    /// Bodies run to completion on any path.
    pub completed: u64,
    /// Bodies run via `try_inline`.
    pub inline_runs: u64,
    /// Items cancelled before starting.
    pub cancelled: u64,
    /// Items dispatched to dedicated threads.
    pub long_running: u64,
    /// Bodies currently executing.
    pub active: u64,
    /// Shared pool size.
    pub worker_count: usize,
}

impl WorkCounters {
    fn snapshot(&self, worker_count: usize) -> WorkStats {
        WorkStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            inline_runs: self.inline_runs.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            long_running: self.long_running.load(Ordering::Relaxed),
            active: self.active.load(Ordering::Relaxed),
            worker_count,
        }
    }
}

/// Claim and run an item. Returns false when another path already owns it.
fn execute(item: &WorkItem, counters: &WorkCounters) -> bool {
    if !item.claim() {
        trace!(item = %item.id, "item already claimed, skipping");
        return false;
    }
    let body = item.body.lock().take();
    counters.active.fetch_add(1, Ordering::Relaxed);
    if let Some(body) = body {
        body();
    }
    item.state.store(STATE_COMPLETED, Ordering::Release);
    counters.active.fetch_sub(1, Ordering::Relaxed);
    counters.completed.fetch_add(1, Ordering::Relaxed);
    true
}

/// Handle to a submitted work item.
#[derive(Clone)]
pub struct WorkHandle {
    item: Arc<WorkItem>,
    counters: Arc<WorkCounters>,
}

impl WorkHandle {
    /// Unique id of the underlying item.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.item.id
    }

    /// Steal the queued item and run it synchronously on the calling
    /// thread. Returns false without running anything when a worker already
    /// claimed the item, when it was cancelled, or when it has finished.
    ///
    /// A caller about to block on this item's result can run it instead,
    /// relieving pool pressure.
    pub fn try_inline(&self) -> bool {
        if execute(&self.item, &self.counters) {
            self.counters.inline_runs.fetch_add(1, Ordering::Relaxed);
            trace!(item = %self.item.id, "item executed inline");
            true
        } else {
            false
        }
    }

    /// Best-effort cancellation: succeeds only while the item is still
    /// queued. Running items are never interrupted. Returns true when this
    /// call performed the cancellation.
    pub fn cancel(&self) -> bool {
        let won = self
            .item
            .state
            .compare_exchange(
                STATE_QUEUED,
                STATE_CANCELLED,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok();
        if won {
            // Drop the body eagerly so captured state is released now.
            drop(self.item.body.lock().take());
            self.counters.cancelled.fetch_add(1, Ordering::Relaxed);
            debug!(item = %self.item.id, "item cancelled");
        }
        won
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> WorkStatus {
        match self.item.state.load(Ordering::Acquire) {
            STATE_QUEUED => WorkStatus::Queued,
            STATE_RUNNING => WorkStatus::Running,
            STATE_CANCELLED => WorkStatus::Cancelled,
            _ => WorkStatus::Completed,
        }
    }
}

/// Shared worker pool plus dedicated threads for long-running items.
pub struct WorkScheduler {
    config: WorkPoolConfig,
    injector: Mutex<Option<Sender<Arc<WorkItem>>>>,
    slot: Arc<Mutex<Vec<Arc<WorkItem>>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Arc<WorkCounters>,
    shutdown: Arc<AtomicBool>,
}

impl WorkScheduler {
    /// Spawn the shared pool per `config`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidConfig`] when the configuration fails
    /// validation.
    pub fn new(config: WorkPoolConfig) -> Result<Self, SchedulerError> {
        config.validate().map_err(SchedulerError::InvalidConfig)?;
        let (injector_tx, injector_rx) = bounded::<Arc<WorkItem>>(config.max_queue_depth);
        let slot = Arc::new(Mutex::new(Vec::new()));
        let counters = Arc::new(WorkCounters::default());
        let shutdown = Arc::new(AtomicBool::new(false));

        let mut workers = Vec::with_capacity(config.worker_count);
        for worker_id in 0..config.worker_count {
            workers.push(spawn_pool_worker(
                worker_id,
                injector_rx.clone(),
                Arc::clone(&slot),
                Arc::clone(&counters),
                Arc::clone(&shutdown),
                config.thread_stack_size,
            ));
        }
        info!(
            worker_count = config.worker_count,
            max_queue_depth = config.max_queue_depth,
            "work scheduler started"
        );
        Ok(Self {
            config,
            injector: Mutex::new(Some(injector_tx)),
            slot,
            workers: Mutex::new(workers),
            counters,
            shutdown,
        })
    }

    /// Submit a work item.
    ///
    /// Long-running items get a dedicated thread immediately. Pool items
    /// are enqueued on the injector; with `prefer_fairness` off they are
    /// also published to the locality slot so the next free worker (or an
    /// inline stealer) picks them up LIFO.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::Shutdown`] after shutdown,
    /// [`SchedulerError::QueueFull`] when the injector is at capacity, and
    /// [`SchedulerError::Spawn`] when a dedicated thread cannot start.
    pub fn submit<F>(&self, body: F, options: WorkOptions) -> Result<WorkHandle, SchedulerError>
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shutdown.load(Ordering::Acquire) {
            return Err(SchedulerError::Shutdown);
        }
        let item = Arc::new(WorkItem::new(Box::new(body)));
        let handle = WorkHandle {
            item: Arc::clone(&item),
            counters: Arc::clone(&self.counters),
        };

        if options.long_running {
            self.spawn_dedicated(item)?;
            self.counters.submitted.fetch_add(1, Ordering::Relaxed);
            return Ok(handle);
        }

        if !options.prefer_fairness {
            self.slot.lock().push(Arc::clone(&item));
        }
        let injector = self.injector.lock();
        let Some(sender) = injector.as_ref() else {
            self.forget(&item);
            return Err(SchedulerError::Shutdown);
        };
        match sender.try_send(Arc::clone(&item)) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                trace!(item = %item.id, fair = options.prefer_fairness, "item queued");
                Ok(handle)
            }
            Err(TrySendError::Full(_)) => {
                self.forget(&item);
                warn!("work queue is full");
                Err(SchedulerError::QueueFull("max queue depth reached".into()))
            }
            Err(TrySendError::Disconnected(_)) => {
                self.forget(&item);
                Err(SchedulerError::Shutdown)
            }
        }
    }

    /// Remove a rejected item from the locality slot, if it was published.
    fn forget(&self, item: &Arc<WorkItem>) {
        self.slot.lock().retain(|queued| !Arc::ptr_eq(queued, item));
    }

    fn spawn_dedicated(&self, item: Arc<WorkItem>) -> Result<(), SchedulerError> {
        let counters = Arc::clone(&self.counters);
        let name = format!("pms-long-{}", &item.id.simple().to_string()[..8]);
        thread::Builder::new()
            .name(name)
            .stack_size(self.config.thread_stack_size)
            .spawn(move || {
                debug!(item = %item.id, "dedicated worker started");
                execute(&item, &counters);
                debug!(item = %item.id, "dedicated worker finished");
            })
            .map_err(|error| SchedulerError::Spawn(error.to_string()))?;
        self.counters.long_running.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Current pool statistics.
    #[must_use]
    pub fn stats(&self) -> WorkStats {
        self.counters.snapshot(self.config.worker_count)
    }

    /// Shut down gracefully: stop accepting work, unblock idle workers by
    /// dropping the injector sender, then join each worker with a timeout.
    /// Workers stuck in a body are detached rather than waited on forever.
    pub fn shutdown(&self) {
        if self.shutdown.swap(true, Ordering::AcqRel) {
            return;
        }
        info!("shutting down work scheduler");
        {
            let mut injector = self.injector.lock();
            *injector = None;
        }
        let mut workers = self.workers.lock();
        for (worker_id, worker) in workers.drain(..).enumerate() {
            let (tx, rx) = std::sync::mpsc::channel();
            let joiner = thread::spawn(move || {
                let _ = tx.send(worker.join().is_ok());
            });
            match rx.recv_timeout(Duration::from_secs(2)) {
                Ok(true) => {
                    debug!(worker_id, "worker joined");
                    let _ = joiner.join();
                }
                Ok(false) => {
                    warn!(worker_id, "worker panicked");
                    let _ = joiner.join();
                }
                Err(_) => {
                    warn!(worker_id, "worker did not exit in time, detaching");
                }
            }
        }
        info!("work scheduler shut down");
    }
}

impl Drop for WorkScheduler {
    fn drop(&mut self) {
        // Signal and unblock, but never join in Drop; an explicit
        // shutdown() is required for a graceful join.
        if !self.shutdown.swap(true, Ordering::AcqRel) {
            let mut injector = self.injector.lock();
            *injector = None;
            debug!("work scheduler dropped without explicit shutdown");
        }
    }
}

fn spawn_pool_worker(
    worker_id: usize,
    injector_rx: Receiver<Arc<WorkItem>>,
    slot: Arc<Mutex<Vec<Arc<WorkItem>>>>,
    counters: Arc<WorkCounters>,
    shutdown: Arc<AtomicBool>,
    stack_size: usize,
) -> JoinHandle<()> {
    thread::Builder::new()
        .name(format!("pms-worker-{worker_id}"))
        .stack_size(stack_size)
        .spawn(move || {
            debug!(worker_id, "worker started");
            'main: loop {
                if shutdown.load(Ordering::Acquire) {
                    break;
                }
                // Locality slot first: freshest items, LIFO.
                loop {
                    let next = slot.lock().pop();
                    match next {
                        Some(item) => {
                            if execute(&item, &counters) {
                                continue 'main;
                            }
                        }
                        None => break,
                    }
                }
                // Injector next; blocking recv, no polling. A dropped
                // sender ends the loop.
                match injector_rx.recv() {
                    Ok(item) => {
                        execute(&item, &counters);
                    }
                    Err(_) => {
                        debug!(worker_id, "injector closed, worker exiting");
                        break;
                    }
                }
            }
            debug!(worker_id, "worker exiting");
        })
        .expect("failed to spawn pool worker")
}
