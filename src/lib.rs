//! # Prometheus Merge Scheduler
//!
//! A deterministic-and-real scheduling core for concurrent query and stream
//! pipelines in the Prometheus AI Platform.
//!
//! Two faces share one data model:
//!
//! - a **virtual clock scheduler** that executes a program's scheduled
//!   actions on a single logical thread under an artificial, monotonically
//!   advancing clock, giving bit-for-bit reproducible concurrency tests;
//! - a **wall-clock scheduler** plus a **multi-channel merge** that fan in
//!   results from several concurrently producing workers into one ordered
//!   consumer stream, blocking and waking on signals rather than polling.
//!
//! Both schedulers implement the same [`Scheduler`](crate::core::Scheduler)
//! trait, so producer and consumer code is portable between test and
//! production.
//!
//! ## Deterministic replay
//!
//! ```
//! use std::sync::Arc;
//! use parking_lot::Mutex;
//! use prometheus_merge_scheduler::core::{SchedulerExt, VirtualScheduler};
//!
//! let scheduler = VirtualScheduler::new();
//! let log = Arc::new(Mutex::new(Vec::new()));
//! for (due, tag) in [(5, "a"), (5, "b"), (3, "c")] {
//!     let log = Arc::clone(&log);
//!     scheduler.schedule_fn(due, move || log.lock().push(tag));
//! }
//! scheduler.run();
//! assert_eq!(*log.lock(), vec!["c", "a", "b"]);
//! ```
//!
//! ## Merging producer channels
//!
//! ```
//! use prometheus_merge_scheduler::channel::channel;
//! use prometheus_merge_scheduler::core::merge;
//!
//! let (producer, consumer) = channel();
//! let feeder = std::thread::spawn(move || {
//!     for item in 0..3 {
//!         producer.push(item).unwrap();
//!     }
//!     producer.mark_done();
//! });
//! let items: Vec<u32> = merge(vec![consumer]).map(Result::unwrap).collect();
//! feeder.join().unwrap();
//! assert_eq!(items, vec![0, 1, 2]);
//! ```
//!
//! The work scheduler ([`WorkScheduler`](crate::core::WorkScheduler)) is
//! what actually runs
//! producer and consumer bodies concurrently: a shared worker pool for
//! short items, dedicated threads for long-running ones, an inline-steal
//! path for callers about to block, and best-effort cancellation.

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Single-producer/single-consumer channels with completion flags.
pub mod channel;
/// Configuration models for the scheduling core.
pub mod config;
/// Core scheduling components.
pub mod core;
/// One-shot wake signals and blocking wait-any.
pub mod event;
/// Assertion helpers for virtual-time programs.
pub mod testing;
/// Shared utilities.
pub mod util;

pub use self::channel::{channel, ChannelStatus, Consumer, Producer};
pub use self::config::{CoreConfig, MergeConfig, WorkPoolConfig};
pub use self::core::{
    merge, AggregateFault, AppResult, CancelHandle, ChannelError, EmptyQueue, MergedStream,
    Scheduler, SchedulerError, SchedulerExt, StreamError, TaskGroup, TimerScheduler,
    VirtualScheduler, WorkHandle, WorkOptions, WorkScheduler, WorkStats, WorkStatus,
};
pub use self::event::ResetEvent;
