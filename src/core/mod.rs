//! Core scheduling components: event queue, clocks, merge, work pool.

pub mod error;
pub mod event_queue;
pub mod fault;
pub mod merge;
pub mod scheduler;
pub mod timer_scheduler;
pub mod virtual_scheduler;
pub mod work_scheduler;

pub use error::{
    AggregateFault, AppResult, ChannelError, EmptyQueue, SchedulerError, StreamError,
};
pub use event_queue::{EventQueue, Timed};
pub use fault::TaskGroup;
pub use merge::{merge, MergedStream};
pub use scheduler::{Action, CancelHandle, Scheduler, SchedulerExt};
pub use timer_scheduler::TimerScheduler;
pub use virtual_scheduler::VirtualScheduler;
pub use work_scheduler::{WorkHandle, WorkOptions, WorkScheduler, WorkStats, WorkStatus};
