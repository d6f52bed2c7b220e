//! Integration tests for the virtual clock scheduler.
//!
//! These exercise the deterministic replay contract: time order, FIFO ties,
//! re-entrant scheduling, cancellation, and the causal-ordering coercion of
//! zero due times.

use std::sync::Arc;

use parking_lot::Mutex;
use prometheus_merge_scheduler::core::{Scheduler, SchedulerExt, VirtualScheduler};
use prometheus_merge_scheduler::testing::{Recorded, Subscription};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

type Log = Arc<Mutex<Vec<Recorded<&'static str>>>>;

fn record(scheduler: &Arc<VirtualScheduler>, log: &Log, due: u64, tag: &'static str) {
    let log = Arc::clone(log);
    let clock = Arc::clone(scheduler);
    scheduler.schedule_fn(due, move || {
        log.lock().push(Recorded::new(clock.now(), tag));
    });
}

// ============================================================================
// ORDERING
// ============================================================================

#[test]
fn drains_in_time_order_with_fifo_ties() {
    let scheduler = Arc::new(VirtualScheduler::new());
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    record(&scheduler, &log, 5, "first-at-5");
    record(&scheduler, &log, 5, "second-at-5");
    record(&scheduler, &log, 3, "at-3");

    scheduler.run();

    let observed = log.lock().clone();
    assert_eq!(
        observed,
        vec![
            Recorded::new(3, "at-3"),
            Recorded::new(5, "first-at-5"),
            Recorded::new(5, "second-at-5"),
        ]
    );
}

#[test]
fn identical_programs_replay_identically() {
    let run_once = || {
        let scheduler = Arc::new(VirtualScheduler::new());
        let log: Log = Arc::new(Mutex::new(Vec::new()));
        for (due, tag) in [(9, "i"), (2, "a"), (9, "j"), (2, "b"), (4, "m")] {
            record(&scheduler, &log, due, tag);
        }
        scheduler.run();
        let result = log.lock().clone();
        result
    };
    assert_eq!(run_once(), run_once());
}

#[test]
fn reentrant_schedule_joins_the_same_drain() {
    let scheduler = Arc::new(VirtualScheduler::new());
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    {
        let inner_scheduler = Arc::clone(&scheduler);
        let inner_log = Arc::clone(&log);
        scheduler.schedule_fn(2, move || {
            let now = inner_scheduler.now();
            inner_log.lock().push(Recorded::new(now, "outer"));
            let nested_log = Arc::clone(&inner_log);
            let nested_clock = Arc::clone(&inner_scheduler);
            inner_scheduler.schedule_fn(3, move || {
                nested_log
                    .lock()
                    .push(Recorded::new(nested_clock.now(), "nested"));
            });
        });
    }

    scheduler.run();

    let observed = log.lock().clone();
    assert_eq!(
        observed,
        vec![Recorded::new(2, "outer"), Recorded::new(5, "nested")]
    );
}

#[test]
fn zero_due_preserves_causal_order_between_producers() {
    let scheduler = Arc::new(VirtualScheduler::new());
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    // A producer scheduling "now" twice in a row must observe its own
    // statements in order: each zero due lands one tick later.
    {
        let clock = Arc::clone(&scheduler);
        let outer_log = Arc::clone(&log);
        scheduler.schedule_fn(0, move || {
            outer_log.lock().push(Recorded::new(clock.now(), "step-1"));
            let nested_log = Arc::clone(&outer_log);
            let nested_clock = Arc::clone(&clock);
            clock.schedule_fn(0, move || {
                nested_log
                    .lock()
                    .push(Recorded::new(nested_clock.now(), "step-2"));
            });
        });
    }

    scheduler.run();

    let observed = log.lock().clone();
    assert_eq!(
        observed,
        vec![Recorded::new(1, "step-1"), Recorded::new(2, "step-2")]
    );
}

// ============================================================================
// CLOCK BEHAVIOR
// ============================================================================

#[test]
fn sleep_skips_ahead_and_stale_actions_run_at_the_later_clock() {
    let scheduler = Arc::new(VirtualScheduler::new());
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    record(&scheduler, &log, 5, "stale");
    scheduler.sleep(20);
    assert_eq!(scheduler.now(), 20);

    scheduler.run();

    // The clock never rewinds to the stale due tick.
    assert_eq!(log.lock().clone(), vec![Recorded::new(20, "stale")]);
    assert_eq!(scheduler.now(), 20);
}

#[test]
fn trait_object_portability() {
    fn drive(scheduler: &dyn Scheduler, log: &Log) {
        let log = Arc::clone(log);
        scheduler.schedule(4, Box::new(move || log.lock().push(Recorded::new(0, "ran"))));
    }

    let scheduler = VirtualScheduler::new();
    let log: Log = Arc::new(Mutex::new(Vec::new()));
    drive(&scheduler, &log);
    scheduler.run();
    assert_eq!(scheduler.now(), 4);
    assert_eq!(log.lock().len(), 1);
}

// ============================================================================
// CANCELLATION
// ============================================================================

#[test]
fn cancelling_mid_drain_suppresses_a_later_action() {
    let scheduler = Arc::new(VirtualScheduler::new());
    let log: Log = Arc::new(Mutex::new(Vec::new()));

    let victim = {
        let log = Arc::clone(&log);
        scheduler.schedule_fn(10, move || log.lock().push(Recorded::new(10, "victim")))
    };
    {
        let log = Arc::clone(&log);
        let clock = Arc::clone(&scheduler);
        scheduler.schedule_fn(1, move || {
            log.lock().push(Recorded::new(clock.now(), "assassin"));
            victim.cancel();
        });
    }

    scheduler.run();

    let observed = log.lock().clone();
    assert_eq!(observed, vec![Recorded::new(1, "assassin")]);
    assert_eq!(scheduler.pending(), 0);
}

// ============================================================================
// SUBSCRIPTION RECORDS
// ============================================================================

#[test]
fn subscription_lifetime_recorded_in_virtual_ticks() {
    let scheduler = Arc::new(VirtualScheduler::new());
    let subscription = Arc::new(Mutex::new(None::<Subscription>));

    {
        let clock = Arc::clone(&scheduler);
        let sub = Arc::clone(&subscription);
        scheduler.schedule_fn(2, move || {
            let tick = u16::try_from(clock.now()).unwrap();
            *sub.lock() = Some(Subscription::new(tick));
        });
    }
    {
        let clock = Arc::clone(&scheduler);
        let sub = Arc::clone(&subscription);
        scheduler.schedule_fn(40, move || {
            let tick = u16::try_from(clock.now()).unwrap();
            let mut guard = sub.lock();
            *guard = guard.map(|s| s.unsubscribe(tick));
        });
    }

    scheduler.run();

    let recorded = subscription.lock().unwrap();
    assert_eq!(recorded, Subscription::closed(2, 40));
    assert!(!recorded.is_open());
}
