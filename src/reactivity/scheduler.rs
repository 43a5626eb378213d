// ============================================================================
// rill-reactive - Scheduler
// Deduplicated queue, flushed in ascending creation-sequence order
// ============================================================================
//
// There is no microtask runtime to defer to in a plain Rust crate, so a
// write outside `batch` enqueues and flushes synchronously. `batch` is the
// deferral boundary and `tick` the explicit settling point.
//
// Flush order is ascending watcher id: a watcher created earlier (a render
// parent, an owner) always re-runs before watchers created after it.
// ============================================================================

use std::rc::Rc;

use crate::core::context::{with_context, EnqueueOutcome};
use crate::core::error::{report_fault, Fault};
use crate::primitives::watcher::AnyWatcher;

// =============================================================================
// SCHEDULE
// =============================================================================

/// Queues a watcher for the next flush. Invalidation N times queues once.
///
/// Outside a batch and a flush this flushes immediately. During a flush the
/// watcher is spliced into the unflushed tail in id order, so a watcher
/// invalidated by an earlier one still runs this round.
pub(crate) fn schedule(watcher: Rc<dyn AnyWatcher>) {
    let outcome = with_context(|ctx| ctx.enqueue(watcher));

    match outcome {
        EnqueueOutcome::Deduped => {}
        EnqueueOutcome::Queued { flush_now: false } => {}
        EnqueueOutcome::Queued { flush_now: true } => flush(),
        EnqueueOutcome::Overflow { watcher_id } => {
            // Dropped from this flush; everyone else still completes.
            report_fault(Fault::InfiniteUpdate { watcher_id });
        }
    }
}

// =============================================================================
// FLUSH
// =============================================================================

/// Runs every queued watcher in creation-sequence order.
///
/// Re-entrant calls are no-ops; the outer flush picks up anything queued
/// while it runs.
pub(crate) fn flush() {
    let started = with_context(|ctx| ctx.begin_flush());
    if !started {
        return;
    }
    tracing::trace!("flush begin");
    let _guard = FlushGuard { _private: () };

    loop {
        let next = with_context(|ctx| ctx.next_flush_item());
        let Some(watcher) = next else {
            break;
        };
        if !watcher.is_active() {
            continue;
        }
        watcher.run_before();
        watcher.run();
        watcher.notify_updated();
    }
}

/// Resets the flush state when the loop exits, so a panic escaping a
/// watcher (or a fault handler) cannot leave the queue wedged.
struct FlushGuard {
    _private: (),
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        with_context(|ctx| ctx.end_flush());
        tracing::trace!("flush end");
    }
}

#[cfg(test)]
mod tests {
    use crate::primitives::cell::wrap;
    use crate::primitives::watch::{watch, watch_with, WatchOptions};
    use crate::reactivity::batching::batch;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn batched_writes_flush_in_creation_order() {
        let a = wrap(0);
        let b = wrap(0);
        let order = Rc::new(RefCell::new(Vec::new()));

        // Watch b first, then a: flush must honor creation order, not
        // write order.
        let order_b = order.clone();
        let b_read = b.clone();
        let _wb = watch(move || b_read.get(), move |_, _| order_b.borrow_mut().push("b"));
        let order_a = order.clone();
        let a_read = a.clone();
        let _wa = watch(move || a_read.get(), move |_, _| order_a.borrow_mut().push("a"));

        batch(|| {
            a.set(1);
            b.set(1);
        });

        assert_eq!(*order.borrow(), vec!["b", "a"]);
    }

    #[test]
    fn multiple_writes_in_batch_run_watcher_once() {
        let count = wrap(0);
        let runs = Rc::new(RefCell::new(0));

        let runs_clone = runs.clone();
        let count_read = count.clone();
        let _w = watch(move || count_read.get(), move |_, _| *runs_clone.borrow_mut() += 1);

        batch(|| {
            count.set(1);
            count.set(2);
            count.set(3);
        });

        assert_eq!(*runs.borrow(), 1);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn watcher_invalidated_during_flush_runs_same_round() {
        let first = wrap(0);
        let second = wrap(0);
        let seen = Rc::new(RefCell::new(Vec::new()));

        // The first watcher's callback writes the cell the second watches.
        let second_write = second.clone();
        let first_read = first.clone();
        let _w1 = watch(move || first_read.get(), move |new, _| {
            second_write.set(*new * 10);
        });
        let seen_clone = seen.clone();
        let second_read = second.clone();
        let _w2 = watch(move || second_read.get(), move |new, _| {
            seen_clone.borrow_mut().push(*new);
        });

        first.set(2);

        assert_eq!(*seen.borrow(), vec![20]);
    }

    #[test]
    fn self_retriggering_watcher_is_reported_not_fatal() {
        use crate::core::error::{clear_fault_handler, set_fault_handler, Fault};
        use std::cell::Cell;

        let reported = Rc::new(Cell::new(false));
        let reported_clone = reported.clone();
        set_fault_handler(move |fault| {
            if matches!(fault, Fault::InfiniteUpdate { .. }) {
                reported_clone.set(true);
            }
        });

        let count = wrap(0);
        let count_write = count.clone();
        let count_read = count.clone();
        let _w = watch_with(
            move || count_read.get(),
            move |new, _| {
                // Unconditional self-retrigger.
                count_write.set(*new + 1);
            },
            WatchOptions::default(),
        );

        count.set(1);

        assert!(reported.get());
        clear_fault_handler();
    }

    #[test]
    fn flush_recovers_after_a_panicking_fault_handler() {
        use crate::core::error::{clear_fault_handler, set_fault_handler};
        use std::cell::Cell;
        use std::panic::{catch_unwind, AssertUnwindSafe};

        set_fault_handler(|_| panic!("handler exploded"));

        // A panicking callback is contained, but the fault report it
        // produces runs the handler, whose panic unwinds out of the flush.
        let count = wrap(0);
        let count_read = count.clone();
        let _bad = watch(move || count_read.get(), |_, _| panic!("callback exploded"));

        let escaped = catch_unwind(AssertUnwindSafe(|| count.set(1)));
        assert!(escaped.is_err());
        clear_fault_handler();

        // The flush state must have been reset: later writes still deliver.
        let other = wrap(0);
        let fires = Rc::new(Cell::new(0));
        let fires_clone = fires.clone();
        let other_read = other.clone();
        let _handle = watch(move || other_read.get(), move |_, _| {
            fires_clone.set(fires_clone.get() + 1)
        });

        other.set(1);
        assert_eq!(fires.get(), 1);
    }
}
