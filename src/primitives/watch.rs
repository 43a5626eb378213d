// ============================================================================
// rill-reactive - Watch API
// User-facing subscriptions to arbitrary expressions
// ============================================================================

use std::rc::Rc;

use crate::core::constants::{DEEP, SYNC, USER};
use crate::primitives::cell::ReactiveCell;
use crate::primitives::watcher::{AnyWatcher, WatcherInner, WatcherSpec};

// =============================================================================
// OPTIONS AND HANDLE
// =============================================================================

/// Options for `watch_with`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WatchOptions {
    /// Fire the callback once at creation with the initial value.
    pub immediate: bool,
    /// Traverse the evaluator's result after every run so nested reactive
    /// structure subscribes too, and fire the callback on every re-run.
    pub deep: bool,
    /// Re-run synchronously on invalidation instead of going through the
    /// queue.
    pub sync: bool,
}

/// Owns a user watcher. `stop` (or dropping the handle) unsubscribes it
/// from every cell it reads; both are idempotent.
#[must_use = "dropping the handle stops the watcher"]
pub struct WatchHandle {
    watcher: Rc<dyn AnyWatcher>,
}

impl WatchHandle {
    /// Stops the watcher: the callback never fires again and every
    /// subscription is removed.
    pub fn stop(&self) {
        self.watcher.teardown();
    }
}

impl Drop for WatchHandle {
    fn drop(&mut self) {
        self.watcher.teardown();
    }
}

// =============================================================================
// WATCH
// =============================================================================

/// Watches an expression, firing `callback(new, old)` when its value
/// changes. Re-runs are batched and ordered by watcher creation sequence.
///
/// # Example
///
/// ```
/// use rill_reactive::{watch, wrap};
///
/// let count = wrap(0);
/// let count_read = count.clone();
/// let handle = watch(move || count_read.get(), |new, old| {
///     assert_eq!(*new, 1);
///     assert_eq!(old.copied(), Some(0));
/// });
///
/// count.set(1);
/// handle.stop();
/// ```
pub fn watch<T: PartialEq + 'static>(
    expr: impl Fn() -> T + 'static,
    callback: impl FnMut(&T, Option<&T>) + 'static,
) -> WatchHandle {
    build_watch(expr, callback, WatchOptions::default(), None)
}

/// Watches an expression with explicit options. `deep` requires the value
/// type to describe its traversal through [`DeepTrack`].
pub fn watch_with<T: PartialEq + DeepTrack + 'static>(
    expr: impl Fn() -> T + 'static,
    callback: impl FnMut(&T, Option<&T>) + 'static,
    options: WatchOptions,
) -> WatchHandle {
    let deep_hook: Option<Box<dyn Fn(&T)>> = if options.deep {
        Some(Box::new(|value: &T| value.deep_track()))
    } else {
        None
    };
    build_watch(expr, callback, options, deep_hook)
}

fn build_watch<T: PartialEq + 'static>(
    expr: impl Fn() -> T + 'static,
    callback: impl FnMut(&T, Option<&T>) + 'static,
    options: WatchOptions,
    deep_hook: Option<Box<dyn Fn(&T)>>,
) -> WatchHandle {
    let mut flags = USER;
    if options.sync {
        flags |= SYNC;
    }
    if options.deep {
        flags |= DEEP;
    }

    let watcher = WatcherInner::create(WatcherSpec {
        flags,
        expr: Rc::new(expr),
        callback: Some(Box::new(callback)),
        before: None,
        equals: Some(Box::new(|a: &T, b: &T| a == b)),
        deep_hook,
    });

    if options.immediate {
        watcher.call_immediate();
    }

    WatchHandle { watcher }
}

// =============================================================================
// DEEP TRAVERSAL
// =============================================================================

/// Visits nested reactive structure so a deep watcher subscribes to it.
///
/// Leaf types are no-ops; containers recurse; reactive handles read
/// themselves (subscribing the current watcher) and recurse into their
/// contents.
pub trait DeepTrack {
    fn deep_track(&self) {}
}

macro_rules! impl_deep_track_leaf {
    ($($ty:ty),* $(,)?) => {
        $(impl DeepTrack for $ty {})*
    };
}

impl_deep_track_leaf!(
    (),
    bool,
    char,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    f32,
    f64,
    String,
);

impl<T: DeepTrack> DeepTrack for Option<T> {
    fn deep_track(&self) {
        if let Some(value) = self {
            value.deep_track();
        }
    }
}

impl<T: DeepTrack> DeepTrack for Vec<T> {
    fn deep_track(&self) {
        for value in self {
            value.deep_track();
        }
    }
}

impl<A: DeepTrack, B: DeepTrack> DeepTrack for (A, B) {
    fn deep_track(&self) {
        self.0.deep_track();
        self.1.deep_track();
    }
}

impl<T: DeepTrack + 'static> DeepTrack for ReactiveCell<T> {
    fn deep_track(&self) {
        self.with(|value| value.deep_track());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::cell::wrap;
    use std::cell::{Cell, RefCell};

    #[test]
    fn immediate_fires_once_with_no_old_value() {
        let count = wrap(5);
        let seen = Rc::new(RefCell::new(Vec::new()));

        let seen_clone = seen.clone();
        let count_read = count.clone();
        let _handle = watch_with(
            move || count_read.get(),
            move |new, old| seen_clone.borrow_mut().push((*new, old.copied())),
            WatchOptions {
                immediate: true,
                ..WatchOptions::default()
            },
        );

        assert_eq!(*seen.borrow(), vec![(5, None)]);

        count.set(6);
        assert_eq!(*seen.borrow(), vec![(5, None), (6, Some(5))]);
    }

    #[test]
    fn stop_prevents_further_callbacks() {
        let count = wrap(0);
        let runs = Rc::new(Cell::new(0));

        let runs_clone = runs.clone();
        let count_read = count.clone();
        let handle = watch(move || count_read.get(), move |_, _| {
            runs_clone.set(runs_clone.get() + 1)
        });

        count.set(1);
        assert_eq!(runs.get(), 1);

        handle.stop();
        handle.stop();
        count.set(2);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn dropping_the_handle_stops_the_watcher() {
        let count = wrap(0);
        let runs = Rc::new(Cell::new(0));

        let runs_clone = runs.clone();
        let count_read = count.clone();
        {
            let _handle = watch(move || count_read.get(), move |_, _| {
                runs_clone.set(runs_clone.get() + 1)
            });
            count.set(1);
        }
        count.set(2);

        assert_eq!(runs.get(), 1);
        assert_eq!(count.subject().watcher_count(), 0);
    }

    #[test]
    fn deep_watcher_sees_nested_cell_writes() {
        let inner = wrap(1);
        let outer = wrap(vec![inner.clone()]);
        let runs = Rc::new(Cell::new(0));

        let runs_clone = runs.clone();
        let outer_read = outer.clone();
        let _handle = watch_with(
            move || outer_read.get(),
            move |_, _| runs_clone.set(runs_clone.get() + 1),
            WatchOptions {
                deep: true,
                ..WatchOptions::default()
            },
        );

        inner.set(2);
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn evaluator_panic_is_contained_and_reported() {
        use crate::core::error::{clear_fault_handler, set_fault_handler, Fault, FaultContext};

        let reported = Rc::new(Cell::new(false));
        let reported_clone = reported.clone();
        set_fault_handler(move |fault| {
            if matches!(
                fault,
                Fault::Evaluator {
                    context: FaultContext::Watcher,
                    ..
                }
            ) {
                reported_clone.set(true);
            }
        });

        let trip = wrap(false);
        let trip_read = trip.clone();
        let runs = Rc::new(Cell::new(0));
        let runs_clone = runs.clone();
        let _handle = watch(
            move || {
                if trip_read.get() {
                    panic!("evaluator exploded");
                }
                trip_read.get()
            },
            move |_, _| runs_clone.set(runs_clone.get() + 1),
        );

        trip.set(true);

        assert!(reported.get());
        // Callback skipped; runtime still usable.
        assert_eq!(runs.get(), 0);
        clear_fault_handler();
    }
}
