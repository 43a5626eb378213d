// ============================================================================
// rill-reactive - Watcher
// The computation primitive: evaluator, subscription bookkeeping, modes
// ============================================================================
//
// A watcher owns an evaluator closure and the set of subjects it read during
// its most recent run. Every run collects subscriptions from scratch into a
// "new" set, then prunes itself from subjects it no longer reads. Four modes:
//
// - sync:   invalidation re-runs immediately
// - render: invalidation queues; owned by a component instance
// - lazy:   invalidation marks dirty; recompute happens on the next read
// - user:   invalidation queues; faults are contained and reported
// ============================================================================

use std::cell::{Cell, RefCell};
use std::collections::HashSet;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::core::constants::*;
use crate::core::context::{with_context, TargetGuard};
use crate::core::error::{panic_message, report_fault, Fault, FaultContext};
use crate::lifecycle::instance::{
    forget_watcher, notify_owner_updated, register_with_active_instance, InstanceInner,
};
use crate::reactivity::scheduler::{flush, schedule};
use crate::reactivity::subject::Subject;

// =============================================================================
// TYPE-ERASED WATCHER TRAIT
// =============================================================================

/// Type-erased view of a watcher, so subjects and the scheduler can hold
/// computations of different value types in one graph.
pub trait AnyWatcher {
    /// Creation-sequence id. Total order of watcher creation.
    fn id(&self) -> u64;

    /// Current mode and status flags.
    fn flags(&self) -> u32;

    /// Called by `Subject::depend` with the subject being read. The watcher
    /// applies run-local dedup and subscribes itself if new.
    fn add_subject(&self, subject: Subject);

    /// Invalidation entry point: dispatches on mode (dirty / run / queue).
    fn update(&self);

    /// Re-evaluates and fires the callback when the value changed.
    fn run(&self);

    /// Runs the pre-flush hook, if any. Called by the scheduler just before
    /// `run` during a flush.
    fn run_before(&self);

    /// Tells a render watcher's owner instance that a flush re-ran it.
    fn notify_updated(&self);

    /// False once torn down.
    fn is_active(&self) -> bool;

    /// Unsubscribes from every subject and drops the closures. Idempotent.
    fn teardown(&self);
}

// =============================================================================
// WATCHER INNER
// =============================================================================

pub(crate) type EqualsFn<T> = Box<dyn Fn(&T, &T) -> bool>;
pub(crate) type CallbackFn<T> = Box<dyn FnMut(&T, Option<&T>)>;

/// Everything needed to create a watcher. Internal construction surface for
/// the computed, watch, and lifecycle modules.
pub(crate) struct WatcherSpec<T> {
    pub flags: u32,
    pub expr: Rc<dyn Fn() -> T>,
    pub callback: Option<CallbackFn<T>>,
    pub before: Option<Rc<dyn Fn()>>,
    pub equals: Option<EqualsFn<T>>,
    pub deep_hook: Option<Box<dyn Fn(&T)>>,
}

pub(crate) struct WatcherInner<T: 'static> {
    id: u64,
    flags: Cell<u32>,

    expr: RefCell<Option<Rc<dyn Fn() -> T>>>,
    callback: RefCell<Option<CallbackFn<T>>>,
    before: RefCell<Option<Rc<dyn Fn()>>>,
    equals: Option<EqualsFn<T>>,
    deep_hook: Option<Box<dyn Fn(&T)>>,

    /// Memoized result of the most recent successful evaluation.
    value: RefCell<Option<T>>,

    /// Subjects read during the previous run, with an id set for O(1) dedup.
    subjects: RefCell<Vec<Subject>>,
    subject_ids: RefCell<HashSet<usize>>,

    /// Subjects read so far during the current run.
    new_subjects: RefCell<Vec<Subject>>,
    new_subject_ids: RefCell<HashSet<usize>>,

    /// Downstream subject owned by lazy watchers; readers of the derived
    /// value subscribe here, and invalidation notifies it without
    /// recomputing.
    downstream: Subject,

    /// The component instance this watcher registered with, if any.
    owner: RefCell<Option<Weak<InstanceInner>>>,

    /// Weak self-reference so `&self` can re-enter the graph type-erased.
    self_weak: RefCell<Weak<WatcherInner<T>>>,
}

impl<T: 'static> WatcherInner<T> {
    pub(crate) fn create(spec: WatcherSpec<T>) -> Rc<Self> {
        let id = with_context(|ctx| ctx.next_watcher_id());
        let lazy = spec.flags & LAZY != 0;
        let initial_flags = spec.flags | ACTIVE | if lazy { DIRTY } else { 0 };

        let inner = Rc::new(Self {
            id,
            flags: Cell::new(initial_flags),
            expr: RefCell::new(Some(spec.expr)),
            callback: RefCell::new(spec.callback),
            before: RefCell::new(spec.before),
            equals: spec.equals,
            deep_hook: spec.deep_hook,
            value: RefCell::new(None),
            subjects: RefCell::new(Vec::new()),
            subject_ids: RefCell::new(HashSet::new()),
            new_subjects: RefCell::new(Vec::new()),
            new_subject_ids: RefCell::new(HashSet::new()),
            downstream: Subject::new(),
            owner: RefCell::new(None),
            self_weak: RefCell::new(Weak::new()),
        });
        *inner.self_weak.borrow_mut() = Rc::downgrade(&inner);

        let owner = register_with_active_instance(inner.clone() as Rc<dyn AnyWatcher>);
        *inner.owner.borrow_mut() = owner;

        // Lazy watchers wait for their first read; everyone else evaluates
        // now so the initial subscription set exists before any write.
        if !lazy {
            let value = inner.evaluate_value();
            if value.is_some() {
                *inner.value.borrow_mut() = value;
            }
        }

        inner
    }

    pub(crate) fn has_flag(&self, flag: u32) -> bool {
        self.flags.get() & flag != 0
    }

    fn set_flag(&self, flag: u32) {
        self.flags.set(self.flags.get() | flag);
    }

    fn clear_flag(&self, flag: u32) {
        self.flags.set(self.flags.get() & !flag);
    }

    fn fault_context(&self) -> FaultContext {
        if self.has_flag(RENDER) {
            FaultContext::Render
        } else if self.has_flag(LAZY) {
            FaultContext::Computed
        } else {
            FaultContext::Watcher
        }
    }

    // =========================================================================
    // EVALUATION
    // =========================================================================

    /// Runs the evaluator with this watcher on top of the evaluation stack.
    ///
    /// The stack frame pops and the subscription sets swap on every exit
    /// path, including unwinds. Render and user watchers contain evaluator
    /// faults here; lazy computed faults propagate to the reader's boundary.
    fn evaluate_value(&self) -> Option<T> {
        let expr = self.expr.borrow().clone();
        let Some(f) = expr else {
            return None;
        };

        let weak: Weak<dyn AnyWatcher> = self.self_weak.borrow().clone();
        let _cleanup = CleanupGuard { watcher: self };
        let _frame = TargetGuard::push(Some(weak));

        let contained = self.flags.get() & (USER | RENDER) != 0;
        let value = if contained {
            match catch_unwind(AssertUnwindSafe(|| f())) {
                Ok(v) => Some(v),
                Err(payload) => {
                    report_fault(Fault::Evaluator {
                        context: self.fault_context(),
                        message: panic_message(&*payload),
                    });
                    None
                }
            }
        } else {
            Some(f())
        };

        // Deep watchers traverse the result while still on the stack, so
        // nested reactive structure subscribes too.
        if let Some(v) = &value {
            if let Some(hook) = &self.deep_hook {
                hook(v);
            }
        }

        value
    }

    /// Swaps the subscription sets after a run: unsubscribe from every
    /// subject of the previous run that was not re-read, then promote the
    /// new set to current.
    fn cleanup_subjects(&self) {
        {
            let new_ids = self.new_subject_ids.borrow();
            let old: Vec<Subject> = self.subjects.borrow().clone();
            for subject in &old {
                if !new_ids.contains(&subject.id()) {
                    subject.remove_watcher(self.id);
                }
            }
        }

        std::mem::swap(
            &mut *self.subjects.borrow_mut(),
            &mut *self.new_subjects.borrow_mut(),
        );
        std::mem::swap(
            &mut *self.subject_ids.borrow_mut(),
            &mut *self.new_subject_ids.borrow_mut(),
        );
        self.new_subjects.borrow_mut().clear();
        self.new_subject_ids.borrow_mut().clear();
    }

    // =========================================================================
    // LAZY API (used by Computed)
    // =========================================================================

    /// Recomputes the memoized value and clears the dirty bit.
    pub(crate) fn evaluate(&self) {
        if let Some(value) = self.evaluate_value() {
            *self.value.borrow_mut() = Some(value);
        }
        self.clear_flag(DIRTY);
    }

    /// Forwards the current evaluation-stack top's subscription to the
    /// downstream subject, so staleness reaches readers without recompute.
    pub(crate) fn depend(&self) {
        self.downstream.depend();
    }

    pub(crate) fn cloned_value(&self) -> Option<T>
    where
        T: Clone,
    {
        self.value.borrow().clone()
    }

    pub(crate) fn with_value<R>(&self, f: impl FnOnce(Option<&T>) -> R) -> R {
        f(self.value.borrow().as_ref())
    }

    /// Fires the callback once with the current value, used by immediate
    /// watchers at creation. Cell writes from the callback are batched so
    /// the flush cannot re-enter this watcher while its value is borrowed.
    pub(crate) fn call_immediate(&self) {
        let cb_opt = self.callback.borrow_mut().take();
        let Some(mut cb) = cb_opt else {
            return;
        };

        with_context(|ctx| ctx.enter_batch());
        let outcome = {
            let value = self.value.borrow();
            match value.as_ref() {
                Some(v) => catch_unwind(AssertUnwindSafe(|| cb(v, None))),
                None => Ok(()),
            }
        };
        if let Err(payload) = outcome {
            report_fault(Fault::ImmediateCallback {
                message: panic_message(&*payload),
            });
        }

        if self.callback.borrow().is_none() && self.is_active() {
            *self.callback.borrow_mut() = Some(cb);
        }

        let should_flush = with_context(|ctx| ctx.exit_batch());
        if should_flush {
            flush();
        }
    }
}

/// Runs `cleanup_subjects` when evaluation exits, after the target frame
/// has popped. Declared before the frame guard so it drops after it.
struct CleanupGuard<'a, T: 'static> {
    watcher: &'a WatcherInner<T>,
}

impl<T: 'static> Drop for CleanupGuard<'_, T> {
    fn drop(&mut self) {
        self.watcher.cleanup_subjects();
    }
}

// =============================================================================
// ANYWATCHER IMPL
// =============================================================================

impl<T: 'static> AnyWatcher for WatcherInner<T> {
    fn id(&self) -> u64 {
        self.id
    }

    fn flags(&self) -> u32 {
        self.flags.get()
    }

    fn add_subject(&self, subject: Subject) {
        let sid = subject.id();
        let inserted = self.new_subject_ids.borrow_mut().insert(sid);
        if inserted {
            self.new_subjects.borrow_mut().push(subject.clone());
            // Only subscribe if the previous run was not already a member.
            if !self.subject_ids.borrow().contains(&sid) {
                let weak: Weak<dyn AnyWatcher> = self.self_weak.borrow().clone();
                subject.add_watcher(self.id, weak);
            }
        }
    }

    fn update(&self) {
        if !self.is_active() {
            return;
        }

        if self.has_flag(LAZY) {
            // Mark stale and let readers of the derived value know, without
            // recomputing. A second invalidation while already dirty has
            // nothing left to propagate.
            if !self.has_flag(DIRTY) {
                self.set_flag(DIRTY);
                self.downstream.notify();
            }
            return;
        }

        if self.has_flag(SYNC) {
            self.run();
            return;
        }

        let weak = self.self_weak.borrow().clone();
        if let Some(rc) = weak.upgrade() {
            schedule(rc as Rc<dyn AnyWatcher>);
        }
    }

    fn run(&self) {
        if !self.is_active() {
            return;
        }

        let Some(new_value) = self.evaluate_value() else {
            // Contained evaluator fault: keep the previous value, skip the
            // callback.
            return;
        };
        self.clear_flag(DIRTY);

        let old_value = self.value.borrow_mut().take();
        let fire = self.has_flag(DEEP)
            || match (&old_value, &self.equals) {
                (Some(old), Some(eq)) => !eq(old, &new_value),
                _ => true,
            };

        if fire {
            let cb_opt = self.callback.borrow_mut().take();
            if let Some(mut cb) = cb_opt {
                if self.has_flag(USER) {
                    let outcome =
                        catch_unwind(AssertUnwindSafe(|| cb(&new_value, old_value.as_ref())));
                    if let Err(payload) = outcome {
                        report_fault(Fault::WatchCallback {
                            message: panic_message(&*payload),
                        });
                    }
                } else {
                    cb(&new_value, old_value.as_ref());
                }
                // The callback may have torn this watcher down; only put the
                // closure back if the slot is still ours.
                if self.callback.borrow().is_none() && self.is_active() {
                    *self.callback.borrow_mut() = Some(cb);
                }
            }
        }

        *self.value.borrow_mut() = Some(new_value);
    }

    fn run_before(&self) {
        let before = self.before.borrow().clone();
        if let Some(hook) = before {
            hook();
        }
    }

    fn notify_updated(&self) {
        if !self.has_flag(RENDER) {
            return;
        }
        let owner = self.owner.borrow().clone();
        if let Some(owner) = owner {
            notify_owner_updated(&owner);
        }
    }

    fn is_active(&self) -> bool {
        self.flags.get() & ACTIVE != 0
    }

    fn teardown(&self) {
        if !self.is_active() {
            return;
        }
        self.clear_flag(ACTIVE);

        // A lazy watcher that was never read has no memo yet. Evaluate one
        // last time so reads through a surviving handle still see a value;
        // the subscriptions this run collects are removed just below.
        if self.has_flag(LAZY) && self.value.borrow().is_none() {
            match catch_unwind(AssertUnwindSafe(|| self.evaluate_value())) {
                Ok(Some(value)) => *self.value.borrow_mut() = Some(value),
                Ok(None) => {}
                Err(payload) => {
                    report_fault(Fault::Evaluator {
                        context: FaultContext::Computed,
                        message: panic_message(&*payload),
                    });
                }
            }
        }
        self.clear_flag(DIRTY);

        if let Some(owner) = self.owner.borrow_mut().take() {
            forget_watcher(&owner, self.id);
        }

        let subjects: Vec<Subject> = self.subjects.borrow().clone();
        for subject in &subjects {
            subject.remove_watcher(self.id);
        }
        self.subjects.borrow_mut().clear();
        self.subject_ids.borrow_mut().clear();
        self.new_subjects.borrow_mut().clear();
        self.new_subject_ids.borrow_mut().clear();

        // Drop the closures so anything they capture is released. The
        // memoized value survives for stale reads through computed handles.
        self.expr.borrow_mut().take();
        self.callback.borrow_mut().take();
        self.before.borrow_mut().take();

        tracing::trace!(id = self.id, "watcher torn down");
    }
}
