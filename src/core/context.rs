// ============================================================================
// rill-reactive - Reactive Context
// Thread-local runtime state: evaluation stack, scheduler queue, id counters
// ============================================================================
//
// All reactive graph state for a thread lives here. Access goes through
// `with_context`, which hands out a mutable borrow of the context. Callers
// must never invoke user code (evaluators, callbacks, hooks) while inside
// `with_context` - collect what you need, exit, then act.
// ============================================================================

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::{Rc, Weak};

use crate::core::constants::MAX_UPDATE_COUNT;
use crate::primitives::watcher::AnyWatcher;

// =============================================================================
// CONTEXT
// =============================================================================

/// Per-thread reactive runtime state.
pub struct ReactiveContext {
    /// Evaluation stack. The top frame is the computation currently
    /// evaluating; a `None` frame masks tracking entirely (untracked
    /// regions, lifecycle hooks).
    eval_stack: Vec<Option<Weak<dyn AnyWatcher>>>,

    /// Creation-sequence counter for watchers. The scheduler flushes in
    /// ascending id order, so owners re-run before watchers created later.
    next_watcher_id: u64,

    /// Id counter for subjects.
    next_subject_id: usize,

    /// Scheduler queue, kept in ascending id order during a flush.
    queue: Vec<Rc<dyn AnyWatcher>>,

    /// Ids currently queued. A watcher invalidated N times runs once.
    queued_ids: HashSet<u64>,

    /// True while the queue is being flushed.
    flushing: bool,

    /// Position of the next unflushed queue entry.
    flush_index: usize,

    /// Nesting depth of `batch` calls. Non-zero defers flushing.
    batch_depth: usize,

    /// Per-flush re-queue counts, for infinite update detection.
    circular: HashMap<u64, u32>,
}

impl ReactiveContext {
    fn new() -> Self {
        Self {
            eval_stack: Vec::new(),
            next_watcher_id: 1,
            next_subject_id: 1,
            queue: Vec::new(),
            queued_ids: HashSet::new(),
            flushing: false,
            flush_index: 0,
            batch_depth: 0,
            circular: HashMap::new(),
        }
    }

    // =========================================================================
    // ID COUNTERS
    // =========================================================================

    pub fn next_watcher_id(&mut self) -> u64 {
        let id = self.next_watcher_id;
        self.next_watcher_id += 1;
        id
    }

    pub fn next_subject_id(&mut self) -> usize {
        let id = self.next_subject_id;
        self.next_subject_id += 1;
        id
    }

    // =========================================================================
    // EVALUATION STACK
    // =========================================================================

    /// The computation currently collecting subscriptions, if any.
    pub fn current_target(&self) -> Option<Weak<dyn AnyWatcher>> {
        self.eval_stack.last().and_then(|frame| frame.clone())
    }

    /// True when the stack top is a live tracking frame.
    pub fn is_tracking(&self) -> bool {
        matches!(self.eval_stack.last(), Some(Some(_)))
    }

    pub fn push_target(&mut self, target: Option<Weak<dyn AnyWatcher>>) {
        self.eval_stack.push(target);
    }

    pub fn pop_target(&mut self) {
        self.eval_stack.pop();
    }

    pub fn stack_depth(&self) -> usize {
        self.eval_stack.len()
    }

    // =========================================================================
    // BATCHING
    // =========================================================================

    pub fn is_batching(&self) -> bool {
        self.batch_depth > 0
    }

    pub fn enter_batch(&mut self) {
        self.batch_depth += 1;
    }

    /// Exits one batch level. Returns true when the outermost batch just
    /// ended with work queued, i.e. the caller should flush.
    pub fn exit_batch(&mut self) -> bool {
        debug_assert!(self.batch_depth > 0);
        self.batch_depth -= 1;
        self.batch_depth == 0 && !self.queue.is_empty() && !self.flushing
    }

    // =========================================================================
    // SCHEDULER QUEUE
    // =========================================================================

    /// Adds a watcher to the queue, deduplicating by id.
    ///
    /// While a flush is running, the watcher is spliced into the unflushed
    /// tail at the position that keeps ascending id order, and its re-queue
    /// count goes toward infinite update detection.
    pub fn enqueue(&mut self, watcher: Rc<dyn AnyWatcher>) -> EnqueueOutcome {
        let id = watcher.id();
        if !self.queued_ids.insert(id) {
            return EnqueueOutcome::Deduped;
        }

        if self.flushing {
            let count = self.circular.entry(id).or_insert(0);
            *count += 1;
            if *count > MAX_UPDATE_COUNT {
                self.queued_ids.remove(&id);
                return EnqueueOutcome::Overflow { watcher_id: id };
            }

            let mut at = self.queue.len();
            while at > self.flush_index && self.queue[at - 1].id() > id {
                at -= 1;
            }
            self.queue.insert(at, watcher);
            EnqueueOutcome::Queued { flush_now: false }
        } else {
            self.queue.push(watcher);
            EnqueueOutcome::Queued {
                flush_now: self.batch_depth == 0,
            }
        }
    }

    /// Marks the flush started and sorts the queue by creation sequence.
    /// Returns false if a flush is already in progress.
    pub fn begin_flush(&mut self) -> bool {
        if self.flushing {
            return false;
        }
        self.flushing = true;
        self.flush_index = 0;
        self.queue.sort_by_key(|w| w.id());
        true
    }

    /// Takes the next unflushed watcher, releasing its queued-id slot so a
    /// self-retriggering watcher can re-queue (counted by `circular`).
    pub fn next_flush_item(&mut self) -> Option<Rc<dyn AnyWatcher>> {
        if self.flush_index >= self.queue.len() {
            return None;
        }
        let watcher = self.queue[self.flush_index].clone();
        self.flush_index += 1;
        self.queued_ids.remove(&watcher.id());
        Some(watcher)
    }

    pub fn end_flush(&mut self) {
        self.queue.clear();
        self.queued_ids.clear();
        self.circular.clear();
        self.flush_index = 0;
        self.flushing = false;
    }

    pub fn is_flushing(&self) -> bool {
        self.flushing
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }
}

/// Result of `ReactiveContext::enqueue`.
pub enum EnqueueOutcome {
    /// Already queued, nothing to do.
    Deduped,
    /// Queued; `flush_now` asks the caller to flush immediately.
    Queued { flush_now: bool },
    /// The watcher exceeded `MAX_UPDATE_COUNT` re-queues in one flush.
    Overflow { watcher_id: u64 },
}

// =============================================================================
// THREAD-LOCAL ACCESS
// =============================================================================

thread_local! {
    static CONTEXT: RefCell<ReactiveContext> = RefCell::new(ReactiveContext::new());
}

/// Runs `f` with mutable access to the thread's reactive context.
///
/// Never call user code from inside `f`; the context is borrowed for the
/// duration.
pub fn with_context<F, R>(f: F) -> R
where
    F: FnOnce(&mut ReactiveContext) -> R,
{
    CONTEXT.with(|ctx| f(&mut ctx.borrow_mut()))
}

/// True when a computation is currently collecting subscriptions.
pub fn is_tracking() -> bool {
    with_context(|ctx| ctx.is_tracking())
}

/// True inside a `batch` call.
pub fn is_batching() -> bool {
    with_context(|ctx| ctx.is_batching())
}

// =============================================================================
// TARGET GUARD
// =============================================================================

/// Pushes an evaluation-stack frame, popping it on drop. The pop runs on
/// every exit path, including unwinds out of user code.
pub(crate) struct TargetGuard {
    _private: (),
}

impl TargetGuard {
    pub(crate) fn push(target: Option<Weak<dyn AnyWatcher>>) -> Self {
        with_context(|ctx| ctx.push_target(target));
        Self { _private: () }
    }
}

impl Drop for TargetGuard {
    fn drop(&mut self) {
        with_context(|ctx| ctx.pop_target());
    }
}
