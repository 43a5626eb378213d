// ============================================================================
// rill-reactive - Batching and Untracked Reads
// Deferral boundary for writes, masking frames for reads
// ============================================================================

use crate::core::context::{with_context, TargetGuard};
use crate::reactivity::scheduler::flush;

// =============================================================================
// BATCH
// =============================================================================

struct BatchGuard {
    _private: (),
}

impl BatchGuard {
    fn enter() -> Self {
        with_context(|ctx| ctx.enter_batch());
        Self { _private: () }
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        let should_flush = with_context(|ctx| ctx.exit_batch());
        if should_flush {
            flush();
        }
    }
}

/// Defers watcher re-runs until `f` returns.
///
/// Nested batches flush once, at the outermost boundary. Each queued
/// watcher runs at most once per flush no matter how many writes hit it.
///
/// # Example
///
/// ```
/// use rill_reactive::{batch, wrap};
///
/// let a = wrap(1);
/// let b = wrap(2);
///
/// batch(|| {
///     a.set(10);
///     b.set(20);
///     // Dependents have not re-run yet.
/// });
/// // One flush happens here.
/// ```
pub fn batch<R>(f: impl FnOnce() -> R) -> R {
    let _guard = BatchGuard::enter();
    f()
}

/// Flushes any queued watchers now. Useful after low-level queueing or to
/// assert a settled graph in tests.
pub fn tick() {
    flush();
}

// =============================================================================
// UNTRACKED
// =============================================================================

/// Runs `f` with tracking masked: reads inside record no subscriptions.
///
/// # Example
///
/// ```
/// use rill_reactive::{untracked, wrap};
///
/// let count = wrap(3);
/// let value = untracked(|| count.get());
/// assert_eq!(value, 3);
/// ```
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _mask = TargetGuard::push(None);
    f()
}
