// ============================================================================
// rill-reactive - Watcher Flags
// Bit flags describing a watcher's mode and status
// ============================================================================

// =============================================================================
// MODE FLAGS (set at creation, never change)
// =============================================================================

/// Lazy watcher: invalidation marks it dirty instead of scheduling a re-run.
/// The memoized value is recomputed on the next read.
pub const LAZY: u32 = 1 << 0;

/// User watcher: created through the watch API. Evaluator and callback
/// faults are contained and reported instead of unwinding.
pub const USER: u32 = 1 << 1;

/// Sync watcher: invalidation re-runs immediately, bypassing the queue.
pub const SYNC: u32 = 1 << 2;

/// Deep watcher: the evaluator's result is traversed after every run so
/// nested reactive structure subscribes too.
pub const DEEP: u32 = 1 << 3;

/// Render watcher: owned by a component instance, drives its output.
pub const RENDER: u32 = 1 << 4;

// =============================================================================
// STATUS FLAGS
// =============================================================================

/// Watcher is live. Cleared exactly once by teardown.
pub const ACTIVE: u32 = 1 << 8;

/// Lazy watcher's memoized value is stale.
pub const DIRTY: u32 = 1 << 9;

// =============================================================================
// SCHEDULER LIMITS
// =============================================================================

/// How many times a single watcher may re-enter the queue during one flush
/// before it is dropped from the flush and reported as an infinite update.
pub const MAX_UPDATE_COUNT: u32 = 100;
