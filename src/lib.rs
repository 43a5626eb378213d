// ============================================================================
// rill-reactive - A Dependency-Tracking Reactive Runtime
// ============================================================================
//
// Reactive cells hold observable state; watchers evaluate expressions and
// record which cells they read; writes notify exactly those watchers, in
// a batched flush ordered by watcher creation sequence. On top of that:
// lazily memoized computed values, a proxied reactive vector, component
// instances with lifecycle hooks, and an LRU suspension cache.
// ============================================================================

pub mod collections;
pub mod core;
pub mod lifecycle;
pub mod primitives;
pub mod reactivity;

// Re-export core items at crate root for ergonomic access
pub use crate::core::constants;
pub use crate::core::context::{is_batching, is_tracking, with_context, ReactiveContext};
pub use crate::core::error::{clear_fault_handler, set_fault_handler, Fault, FaultContext};

// Re-export primitives at crate root
pub use crate::primitives::cell::{wrap, wrap_with_equals, CellEquals, ReactiveCell};
pub use crate::primitives::computed::{
    computed, computed_binding, computed_with_setter, Computed, ComputedBinding,
};
pub use crate::primitives::watch::{watch, watch_with, DeepTrack, WatchHandle, WatchOptions};
pub use crate::primitives::watcher::AnyWatcher;

// Re-export reactivity functions
pub use crate::reactivity::batching::{batch, tick, untracked};
pub use crate::reactivity::subject::Subject;

// Re-export collections
pub use crate::collections::ReactiveVec;

// Re-export lifecycle
pub use crate::lifecycle::instance::{ComponentInstance, ComponentOptions, Hook};
pub use crate::lifecycle::keep_alive::{cache_key, KeepAlive};

// =============================================================================
// TESTS
// =============================================================================
