// ============================================================================
// rill-reactive - Primitives Module
// Cells, watchers, computed values, and the watch API
// ============================================================================

pub mod cell;
pub mod computed;
pub mod watch;
pub mod watcher;

pub use cell::{wrap, wrap_with_equals, CellEquals, ReactiveCell};
pub use computed::{
    computed, computed_binding, computed_with_setter, Computed, ComputedBinding,
};
pub use watch::{watch, watch_with, DeepTrack, WatchHandle, WatchOptions};
pub use watcher::AnyWatcher;
