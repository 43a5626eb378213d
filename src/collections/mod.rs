// ============================================================================
// rill-reactive - Reactive Collections
// Proxied containers whose structural mutations notify dependents
// ============================================================================

mod vec;

pub use vec::ReactiveVec;
