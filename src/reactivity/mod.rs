// ============================================================================
// rill-reactive - Reactivity Module
// Subjects, the batched scheduler, and read/write boundaries
// ============================================================================

pub mod batching;
pub mod scheduler;
pub mod subject;

pub use batching::{batch, tick, untracked};
pub use subject::Subject;
