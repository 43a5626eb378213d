// ============================================================================
// rill-reactive - Core Module
// Flags, thread-local context, and the fault reporting channel
// ============================================================================

pub mod constants;
pub mod context;
pub mod error;

// Re-export commonly used items
pub use constants::*;
pub use context::{is_batching, is_tracking, with_context, ReactiveContext};
pub use error::{clear_fault_handler, set_fault_handler, Fault, FaultContext};
