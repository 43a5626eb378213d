// ============================================================================
// rill-reactive - Lifecycle Module
// Component instances and the suspension cache
// ============================================================================

pub mod instance;
pub mod keep_alive;

pub use instance::{ComponentInstance, ComponentOptions, Hook};
pub use keep_alive::{cache_key, KeepAlive};
