// ============================================================================
// rill-reactive - Fault Taxonomy and Reporting Channel
// Contained failures from evaluators, callbacks and lifecycle hooks
// ============================================================================
//
// Faults are caught at computation boundaries and forwarded to an injected
// handler instead of unwinding through the graph. The run that faulted is
// abandoned; subscriptions it already made stand, and the runtime stays
// usable.
// ============================================================================

use std::any::Any;
use std::cell::RefCell;
use std::fmt;

use thiserror::Error;

// =============================================================================
// FAULT TYPES
// =============================================================================

/// Which kind of computation an evaluator fault came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultContext {
    /// A component instance's render watcher.
    Render,
    /// A lazy computed getter.
    Computed,
    /// A user watcher's expression.
    Watcher,
}

impl fmt::Display for FaultContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FaultContext::Render => write!(f, "render"),
            FaultContext::Computed => write!(f, "computed"),
            FaultContext::Watcher => write!(f, "watcher"),
        }
    }
}

/// A contained failure, tagged with where in the runtime it surfaced.
#[derive(Debug, Error)]
pub enum Fault {
    #[error("evaluator for {context} computation panicked: {message}")]
    Evaluator {
        context: FaultContext,
        message: String,
    },

    #[error("callback for watcher panicked: {message}")]
    WatchCallback { message: String },

    #[error("callback for immediate watcher panicked: {message}")]
    ImmediateCallback { message: String },

    #[error("error in {stage} hook: {message}")]
    LifecycleHook {
        stage: &'static str,
        message: String,
    },

    #[error("infinite update loop detected in watcher {watcher_id}")]
    InfiniteUpdate { watcher_id: u64 },
}

// =============================================================================
// REPORTING CHANNEL
// =============================================================================

type FaultHandler = Box<dyn Fn(&Fault)>;

thread_local! {
    static FAULT_HANDLER: RefCell<Option<FaultHandler>> = const { RefCell::new(None) };
}

/// Installs a fault handler for this thread, returning the previous one.
///
/// Without a handler, faults are logged through `tracing::error!`.
pub fn set_fault_handler(handler: impl Fn(&Fault) + 'static) -> Option<Box<dyn Fn(&Fault)>> {
    FAULT_HANDLER.with(|h| h.borrow_mut().replace(Box::new(handler)))
}

/// Removes the installed fault handler, returning it.
pub fn clear_fault_handler() -> Option<Box<dyn Fn(&Fault)>> {
    FAULT_HANDLER.with(|h| h.borrow_mut().take())
}

/// Delivers a fault to the installed handler, or logs it.
pub(crate) fn report_fault(fault: Fault) {
    let delivered = FAULT_HANDLER.with(|h| {
        // Take the handler out for the call so a handler that itself
        // installs a new handler does not hit a double borrow.
        h.borrow_mut().take()
    });

    match delivered {
        Some(handler) => {
            handler(&fault);
            FAULT_HANDLER.with(|h| {
                let mut slot = h.borrow_mut();
                if slot.is_none() {
                    *slot = Some(handler);
                }
            });
        }
        None => {
            tracing::error!(fault = %fault, "unhandled reactive fault");
        }
    }
}

/// Best-effort extraction of a panic payload's message.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
