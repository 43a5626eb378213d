// ============================================================================
// rill-reactive - Computed
// Lazily memoized derived values
// ============================================================================

use std::rc::Rc;

use crate::core::constants::{DIRTY, LAZY};
use crate::core::context::is_tracking;
use crate::primitives::watcher::{AnyWatcher, WatcherInner, WatcherSpec};

// =============================================================================
// BINDING
// =============================================================================

/// How a computed value binds to its sources: a bare getter, or a
/// getter/setter pair. The variant is explicit so a write through a
/// getter-only computed is a reported misuse, not a silent assignment.
pub enum ComputedBinding<T> {
    Getter(Rc<dyn Fn() -> T>),
    GetterSetter {
        get: Rc<dyn Fn() -> T>,
        set: Rc<dyn Fn(T)>,
    },
}

// =============================================================================
// COMPUTED
// =============================================================================

/// A lazily evaluated, memoized derived value.
///
/// The getter runs at most once between invalidations, and never runs at
/// all if nobody reads the value. Invalidation propagates to readers (for
/// example a render watcher) without recomputing; the recompute happens on
/// the next read.
///
/// # Example
///
/// ```
/// use rill_reactive::{computed, wrap};
///
/// let count = wrap(2);
/// let count_read = count.clone();
/// let double = computed(move || count_read.get() * 2);
///
/// assert_eq!(double.get(), 4);
/// count.set(5);
/// assert_eq!(double.get(), 10);
/// ```
pub struct Computed<T: 'static> {
    watcher: Rc<WatcherInner<T>>,
    setter: Option<Rc<dyn Fn(T)>>,
}

impl<T: 'static> Clone for Computed<T> {
    fn clone(&self) -> Self {
        Self {
            watcher: self.watcher.clone(),
            setter: self.setter.clone(),
        }
    }
}

impl<T: 'static> Computed<T> {
    /// Returns the derived value, recomputing only if stale.
    ///
    /// When called from inside another computation, that computation
    /// subscribes to this value's staleness.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        if self.watcher.has_flag(DIRTY) {
            self.watcher.evaluate();
        }
        if is_tracking() {
            self.watcher.depend();
        }
        self.watcher
            .cloned_value()
            .expect("computed value read before any evaluation succeeded")
    }

    /// Like `get`, but hands out a reference instead of cloning.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        if self.watcher.has_flag(DIRTY) {
            self.watcher.evaluate();
        }
        if is_tracking() {
            self.watcher.depend();
        }
        self.watcher.with_value(|value| {
            f(value.expect("computed value read before any evaluation succeeded"))
        })
    }

    /// Writes through the setter half of a getter/setter binding. A
    /// getter-only computed reports structural misuse and ignores the write.
    pub fn set(&self, value: T) {
        match &self.setter {
            Some(set) => set(value),
            None => {
                tracing::warn!("write through a getter-only computed was ignored");
            }
        }
    }

    /// True while the memoized value is stale.
    pub fn is_dirty(&self) -> bool {
        self.watcher.has_flag(DIRTY)
    }

    /// Tears down the underlying watcher. A value that was never computed
    /// is evaluated one last time during teardown, so reads afterwards
    /// return a memoized value either way.
    pub fn stop(&self) {
        self.watcher.teardown();
    }
}

// =============================================================================
// CONSTRUCTORS
// =============================================================================

/// Creates a computed from a bare getter.
pub fn computed<T: 'static>(get: impl Fn() -> T + 'static) -> Computed<T> {
    computed_binding(ComputedBinding::Getter(Rc::new(get)))
}

/// Creates a computed from a getter/setter pair.
///
/// # Example
///
/// ```
/// use rill_reactive::{computed_with_setter, wrap};
///
/// let celsius = wrap(0.0_f64);
/// let read = celsius.clone();
/// let write = celsius.clone();
/// let fahrenheit = computed_with_setter(
///     move || read.get() * 9.0 / 5.0 + 32.0,
///     move |f| { write.set((f - 32.0) * 5.0 / 9.0); },
/// );
///
/// assert_eq!(fahrenheit.get(), 32.0);
/// fahrenheit.set(212.0);
/// assert_eq!(celsius.get(), 100.0);
/// ```
pub fn computed_with_setter<T: 'static>(
    get: impl Fn() -> T + 'static,
    set: impl Fn(T) + 'static,
) -> Computed<T> {
    computed_binding(ComputedBinding::GetterSetter {
        get: Rc::new(get),
        set: Rc::new(set),
    })
}

/// Creates a computed from an explicit binding variant.
pub fn computed_binding<T: 'static>(binding: ComputedBinding<T>) -> Computed<T> {
    let (get, setter) = match binding {
        ComputedBinding::Getter(get) => (get, None),
        ComputedBinding::GetterSetter { get, set } => (get, Some(set)),
    };

    let watcher = WatcherInner::create(WatcherSpec {
        flags: LAZY,
        expr: get,
        callback: None,
        before: None,
        equals: None,
        deep_hook: None,
    });

    Computed { watcher, setter }
}
