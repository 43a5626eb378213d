// ============================================================================
// rill-reactive - Reactive Cell
// The typed unit of observable state
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use crate::reactivity::subject::Subject;

/// Equality predicate used to decide whether a write changed anything.
pub type CellEquals<T> = fn(&T, &T) -> bool;

// =============================================================================
// REACTIVE CELL
// =============================================================================

struct CellInner<T> {
    value: RefCell<T>,
    subject: Subject,
    equals: CellEquals<T>,
}

/// A reactive cell holding a value of type `T`.
///
/// Reading through `get` or `with` subscribes the computation currently
/// evaluating; writing through `set` notifies dependents, unless the new
/// value compares equal to the old one.
///
/// The handle is cheap to clone and clones share identity; a cell is never
/// re-wrapped.
///
/// # Example
///
/// ```
/// use rill_reactive::wrap;
///
/// let count = wrap(0);
/// assert_eq!(count.get(), 0);
///
/// count.set(5);
/// assert_eq!(count.get(), 5);
/// ```
pub struct ReactiveCell<T: 'static> {
    inner: Rc<CellInner<T>>,
}

impl<T: 'static> Clone for ReactiveCell<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: PartialEq + 'static> ReactiveCell<T> {
    /// Creates a cell using `PartialEq` to detect no-op writes.
    pub fn new(value: T) -> Self {
        Self::new_with_equals(value, |a, b| a == b)
    }
}

impl<T: 'static> ReactiveCell<T> {
    /// Creates a cell with a custom equality predicate. Pass a predicate
    /// that always returns false to notify on every write.
    pub fn new_with_equals(value: T, equals: CellEquals<T>) -> Self {
        Self {
            inner: Rc::new(CellInner {
                value: RefCell::new(value),
                subject: Subject::new(),
                equals,
            }),
        }
    }

    /// Returns the current value (cloning) and subscribes the reader.
    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.inner.subject.depend();
        self.inner.value.borrow().clone()
    }

    /// Accesses the current value through a closure (no clone) and
    /// subscribes the reader.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.inner.subject.depend();
        f(&self.inner.value.borrow())
    }

    /// Returns the current value without subscribing anyone.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Writes a new value. Returns true if it differed from the old one and
    /// dependents were notified; an identical value stores nothing and
    /// notifies no one.
    pub fn set(&self, value: T) -> bool {
        let changed = {
            let current = self.inner.value.borrow();
            !(self.inner.equals)(&current, &value)
        };
        if changed {
            *self.inner.value.borrow_mut() = value;
            self.inner.subject.notify();
        }
        changed
    }

    /// Mutates the value in place. Always treated as a change.
    ///
    /// # Example
    ///
    /// ```
    /// use rill_reactive::wrap;
    ///
    /// let count = wrap(0);
    /// count.update(|n| *n += 1);
    /// assert_eq!(count.get(), 1);
    /// ```
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        f(&mut self.inner.value.borrow_mut());
        self.inner.subject.notify();
    }

    /// The cell's subject, for graph inspection.
    pub fn subject(&self) -> &Subject {
        &self.inner.subject
    }
}

/// Identity comparison: two handles are equal when they share one cell.
impl<T: 'static> PartialEq for ReactiveCell<T> {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for ReactiveCell<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReactiveCell")
            .field("value", &*self.inner.value.borrow())
            .finish()
    }
}

// =============================================================================
// WRAPPING ENTRY POINTS
// =============================================================================

/// Wraps a value in a reactive cell. The primary entry point for installing
/// observable state.
///
/// # Example
///
/// ```
/// use rill_reactive::{wrap, watch};
///
/// let name = wrap(String::from("a"));
/// let name_read = name.clone();
/// let _handle = watch(move || name_read.get(), |new, _old| {
///     println!("name is now {new}");
/// });
/// name.set(String::from("b"));
/// ```
pub fn wrap<T: PartialEq + 'static>(value: T) -> ReactiveCell<T> {
    ReactiveCell::new(value)
}

/// Wraps a value with a custom equality predicate.
pub fn wrap_with_equals<T: 'static>(value: T, equals: CellEquals<T>) -> ReactiveCell<T> {
    ReactiveCell::new_with_equals(value, equals)
}
