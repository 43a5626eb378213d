// ============================================================================
// rill-reactive - ReactiveVec
// A proxied vector: structural mutations notify unconditionally
// ============================================================================
//
// Reads go through the collection subject; length reads have their own
// cell so watchers of `len` are untouched by order-only mutations. The
// seven structural operations (push, pop, shift, unshift, splice, sort,
// reverse) notify after applying the native mutation, with no equality
// check - an empty splice still counts as a mutation.
//
// Plain indexed writes cannot be intercepted without handing out an
// unobserved `&mut`, so `IndexMut` is deliberately absent; `set` and
// `truncate` are the supported in-place mutation paths and notify like
// structural ops.
// ============================================================================

use std::cell::RefCell;
use std::rc::Rc;

use crate::primitives::cell::ReactiveCell;
use crate::primitives::watch::DeepTrack;
use crate::reactivity::subject::Subject;

// =============================================================================
// REACTIVE VEC
// =============================================================================

struct VecInner<T> {
    items: RefCell<Vec<T>>,
    subject: Subject,
    length: ReactiveCell<usize>,
}

/// A reactive vector.
///
/// # Example
///
/// ```
/// use rill_reactive::ReactiveVec;
///
/// let items: ReactiveVec<i32> = ReactiveVec::new();
/// items.push(1);
/// items.push(2);
/// items.unshift(0);
///
/// assert_eq!(items.to_vec(), vec![0, 1, 2]);
/// assert_eq!(items.shift(), Some(0));
/// assert_eq!(items.len(), 2);
/// ```
pub struct ReactiveVec<T: 'static> {
    inner: Rc<VecInner<T>>,
}

impl<T: 'static> Clone for ReactiveVec<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> ReactiveVec<T> {
    pub fn new() -> Self {
        Self::from_vec(Vec::new())
    }

    pub fn from_vec(items: Vec<T>) -> Self {
        let len = items.len();
        Self {
            inner: Rc::new(VecInner {
                items: RefCell::new(items),
                subject: Subject::new(),
                length: ReactiveCell::new(len),
            }),
        }
    }

    /// Notifies after a structural mutation. Always fires the collection
    /// subject; the length cell handles its own no-change suppression.
    fn notify_mutation(&self) {
        let len = self.inner.items.borrow().len();
        self.inner.length.set(len);
        self.inner.subject.notify();
    }

    // =========================================================================
    // READS
    // =========================================================================

    /// Number of elements. Tracks only the length cell.
    pub fn len(&self) -> usize {
        self.inner.length.get()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Element at `index` (cloning). Tracks the collection subject.
    pub fn get(&self, index: usize) -> Option<T>
    where
        T: Clone,
    {
        self.inner.subject.depend();
        self.inner.items.borrow().get(index).cloned()
    }

    /// Borrows the whole slice through a closure. Tracks the collection
    /// subject.
    pub fn with<R>(&self, f: impl FnOnce(&[T]) -> R) -> R {
        self.inner.subject.depend();
        f(&self.inner.items.borrow())
    }

    pub fn to_vec(&self) -> Vec<T>
    where
        T: Clone,
    {
        self.with(|items| items.to_vec())
    }

    pub fn first(&self) -> Option<T>
    where
        T: Clone,
    {
        self.get(0)
    }

    pub fn last(&self) -> Option<T>
    where
        T: Clone,
    {
        self.inner.subject.depend();
        self.inner.items.borrow().last().cloned()
    }

    // =========================================================================
    // STRUCTURAL OPERATIONS
    // =========================================================================

    /// Appends an element.
    pub fn push(&self, value: T) {
        self.inner.items.borrow_mut().push(value);
        self.notify_mutation();
    }

    /// Removes and returns the last element.
    pub fn pop(&self) -> Option<T> {
        let value = self.inner.items.borrow_mut().pop();
        self.notify_mutation();
        value
    }

    /// Removes and returns the first element.
    pub fn shift(&self) -> Option<T> {
        let value = {
            let mut items = self.inner.items.borrow_mut();
            if items.is_empty() {
                None
            } else {
                Some(items.remove(0))
            }
        };
        self.notify_mutation();
        value
    }

    /// Prepends an element.
    pub fn unshift(&self, value: T) {
        self.inner.items.borrow_mut().insert(0, value);
        self.notify_mutation();
    }

    /// Removes `delete_count` elements starting at `start` (both clamped to
    /// the vector), inserting `new_items` in their place. Returns the
    /// removed elements. Notifies even when it removed and inserted
    /// nothing.
    pub fn splice(&self, start: usize, delete_count: usize, new_items: Vec<T>) -> Vec<T> {
        let removed = {
            let mut items = self.inner.items.borrow_mut();
            let start = start.min(items.len());
            let end = start.saturating_add(delete_count).min(items.len());
            items.splice(start..end, new_items).collect()
        };
        self.notify_mutation();
        removed
    }

    /// Sorts in place with a comparator. Notifies even if the order did not
    /// change.
    pub fn sort_by(&self, compare: impl FnMut(&T, &T) -> std::cmp::Ordering) {
        self.inner.items.borrow_mut().sort_by(compare);
        self.notify_mutation();
    }

    /// Reverses in place. Notifies unconditionally.
    pub fn reverse(&self) {
        self.inner.items.borrow_mut().reverse();
        self.notify_mutation();
    }

    // =========================================================================
    // EXPLICIT IN-PLACE MUTATION
    // =========================================================================

    /// Replaces the element at `index`, notifying like a structural op.
    /// Out of bounds is reported as misuse and ignored.
    pub fn set(&self, index: usize, value: T) -> bool {
        {
            let mut items = self.inner.items.borrow_mut();
            if index >= items.len() {
                drop(items);
                tracing::warn!(index, "reactive vec set out of bounds was ignored");
                return false;
            }
            items[index] = value;
        }
        self.notify_mutation();
        true
    }

    /// Shortens the vector, notifying like a structural op.
    pub fn truncate(&self, len: usize) {
        self.inner.items.borrow_mut().truncate(len);
        self.notify_mutation();
    }

    pub fn clear(&self) {
        self.truncate(0);
    }

    /// The collection subject, for graph inspection.
    pub fn subject(&self) -> &Subject {
        &self.inner.subject
    }
}

impl<T: 'static> Default for ReactiveVec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug + 'static> std::fmt::Debug for ReactiveVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.inner.items.borrow().iter()).finish()
    }
}

impl<T: DeepTrack + 'static> DeepTrack for ReactiveVec<T> {
    fn deep_track(&self) {
        self.with(|items| {
            for item in items {
                item.deep_track();
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::watch::watch;
    use std::cell::Cell;

    /// Counts how many times a watcher of the whole collection re-evaluates.
    /// The initial evaluation at creation is excluded.
    fn counting_watcher(
        items: &ReactiveVec<i32>,
    ) -> (Rc<Cell<i32>>, crate::primitives::watch::WatchHandle) {
        let evals = Rc::new(Cell::new(0));
        let evals_clone = evals.clone();
        let items = items.clone();
        let handle = watch(
            move || {
                evals_clone.set(evals_clone.get() + 1);
                items.with(|v| v.to_vec())
            },
            |_, _| {},
        );
        evals.set(0);
        (evals, handle)
    }

    #[test]
    fn each_structural_op_notifies() {
        let items = ReactiveVec::from_vec(vec![3, 1, 2]);
        let (runs, _handle) = counting_watcher(&items);

        items.push(4);
        assert_eq!(runs.get(), 1);
        assert_eq!(items.pop(), Some(4));
        assert_eq!(runs.get(), 2);
        items.unshift(0);
        assert_eq!(runs.get(), 3);
        assert_eq!(items.shift(), Some(0));
        assert_eq!(runs.get(), 4);
        items.sort_by(|a, b| a.cmp(b));
        assert_eq!(runs.get(), 5);
        items.reverse();
        assert_eq!(runs.get(), 6);
        assert_eq!(items.to_vec(), vec![3, 2, 1]);
    }

    #[test]
    fn splice_removes_and_inserts() {
        let items = ReactiveVec::from_vec(vec![1, 2, 3, 4]);
        let removed = items.splice(1, 2, vec![9, 9, 9]);
        assert_eq!(removed, vec![2, 3]);
        assert_eq!(items.to_vec(), vec![1, 9, 9, 9, 4]);
    }

    #[test]
    fn empty_splice_still_notifies() {
        let items: ReactiveVec<i32> = ReactiveVec::new();
        let (runs, _handle) = counting_watcher(&items);

        let removed = items.splice(0, 0, Vec::new());
        assert!(removed.is_empty());
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn sort_does_not_wake_length_watchers() {
        let items = ReactiveVec::from_vec(vec![2, 1]);
        let len_runs = Rc::new(Cell::new(0));

        let len_runs_clone = len_runs.clone();
        let items_read = items.clone();
        let _handle = watch(move || items_read.len(), move |_, _| {
            len_runs_clone.set(len_runs_clone.get() + 1)
        });

        items.sort_by(|a, b| a.cmp(b));
        assert_eq!(len_runs.get(), 0);

        items.push(3);
        assert_eq!(len_runs.get(), 1);
    }

    #[test]
    fn set_replaces_in_bounds_and_rejects_out_of_bounds() {
        let items = ReactiveVec::from_vec(vec![1, 2]);
        let (runs, _handle) = counting_watcher(&items);

        assert!(items.set(1, 9));
        assert_eq!(items.to_vec(), vec![1, 9]);
        assert_eq!(runs.get(), 1);

        assert!(!items.set(5, 0));
        assert_eq!(runs.get(), 1);
    }

    #[test]
    fn truncate_and_clear_notify() {
        let items = ReactiveVec::from_vec(vec![1, 2, 3]);
        let (runs, _handle) = counting_watcher(&items);

        items.truncate(1);
        assert_eq!(items.to_vec(), vec![1]);
        items.clear();
        assert!(items.is_empty());
        assert_eq!(runs.get(), 2);
    }
}
