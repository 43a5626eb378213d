// ============================================================================
// rill-reactive - Subject
// Per-cell registry of dependent watchers
// ============================================================================
//
// A subject sits between a reactive value and the computations that read it.
// `depend()` subscribes the current evaluation-stack top; `notify()` fans an
// invalidation out to every member. Notification iterates over a snapshot so
// members may tear down or re-subscribe mid-delivery without disturbing it.
// ============================================================================

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::core::context::with_context;
use crate::primitives::watcher::AnyWatcher;

// =============================================================================
// SUBJECT
// =============================================================================

struct SubjectInner {
    id: usize,
    /// Members paired with their watcher id for identity-based removal.
    watchers: RefCell<Vec<(u64, Weak<dyn AnyWatcher>)>>,
}

/// A cheap-to-clone handle to a dependent registry. Clones share identity.
pub struct Subject {
    inner: Rc<SubjectInner>,
}

impl Clone for Subject {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Subject {
    pub fn new() -> Self {
        let id = with_context(|ctx| ctx.next_subject_id());
        Self {
            inner: Rc::new(SubjectInner {
                id,
                watchers: RefCell::new(Vec::new()),
            }),
        }
    }

    /// Creation-ordered id, used by watchers for run-local dedup.
    pub fn id(&self) -> usize {
        self.inner.id
    }

    /// Subscribes the computation currently on top of the evaluation stack.
    ///
    /// Control is inverted: the watcher is handed this subject and applies
    /// its own run-local dedup before asking to be added as a member.
    pub fn depend(&self) {
        let target = with_context(|ctx| ctx.current_target());
        if let Some(weak) = target {
            if let Some(watcher) = weak.upgrade() {
                watcher.add_subject(self.clone());
            }
        }
    }

    /// Adds a member. Called back from `AnyWatcher::add_subject` once the
    /// watcher has verified it is not already subscribed.
    pub(crate) fn add_watcher(&self, id: u64, watcher: Weak<dyn AnyWatcher>) {
        self.inner.watchers.borrow_mut().push((id, watcher));
    }

    /// Drops one member by watcher id, along with any dead entries.
    pub(crate) fn remove_watcher(&self, id: u64) {
        self.inner
            .watchers
            .borrow_mut()
            .retain(|(wid, weak)| *wid != id && weak.strong_count() > 0);
    }

    /// Invalidates every member, in subscription order.
    ///
    /// The member list is snapshotted first, so a member that unsubscribes
    /// (or subscribes another watcher) during delivery cannot skip or
    /// double-deliver to anyone in this round.
    pub fn notify(&self) {
        let members: Vec<Rc<dyn AnyWatcher>> = {
            let mut list = self.inner.watchers.borrow_mut();
            list.retain(|(_, weak)| weak.strong_count() > 0);
            list.iter().filter_map(|(_, weak)| weak.upgrade()).collect()
        };

        for watcher in members {
            watcher.update();
        }
    }

    /// Number of live members.
    pub fn watcher_count(&self) -> usize {
        self.inner
            .watchers
            .borrow()
            .iter()
            .filter(|(_, weak)| weak.strong_count() > 0)
            .count()
    }
}

impl Default for Subject {
    fn default() -> Self {
        Self::new()
    }
}
