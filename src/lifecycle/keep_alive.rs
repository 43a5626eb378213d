// ============================================================================
// rill-reactive - KeepAlive
// LRU suspension cache for component subtrees
// ============================================================================
//
// Instead of destroying a subtree when it leaves the display, a KeepAlive
// container suspends it and keeps the instance cached under a key. Showing
// a cached key reuses the instance verbatim - creation never re-runs - and
// promotes it to most-recently-used. When a capacity bound is exceeded, the
// least-recently-used entry is evicted and destroyed, unless it is the
// entry currently displayed: the displayed subtree's cache slot may go, but
// the live instance is never destroyed out from under the display.
// ============================================================================

use std::cell::RefCell;
use std::collections::HashMap;

use crate::lifecycle::instance::ComponentInstance;

// =============================================================================
// CACHE KEY
// =============================================================================

/// Builds a cache key from a component definition id and an optional tag.
/// Definition identity alone is not unique: the same definition can be
/// registered under different tags, so the tag participates when present.
pub fn cache_key(definition_id: u64, tag: Option<&str>) -> String {
    match tag {
        Some(tag) => format!("{definition_id}::{tag}"),
        None => definition_id.to_string(),
    }
}

// =============================================================================
// KEEP ALIVE
// =============================================================================

/// An LRU cache of suspended component subtrees.
pub struct KeepAlive {
    cache: RefCell<HashMap<String, ComponentInstance>>,
    /// LRU order, oldest first.
    keys: RefCell<Vec<String>>,
    max: Option<usize>,
    /// Key of the entry currently displayed, shielded from eviction.
    current: RefCell<Option<String>>,
}

impl KeepAlive {
    /// Creates a cache; `max` bounds how many subtrees stay suspended.
    pub fn new(max: Option<usize>) -> Self {
        Self {
            cache: RefCell::new(HashMap::new()),
            keys: RefCell::new(Vec::new()),
            max,
            current: RefCell::new(None),
        }
    }

    /// Shows the subtree for `key`.
    ///
    /// On a hit the cached instance is reused without re-running creation,
    /// promoted to most-recently-used, and resumed. On a miss `build` runs,
    /// the result is cached, and the least-recently-used entry is evicted
    /// if the capacity bound is now exceeded. The previously displayed
    /// entry is suspended either way.
    pub fn show(&self, key: &str, build: impl FnOnce() -> ComponentInstance) -> ComponentInstance {
        let cached = self.cache.borrow().get(key).cloned();

        let previous = self.current.borrow().clone();
        let already_shown = previous.as_deref() == Some(key);
        if let Some(prev_key) = previous {
            if prev_key != key {
                let prev = self.cache.borrow().get(&prev_key).cloned();
                if let Some(prev) = prev {
                    prev.deactivate(true);
                }
            }
        }

        let instance = match cached {
            Some(instance) => {
                // Promote to most-recently-used.
                let mut keys = self.keys.borrow_mut();
                keys.retain(|k| k != key);
                keys.push(key.to_string());
                drop(keys);

                *self.current.borrow_mut() = Some(key.to_string());
                // Re-showing the displayed entry is a pure promote; only a
                // suspended entry resumes.
                if !already_shown {
                    instance.activate(true);
                }
                instance
            }
            None => {
                let instance = build();
                self.cache
                    .borrow_mut()
                    .insert(key.to_string(), instance.clone());
                self.keys.borrow_mut().push(key.to_string());
                *self.current.borrow_mut() = Some(key.to_string());

                if let Some(max) = self.max {
                    let over = self.keys.borrow().len() > max;
                    if over {
                        let oldest = self.keys.borrow().first().cloned();
                        if let Some(oldest) = oldest {
                            self.evict(&oldest);
                        }
                    }
                }
                instance
            }
        };

        instance
    }

    /// Removes one entry, destroying its instance unless it is the entry
    /// currently displayed.
    fn evict(&self, key: &str) {
        let entry = self.cache.borrow_mut().remove(key);
        self.keys.borrow_mut().retain(|k| k != key);
        if let Some(instance) = entry {
            let displayed = self.current.borrow().as_deref() == Some(key);
            if !displayed {
                tracing::debug!(key, "evicting cached subtree");
                instance.destroy();
            }
        }
    }

    /// Drops every entry whose key fails the filter, destroying the evicted
    /// instances under the displayed-entry guard.
    pub fn prune(&self, keep: impl Fn(&str) -> bool) {
        let keys: Vec<String> = self.keys.borrow().clone();
        for key in keys {
            if !keep(&key) {
                self.evict(&key);
            }
        }
    }

    /// Destroys every cached subtree and empties the cache. The displayed
    /// entry's instance survives; only its cache slot is released.
    pub fn destroy(&self) {
        let keys: Vec<String> = self.keys.borrow().clone();
        for key in keys {
            self.evict(&key);
        }
    }

    pub fn len(&self) -> usize {
        self.keys.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, key: &str) -> bool {
        self.cache.borrow().contains_key(key)
    }

    /// Keys from least- to most-recently-used.
    pub fn keys(&self) -> Vec<String> {
        self.keys.borrow().clone()
    }
}
