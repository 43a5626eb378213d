// ============================================================================
// rill-reactive - Component Instance
// Lifecycle state machine, hooks, and watcher ownership
// ============================================================================
//
// An instance moves through created -> mounted -> updated* ->
// (deactivated <-> activated)* -> destroyed. Every watcher created while
// the instance is active (its render watcher, instance-scoped watches,
// computeds built in `setup`) registers itself with the instance and is
// torn down with it.
//
// Hook listeners run with the evaluation stack masked: reads inside a hook
// never subscribe the computation that happened to trigger it.
// ============================================================================

use std::cell::{Cell, RefCell};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::{Rc, Weak};

use crate::core::constants::RENDER;
use crate::core::context::TargetGuard;
use crate::core::error::{panic_message, report_fault, Fault};
use crate::primitives::watch::{DeepTrack, WatchHandle, WatchOptions};
use crate::primitives::watcher::{AnyWatcher, WatcherInner, WatcherSpec};

// =============================================================================
// HOOKS
// =============================================================================

/// Lifecycle stages an instance announces to its listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Hook {
    Created,
    BeforeMount,
    Mounted,
    BeforeUpdate,
    Updated,
    Activated,
    Deactivated,
    BeforeDestroy,
    Destroyed,
}

impl Hook {
    pub fn name(&self) -> &'static str {
        match self {
            Hook::Created => "created",
            Hook::BeforeMount => "beforeMount",
            Hook::Mounted => "mounted",
            Hook::BeforeUpdate => "beforeUpdate",
            Hook::Updated => "updated",
            Hook::Activated => "activated",
            Hook::Deactivated => "deactivated",
            Hook::BeforeDestroy => "beforeDestroy",
            Hook::Destroyed => "destroyed",
        }
    }
}

/// Construction-time configuration: a display name and hook listeners.
#[derive(Default)]
pub struct ComponentOptions {
    name: Option<String>,
    hooks: Vec<(Hook, Rc<dyn Fn()>)>,
}

impl ComponentOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Registers a listener for a lifecycle stage. Listeners for one stage
    /// run in registration order.
    pub fn on(mut self, hook: Hook, listener: impl Fn() + 'static) -> Self {
        self.hooks.push((hook, Rc::new(listener)));
        self
    }
}

// =============================================================================
// INSTANCE
// =============================================================================

thread_local! {
    static NEXT_INSTANCE_ID: Cell<u64> = const { Cell::new(1) };
    static ACTIVE_INSTANCE: RefCell<Option<Rc<InstanceInner>>> = const { RefCell::new(None) };
}

pub(crate) struct InstanceInner {
    id: u64,
    name: Option<String>,
    parent: RefCell<Option<Weak<InstanceInner>>>,
    children: RefCell<Vec<Rc<InstanceInner>>>,
    render_watcher: RefCell<Option<Rc<dyn AnyWatcher>>>,
    /// Every watcher created while this instance was active.
    watchers: RefCell<Vec<Rc<dyn AnyWatcher>>>,
    hooks: RefCell<Vec<(Hook, Rc<dyn Fn()>)>>,
    mounted: Cell<bool>,
    /// Three-valued: None until the first suspension transition touches
    /// this instance, then Some(true) while suspended.
    inactive: Cell<Option<bool>>,
    /// True when this instance was the direct root of a deactivation.
    direct_inactive: Cell<bool>,
    destroyed: Cell<bool>,
    being_destroyed: Cell<bool>,
}

/// A component instance handle. Clones share the instance.
pub struct ComponentInstance {
    inner: Rc<InstanceInner>,
}

impl Clone for ComponentInstance {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl ComponentInstance {
    /// Creates a root instance and fires its `Created` hook.
    pub fn new(options: ComponentOptions) -> Self {
        Self::build(options, None)
    }

    /// Creates an instance linked under `parent`.
    pub fn new_child(options: ComponentOptions, parent: &ComponentInstance) -> Self {
        Self::build(options, Some(parent.inner.clone()))
    }

    fn build(options: ComponentOptions, parent: Option<Rc<InstanceInner>>) -> Self {
        let id = NEXT_INSTANCE_ID.with(|n| {
            let id = n.get();
            n.set(id + 1);
            id
        });

        let inner = Rc::new(InstanceInner {
            id,
            name: options.name,
            parent: RefCell::new(parent.as_ref().map(Rc::downgrade)),
            children: RefCell::new(Vec::new()),
            render_watcher: RefCell::new(None),
            watchers: RefCell::new(Vec::new()),
            hooks: RefCell::new(options.hooks),
            mounted: Cell::new(false),
            inactive: Cell::new(None),
            direct_inactive: Cell::new(false),
            destroyed: Cell::new(false),
            being_destroyed: Cell::new(false),
        });

        if let Some(parent) = parent {
            parent.children.borrow_mut().push(inner.clone());
        }

        call_hook(&inner, Hook::Created);
        Self { inner }
    }

    // =========================================================================
    // ACCESSORS
    // =========================================================================

    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn name(&self) -> Option<String> {
        self.inner.name.clone()
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.get()
    }

    pub fn is_destroyed(&self) -> bool {
        self.inner.destroyed.get()
    }

    /// True while suspended.
    pub fn is_inactive(&self) -> bool {
        self.inner.inactive.get() == Some(true)
    }

    pub fn child_count(&self) -> usize {
        self.inner.children.borrow().len()
    }

    // =========================================================================
    // SETUP AND WATCHING
    // =========================================================================

    /// Runs `f` with this instance active, so watchers and computeds
    /// created inside register here and die with the instance.
    pub fn setup<R>(&self, f: impl FnOnce() -> R) -> R {
        let _active = ActiveInstanceGuard::set(self.inner.clone());
        f()
    }

    /// Instance-scoped `watch`: stopped automatically at destroy.
    pub fn watch<T: PartialEq + 'static>(
        &self,
        expr: impl Fn() -> T + 'static,
        callback: impl FnMut(&T, Option<&T>) + 'static,
    ) -> WatchHandle {
        self.setup(|| crate::primitives::watch::watch(expr, callback))
    }

    /// Instance-scoped `watch_with`.
    pub fn watch_with<T: PartialEq + DeepTrack + 'static>(
        &self,
        expr: impl Fn() -> T + 'static,
        callback: impl FnMut(&T, Option<&T>) + 'static,
        options: WatchOptions,
    ) -> WatchHandle {
        self.setup(|| crate::primitives::watch::watch_with(expr, callback, options))
    }

    // =========================================================================
    // MOUNT AND UPDATE
    // =========================================================================

    /// Creates the render watcher and runs it once. The evaluator both
    /// produces and applies output; re-runs are driven by the scheduler.
    ///
    /// Fires `BeforeMount`, renders, then fires `Mounted`. Once mounted,
    /// each flush that re-renders fires `BeforeUpdate` before the render
    /// and `Updated` after it.
    pub fn mount(&self, render: impl FnMut() + 'static) {
        if self.inner.destroyed.get() || self.inner.render_watcher.borrow().is_some() {
            tracing::warn!(id = self.inner.id, "mount on a destroyed or mounted instance was ignored");
            return;
        }

        call_hook(&self.inner, Hook::BeforeMount);

        let weak = Rc::downgrade(&self.inner);
        let before: Rc<dyn Fn()> = Rc::new(move || {
            if let Some(inst) = weak.upgrade() {
                if inst.mounted.get() && !inst.destroyed.get() {
                    call_hook(&inst, Hook::BeforeUpdate);
                }
            }
        });

        let render = RefCell::new(render);
        let watcher = {
            let _active = ActiveInstanceGuard::set(self.inner.clone());
            WatcherInner::create(WatcherSpec {
                flags: RENDER,
                expr: Rc::new(move || {
                    (&mut *render.borrow_mut())();
                }),
                callback: None,
                before: Some(before),
                equals: None,
                deep_hook: None,
            })
        };
        *self.inner.render_watcher.borrow_mut() = Some(watcher as Rc<dyn AnyWatcher>);

        self.inner.mounted.set(true);
        call_hook(&self.inner, Hook::Mounted);
        tracing::debug!(id = self.inner.id, "component mounted");
    }

    /// Invalidates the render watcher directly, bypassing dependency
    /// comparison.
    pub fn force_update(&self) {
        let watcher = self.inner.render_watcher.borrow().clone();
        if let Some(watcher) = watcher {
            watcher.update();
        }
    }

    // =========================================================================
    // SUSPENSION
    // =========================================================================

    /// Resumes a suspended subtree. `direct` marks this instance as the
    /// transition root; inside a still-inactive ancestor tree only the
    /// direct flag clears.
    pub fn activate(&self, direct: bool) {
        activate_inner(&self.inner, direct);
    }

    /// Suspends this subtree. Hooks fire once per logical transition; an
    /// already-suspended child is skipped.
    pub fn deactivate(&self, direct: bool) {
        deactivate_inner(&self.inner, direct);
    }

    // =========================================================================
    // DESTROY
    // =========================================================================

    /// Tears the instance down: `BeforeDestroy`, detach from parent, tear
    /// down the render watcher and every instance-scoped watcher, then
    /// `Destroyed`. Fully idempotent; later cell writes reach nothing.
    pub fn destroy(&self) {
        let inner = &self.inner;
        if inner.being_destroyed.get() {
            return;
        }
        inner.being_destroyed.set(true);

        call_hook(inner, Hook::BeforeDestroy);

        let parent = inner.parent.borrow().clone();
        if let Some(parent) = parent.and_then(|weak| weak.upgrade()) {
            if !parent.being_destroyed.get() {
                parent.children.borrow_mut().retain(|c| c.id != inner.id);
            }
        }

        if let Some(watcher) = inner.render_watcher.borrow_mut().take() {
            watcher.teardown();
        }
        let watchers: Vec<Rc<dyn AnyWatcher>> = inner.watchers.borrow_mut().drain(..).collect();
        for watcher in watchers {
            watcher.teardown();
        }

        inner.destroyed.set(true);
        call_hook(inner, Hook::Destroyed);

        inner.children.borrow_mut().clear();
        inner.hooks.borrow_mut().clear();
        inner.parent.borrow_mut().take();
        tracing::debug!(id = inner.id, "component destroyed");
    }
}

// =============================================================================
// SUSPENSION TRANSITIONS
// =============================================================================

fn in_inactive_tree(inner: &Rc<InstanceInner>) -> bool {
    let mut current = inner.parent.borrow().clone();
    while let Some(parent) = current.and_then(|weak| weak.upgrade()) {
        if parent.inactive.get() == Some(true) {
            return true;
        }
        current = parent.parent.borrow().clone();
    }
    false
}

fn activate_inner(inner: &Rc<InstanceInner>, direct: bool) {
    if direct {
        inner.direct_inactive.set(false);
        if in_inactive_tree(inner) {
            return;
        }
    } else if inner.direct_inactive.get() {
        // A directly deactivated child stays suspended when only an
        // ancestor resumes.
        return;
    }

    if inner.inactive.get() != Some(false) {
        inner.inactive.set(Some(false));
        let children: Vec<Rc<InstanceInner>> = inner.children.borrow().clone();
        for child in &children {
            activate_inner(child, false);
        }
        call_hook(inner, Hook::Activated);
        tracing::debug!(id = inner.id, "component activated");
    }
}

fn deactivate_inner(inner: &Rc<InstanceInner>, direct: bool) {
    if direct {
        inner.direct_inactive.set(true);
        if in_inactive_tree(inner) {
            return;
        }
    }

    if inner.inactive.get() != Some(true) {
        inner.inactive.set(Some(true));
        let children: Vec<Rc<InstanceInner>> = inner.children.borrow().clone();
        for child in &children {
            deactivate_inner(child, false);
        }
        call_hook(inner, Hook::Deactivated);
        tracing::debug!(id = inner.id, "component deactivated");
    }
}

// =============================================================================
// HOOK INVOCATION
// =============================================================================

/// Runs every listener for `stage` with tracking masked. Listener panics
/// are contained and reported with the stage tag.
fn call_hook(inner: &Rc<InstanceInner>, stage: Hook) {
    let listeners: Vec<Rc<dyn Fn()>> = inner
        .hooks
        .borrow()
        .iter()
        .filter(|(hook, _)| *hook == stage)
        .map(|(_, listener)| listener.clone())
        .collect();
    if listeners.is_empty() {
        return;
    }

    let _mask = TargetGuard::push(None);
    for listener in listeners {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| listener())) {
            report_fault(Fault::LifecycleHook {
                stage: stage.name(),
                message: panic_message(&*payload),
            });
        }
    }
}

// =============================================================================
// ACTIVE-INSTANCE SLOT
// =============================================================================

/// Single-slot stack: setting the active instance returns a guard that
/// restores the previous one on drop.
struct ActiveInstanceGuard {
    prev: Option<Rc<InstanceInner>>,
}

impl ActiveInstanceGuard {
    fn set(instance: Rc<InstanceInner>) -> Self {
        let prev = ACTIVE_INSTANCE.with(|slot| slot.borrow_mut().replace(instance));
        Self { prev }
    }
}

impl Drop for ActiveInstanceGuard {
    fn drop(&mut self) {
        ACTIVE_INSTANCE.with(|slot| *slot.borrow_mut() = self.prev.take());
    }
}

/// Registers a freshly created watcher with the active instance, if any.
/// Returns the owner so the watcher can unregister at teardown.
pub(crate) fn register_with_active_instance(
    watcher: Rc<dyn AnyWatcher>,
) -> Option<Weak<InstanceInner>> {
    ACTIVE_INSTANCE.with(|slot| {
        slot.borrow().as_ref().map(|instance| {
            instance.watchers.borrow_mut().push(watcher);
            Rc::downgrade(instance)
        })
    })
}

/// Unregisters a watcher from its owner, unless the owner is already
/// mid-destruction and draining the list itself.
pub(crate) fn forget_watcher(owner: &Weak<InstanceInner>, id: u64) {
    if let Some(owner) = owner.upgrade() {
        if !owner.being_destroyed.get() {
            owner.watchers.borrow_mut().retain(|w| w.id() != id);
        }
    }
}

/// Fires `Updated` on a render watcher's owner after a flush re-ran it.
pub(crate) fn notify_owner_updated(owner: &Weak<InstanceInner>) {
    if let Some(owner) = owner.upgrade() {
        if owner.mounted.get() && !owner.destroyed.get() {
            call_hook(&owner, Hook::Updated);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::cell::wrap;
    use std::cell::RefCell as StdRefCell;

    fn recording_options(log: &Rc<StdRefCell<Vec<&'static str>>>) -> ComponentOptions {
        let mut options = ComponentOptions::new();
        for hook in [
            Hook::Created,
            Hook::BeforeMount,
            Hook::Mounted,
            Hook::BeforeUpdate,
            Hook::Updated,
            Hook::Activated,
            Hook::Deactivated,
            Hook::BeforeDestroy,
            Hook::Destroyed,
        ] {
            let log = log.clone();
            options = options.on(hook, move || log.borrow_mut().push(hook.name()));
        }
        options
    }

    #[test]
    fn mount_fires_hooks_in_order() {
        let log = Rc::new(StdRefCell::new(Vec::new()));
        let instance = ComponentInstance::new(recording_options(&log));
        instance.mount(|| {});
        assert_eq!(*log.borrow(), vec!["created", "beforeMount", "mounted"]);
    }

    #[test]
    fn flush_rerender_fires_before_update_then_updated() {
        let log = Rc::new(StdRefCell::new(Vec::new()));
        let count = wrap(0);

        let instance = ComponentInstance::new(recording_options(&log));
        let count_read = count.clone();
        let log_render = log.clone();
        instance.mount(move || {
            let _ = count_read.get();
            log_render.borrow_mut().push("render");
        });
        log.borrow_mut().clear();

        count.set(1);
        assert_eq!(*log.borrow(), vec!["beforeUpdate", "render", "updated"]);
    }

    #[test]
    fn destroy_is_idempotent_and_detaches_watchers() {
        let log = Rc::new(StdRefCell::new(Vec::new()));
        let count = wrap(0);

        let instance = ComponentInstance::new(recording_options(&log));
        let count_read = count.clone();
        instance.mount(move || {
            let _ = count_read.get();
        });
        assert_eq!(count.subject().watcher_count(), 1);
        log.borrow_mut().clear();

        instance.destroy();
        instance.destroy();

        assert_eq!(*log.borrow(), vec!["beforeDestroy", "destroyed"]);
        assert!(instance.is_destroyed());
        assert_eq!(count.subject().watcher_count(), 0);

        // Late writes reach nothing and do not panic.
        count.set(5);
    }

    #[test]
    fn hooks_do_not_subscribe_to_reads() {
        let count = wrap(0);
        let count_read = count.clone();
        let options = ComponentOptions::new().on(Hook::Mounted, move || {
            let _ = count_read.get();
        });
        let instance = ComponentInstance::new(options);
        instance.mount(|| {});

        assert_eq!(count.subject().watcher_count(), 0);
        instance.destroy();
    }

    #[test]
    fn force_update_rerenders_without_a_write() {
        let renders = Rc::new(Cell::new(0));
        let renders_clone = renders.clone();
        let instance = ComponentInstance::new(ComponentOptions::new());
        instance.mount(move || renders_clone.set(renders_clone.get() + 1));
        assert_eq!(renders.get(), 1);

        instance.force_update();
        assert_eq!(renders.get(), 2);
        instance.destroy();
    }

    #[test]
    fn suspension_hooks_fire_once_per_transition() {
        let log = Rc::new(StdRefCell::new(Vec::new()));
        let parent = ComponentInstance::new(recording_options(&log));
        let child_log = log.clone();
        let _child = ComponentInstance::new_child(
            ComponentOptions::new()
                .on(Hook::Deactivated, {
                    let log = child_log.clone();
                    move || log.borrow_mut().push("child deactivated")
                })
                .on(Hook::Activated, {
                    let log = child_log.clone();
                    move || log.borrow_mut().push("child activated")
                }),
            &parent,
        );
        log.borrow_mut().clear();

        parent.deactivate(true);
        // Children first, then the root.
        assert_eq!(*log.borrow(), vec!["child deactivated", "deactivated"]);

        // Deactivating again is a no-op.
        parent.deactivate(true);
        assert_eq!(log.borrow().len(), 2);
        log.borrow_mut().clear();

        parent.activate(true);
        assert_eq!(*log.borrow(), vec!["child activated", "activated"]);
    }

    #[test]
    fn directly_deactivated_child_ignores_ancestor_activation() {
        let parent = ComponentInstance::new(ComponentOptions::new());
        let child_activations = Rc::new(Cell::new(0));
        let child_activations_clone = child_activations.clone();
        let child = ComponentInstance::new_child(
            ComponentOptions::new().on(Hook::Activated, move || {
                child_activations_clone.set(child_activations_clone.get() + 1)
            }),
            &parent,
        );

        child.deactivate(true);
        parent.deactivate(true);
        parent.activate(true);

        // The child was suspended on its own; the ancestor's resume must
        // not wake it.
        assert_eq!(child_activations.get(), 0);
        assert!(child.is_inactive());

        child.activate(true);
        assert_eq!(child_activations.get(), 1);
    }

    #[test]
    fn setup_scopes_watchers_to_the_instance() {
        let count = wrap(0);
        let instance = ComponentInstance::new(ComponentOptions::new());

        let count_read = count.clone();
        let handle = instance.setup(|| {
            crate::primitives::watch::watch(move || count_read.get(), |_, _| {})
        });
        assert_eq!(count.subject().watcher_count(), 1);

        instance.destroy();
        assert_eq!(count.subject().watcher_count(), 0);
        // Stopping the handle afterwards is a harmless no-op.
        handle.stop();
    }
}
