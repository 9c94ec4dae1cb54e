#![forbid(unsafe_code)]

//! Per-view binding runtime.
//!
//! # Design
//!
//! A [`BindingWorker`] owns one instance of a [`CompiledLayout`] and keeps
//! it in sync with a graph of view models:
//!
//! ```text
//! unbound ──set_view_model──▶ bound ──start_listening──▶ listening
//!    ▲                          │  ◀──stop_listening───     │
//!    └──set_view_model(None)────┘                           │
//!                                      on_property_changed ─┘
//! ```
//!
//! While listening, the worker is subscribed (under its [`OwnerId`]) to
//! every view model referenced by the layout. When a property that leads to
//! a nested view model changes, the nested entry is re-read; if the
//! reference changed, the old one is unsubscribed, the new one subscribed,
//! and every property below it is replayed so leaf handlers see the new
//! state.
//!
//! A view model referenced by several entries is subscribed once. It is
//! released when no entry references it anymore.
//!
//! # Re-entrancy
//!
//! The worker is shared as `Rc<BindingWorker>` and every operation takes
//! `&self`. State lives behind `RefCell`s that are only borrowed for short,
//! callback-free sections: handlers, subscriptions and unsubscriptions all
//! run with nothing borrowed. A handler may therefore write to a view model
//! its own worker listens to. The resulting notification is processed
//! synchronously, nested inside the write, and completes before the write
//! returns. A [`ChangeTracker`] lets such handlers recognize their own
//! writes and avoid feedback loops.
//!
//! After every nested step the worker re-checks that it is still listening
//! and that the entry it is walking still holds the same view model, so a
//! handler that stops the worker or swaps a link ends the outer walk
//! cleanly.
//!
//! # Ordering
//!
//! Handlers run in layout order when listening starts. A cascade runs
//! parent before children, and a property's own handler runs after the
//! cascade below it.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Path not in layout | Binding a path the template was not built from | Panic in [`add_binding_handler`](BindingWorker::add_binding_handler) |
//! | Foreign notification | Change from a view model the worker does not track | Panic |
//! | Unbounded write-back | Handlers that keep changing each other's inputs | Stack overflow; guard with a [`ChangeTracker`] |

use std::cell::{Ref, RefCell};
use std::fmt;
use std::ops::Range;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;
use tracing::{debug, trace};
use vmbind_core::{OwnerId, PropertyAccessor, PropertyId, ViewModelRef};

use super::error::BindingError;
use super::handler::PropertyChangeHandler;
use super::layout::{CompiledLayout, ObservableEntry, PropertyEntry};
use super::sink::BindingSink;
use crate::view::{ChangeScope, ChangeTracker};

type ForwardFn = Rc<dyn Fn(PropertyId, &ViewModelRef)>;

fn same_view_model(a: Option<&ViewModelRef>, b: Option<&ViewModelRef>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Subscription identity of a worker plus the route that delivers change
/// notifications back to it.
#[derive(Clone)]
pub struct WorkerOwner {
    id: OwnerId,
    forward: ForwardFn,
}

impl WorkerOwner {
    /// Owner that calls `forward(property, source)` for every change.
    pub fn new(id: OwnerId, forward: impl Fn(PropertyId, &ViewModelRef) + 'static) -> Self {
        Self {
            id,
            forward: Rc::new(forward),
        }
    }

    /// Owner with a fresh id that forwards into a shared worker.
    ///
    /// The worker is held weakly; notifications after it is gone are ignored.
    #[must_use]
    pub fn forward_to(worker: &Rc<BindingWorker>) -> Self {
        let weak: Weak<BindingWorker> = Rc::downgrade(worker);
        Self::new(OwnerId::next(), move |property, source| {
            if let Some(worker) = weak.upgrade() {
                worker.on_property_changed(property, source);
            }
        })
    }

    #[must_use]
    pub fn id(&self) -> OwnerId {
        self.id
    }
}

impl fmt::Debug for WorkerOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerOwner").field("id", &self.id).finish()
    }
}

/// Snapshot of one property entry, taken so the layout is not borrowed
/// while its handler runs.
struct Slot {
    property: PropertyId,
    next: Option<usize>,
    handler: Option<Rc<dyn PropertyChangeHandler>>,
}

/// One compiled layout instance bound to one root view model.
pub struct BindingWorker {
    accessor: Rc<dyn PropertyAccessor>,
    owner: RefCell<Option<WorkerOwner>>,
    layout: RefCell<CompiledLayout>,
    tracker: RefCell<Option<ChangeTracker>>,
}

impl BindingWorker {
    /// Create an unbound worker that reads nested references through
    /// `accessor`.
    #[must_use]
    pub fn new(accessor: Rc<dyn PropertyAccessor>) -> Self {
        Self {
            accessor,
            owner: RefCell::new(None),
            layout: RefCell::new(CompiledLayout::default()),
            tracker: RefCell::new(None),
        }
    }

    /// Run change handlers inside scopes of `tracker`.
    #[must_use]
    pub fn with_change_tracker(self, tracker: ChangeTracker) -> Self {
        *self.tracker.borrow_mut() = Some(tracker);
        self
    }

    pub fn set_change_tracker(&self, tracker: Option<ChangeTracker>) {
        *self.tracker.borrow_mut() = tracker;
    }

    #[must_use]
    pub fn change_tracker(&self) -> Option<ChangeTracker> {
        self.tracker.borrow().clone()
    }

    /// Copy `template` into this worker and adopt `owner` as subscription
    /// identity. Every view model slot starts empty, the root included.
    ///
    /// A worker that was listening stops first. Previously attached handlers
    /// are dropped.
    ///
    /// # Panics
    ///
    /// Panics if `template` has handlers attached.
    pub fn init(&self, owner: WorkerOwner, template: &CompiledLayout) {
        self.stop_listening();
        let instance = template.instantiate();
        debug!(
            owner = %owner.id,
            observables = instance.observables().len(),
            properties = instance.properties().len(),
            "binding worker initialized"
        );
        // Old handlers are dropped outside the borrow.
        let previous = self.layout.replace(instance);
        *self.owner.borrow_mut() = Some(owner);
        drop(previous);
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.owner.borrow().is_some()
    }

    #[must_use]
    pub fn owner_id(&self) -> Option<OwnerId> {
        self.owner.borrow().as_ref().map(WorkerOwner::id)
    }

    /// Borrow the layout instance.
    ///
    /// Release the guard before changing any view model this worker
    /// listens to.
    #[must_use]
    pub fn layout(&self) -> Ref<'_, CompiledLayout> {
        self.layout.borrow()
    }

    /// Attach `handler` to the first free slot matching `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::NotInLayout`] if no such slot exists.
    pub fn try_add_binding_handler(
        &self,
        path: &[PropertyId],
        handler: Box<dyn PropertyChangeHandler>,
    ) -> Result<(), BindingError> {
        let slot = self.resolve_slot(path, |entry, property| entry.property() == *property)?;
        self.layout.borrow_mut().property_mut(slot).emplace_boxed_handler(handler);
        Ok(())
    }

    /// Attach `handler` to the first free slot matching the named `path`.
    ///
    /// # Errors
    ///
    /// Returns [`BindingError::NotInLayout`] if no such slot exists.
    pub fn try_add_binding_handler_by_name(
        &self,
        path: &[&str],
        handler: Box<dyn PropertyChangeHandler>,
    ) -> Result<(), BindingError> {
        let accessor = &self.accessor;
        let slot = self.resolve_slot(path, |entry, name| {
            accessor.property_name(entry.property()) == Some(*name)
        })?;
        self.layout.borrow_mut().property_mut(slot).emplace_boxed_handler(handler);
        Ok(())
    }

    /// Attach `handler` to the slot `path` resolves to.
    ///
    /// Intermediate steps follow properties that lead to a nested entry; the
    /// final step takes the first matching slot without a handler.
    ///
    /// # Panics
    ///
    /// Panics if the layout has no free slot for `path`.
    pub fn add_binding_handler(&self, path: &[PropertyId], handler: Box<dyn PropertyChangeHandler>) {
        if let Err(err) = self.try_add_binding_handler(path, handler) {
            panic!("cannot bind handler: {err}");
        }
    }

    /// Name-based variant of [`add_binding_handler`](Self::add_binding_handler).
    ///
    /// # Panics
    ///
    /// Panics if the layout has no free slot for `path`.
    pub fn add_binding_handler_by_name(&self, path: &[&str], handler: Box<dyn PropertyChangeHandler>) {
        if let Err(err) = self.try_add_binding_handler_by_name(path, handler) {
            panic!("cannot bind handler: {err}");
        }
    }

    /// The root view model, if one is set.
    #[must_use]
    pub fn view_model(&self) -> Option<ViewModelRef> {
        self.view_model_at(0)
    }

    /// Replace the root view model. Does nothing on an empty layout.
    ///
    /// A listening worker is restarted on the new root: everything reached
    /// from the old root is released, and handlers receive the values
    /// reached from the new one. Replacing the root with `None` leaves the
    /// worker stopped.
    pub fn set_view_model(&self, view_model: Option<ViewModelRef>) {
        let restart = self.is_listening();
        if restart {
            self.stop_listening();
        }
        let previous = {
            let mut layout = self.layout.borrow_mut();
            if layout.is_empty() {
                return;
            }
            std::mem::replace(&mut layout.observable_mut(0).view_model, view_model)
        };
        drop(previous);
        if restart {
            self.start_listening();
        }
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.layout.borrow().has_subscription()
    }

    /// Subscribe to every reachable view model and deliver current values to
    /// every handler once.
    ///
    /// No-op without a root view model or when already listening.
    pub fn start_listening(&self) {
        let count = {
            let mut layout = self.layout.borrow_mut();
            let has_root = layout.root().and_then(ObservableEntry::view_model).is_some();
            if layout.has_subscription() || !has_root {
                return;
            }
            layout.set_has_subscription(true);
            layout.observables().len()
        };
        debug!(owner = ?self.owner_id(), "binding worker start listening");

        // Nested entries always come after the entry that leads to them, so
        // one pass in layout order fills them before they are visited.
        for index in 0..count {
            if !self.is_listening() {
                return;
            }
            let Some(view_model) = self.view_model_at(index) else {
                // No view model here: the whole subtree stays silent,
                // including handlers of "no value" properties.
                continue;
            };
            self.subscribe(&view_model);

            for slot in self.property_range(index) {
                // A handler may have stopped the worker or swapped this entry.
                if !self.is_listening() || !self.entry_holds(index, &view_model) {
                    break;
                }
                let Some(entry) = self.slot(slot) else {
                    break;
                };
                if let Some(next) = entry.next {
                    let nested = self.read_nested(Some(&view_model), entry.property);
                    self.set_view_model_at(next, nested);
                }
                if let Some(handler) = entry.handler {
                    handler.invoke(Some(&view_model), entry.property);
                }
            }
        }
    }

    /// Unsubscribe from everything and forget nested view models. The root
    /// is kept so a later [`start_listening`](Self::start_listening)
    /// resumes with it.
    ///
    /// No-op when not listening.
    pub fn stop_listening(&self) {
        let held: SmallVec<[ViewModelRef; 4]> = {
            let mut layout = self.layout.borrow_mut();
            if !layout.has_subscription() {
                return;
            }
            layout.set_has_subscription(false);
            layout
                .observables_mut()
                .iter_mut()
                .enumerate()
                .filter_map(|(index, entry)| {
                    if index == 0 {
                        entry.view_model.clone()
                    } else {
                        entry.view_model.take()
                    }
                })
                .collect()
        };
        let owner = self.owner_id();
        debug!(owner = ?owner, "binding worker stop listening");

        if let Some(owner) = owner {
            for view_model in &held {
                view_model.unsubscribe_owner(owner);
            }
        }
    }

    /// Handle a change of `property` on `source`.
    ///
    /// Every entry that holds `source` is processed, and within each entry
    /// every slot bound to `property`. May be called re-entrantly from a
    /// handler of this worker.
    ///
    /// # Panics
    ///
    /// Panics if no entry holds `source`.
    pub fn on_property_changed(&self, property: PropertyId, source: &ViewModelRef) {
        let entries: SmallVec<[usize; 4]> = self
            .layout
            .borrow()
            .observables()
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.holds(source))
            .map(|(index, _)| index)
            .collect();
        assert!(
            !entries.is_empty(),
            "change notification from a view model this worker does not track"
        );
        trace!(owner = ?self.owner_id(), %property, entries = entries.len(), "property changed");

        for index in entries {
            for slot in self.property_range(index) {
                // A cascade or a handler may have replaced this entry.
                if !self.entry_holds(index, source) {
                    break;
                }
                let matches = self
                    .layout
                    .borrow()
                    .properties()
                    .get(slot)
                    .is_some_and(|entry| entry.property() == property);
                if matches {
                    self.process_property_change(Some(source), slot);
                }
            }
        }
    }

    fn process_property_change(&self, source: Option<&ViewModelRef>, slot: usize) {
        if !self.is_listening() {
            return;
        }
        let Some(entry) = self.slot(slot) else {
            return;
        };

        if let Some(next) = entry.next {
            let current = self.read_nested(source, entry.property);
            let cached = self.view_model_at(next);
            if !same_view_model(current.as_ref(), cached.as_ref()) {
                self.set_view_model_at(next, current.clone());
                if let Some(old) = &cached {
                    self.release(old);
                }
                if let Some(new) = &current {
                    self.subscribe(new);
                }
                trace!(
                    owner = ?self.owner_id(),
                    property = %entry.property,
                    entry = next,
                    present = current.is_some(),
                    "nested view model replaced"
                );
                self.propagate_changes(next);
            }
        }

        if let Some(handler) = entry.handler {
            if !self.is_listening() {
                return;
            }
            let _scope = self.change_scope(source, entry.property);
            handler.invoke(source, entry.property);
        }
    }

    /// Replay every property of entry `observable`, recursing into the
    /// nested entries below it.
    fn propagate_changes(&self, observable: usize) {
        let view_model = self.view_model_at(observable);
        for slot in self.property_range(observable) {
            // Stop replaying a subtree that a handler has since replaced.
            if !same_view_model(self.view_model_at(observable).as_ref(), view_model.as_ref()) {
                break;
            }
            self.process_property_change(view_model.as_ref(), slot);
        }
    }

    fn view_model_at(&self, observable: usize) -> Option<ViewModelRef> {
        self.layout
            .borrow()
            .observables()
            .get(observable)
            .and_then(|entry| entry.view_model().cloned())
    }

    /// Store `view_model` at entry `observable`. The value it replaces is
    /// dropped after the borrow ends.
    fn set_view_model_at(&self, observable: usize, view_model: Option<ViewModelRef>) {
        let previous = {
            let mut layout = self.layout.borrow_mut();
            if observable >= layout.observables().len() {
                return;
            }
            std::mem::replace(&mut layout.observable_mut(observable).view_model, view_model)
        };
        drop(previous);
    }

    fn entry_holds(&self, observable: usize, view_model: &ViewModelRef) -> bool {
        self.layout
            .borrow()
            .observables()
            .get(observable)
            .is_some_and(|entry| entry.holds(view_model))
    }

    fn property_range(&self, observable: usize) -> Range<usize> {
        self.layout
            .borrow()
            .observables()
            .get(observable)
            .map_or(0..0, ObservableEntry::property_range)
    }

    fn slot(&self, slot: usize) -> Option<Slot> {
        self.layout.borrow().properties().get(slot).map(|entry| Slot {
            property: entry.property(),
            next: entry.next_observable(),
            handler: entry.shared_handler(),
        })
    }

    fn read_nested(&self, view_model: Option<&ViewModelRef>, property: PropertyId) -> Option<ViewModelRef> {
        view_model.and_then(|view_model| {
            self.accessor
                .read_nested(view_model, property)
                .into_view_model()
        })
    }

    fn subscribe(&self, view_model: &ViewModelRef) {
        let Some(owner) = self.owner.borrow().clone() else {
            return;
        };
        if view_model.is_subscribed(owner.id) {
            return;
        }
        let forward = Rc::clone(&owner.forward);
        let source = Rc::downgrade(view_model);
        view_model.subscribe_owned(owner.id, move |property| {
            if let Some(source) = source.upgrade() {
                forward(property, &source);
            }
        });
        trace!(owner = %owner.id, class = %view_model.class(), "subscribed");
    }

    /// Unsubscribe from `view_model` unless another entry still holds it.
    fn release(&self, view_model: &ViewModelRef) {
        let Some(owner) = self.owner_id() else {
            return;
        };
        let still_held = self
            .layout
            .borrow()
            .observables()
            .iter()
            .any(|entry| entry.holds(view_model));
        if still_held {
            return;
        }
        view_model.unsubscribe_owner(owner);
        trace!(owner = %owner, class = %view_model.class(), "unsubscribed");
    }

    fn change_scope(&self, view_model: Option<&ViewModelRef>, property: PropertyId) -> Option<ChangeScope> {
        let tracker = self.change_tracker()?;
        let owner = self.owner_id()?;
        Some(tracker.change_scope(owner, view_model, property))
    }

    fn resolve_slot<K>(
        &self,
        path: &[K],
        matches: impl Fn(&PropertyEntry, &K) -> bool,
    ) -> Result<usize, BindingError> {
        let Some((last, steps)) = path.split_last() else {
            return Err(BindingError::EmptyPath);
        };

        let layout = self.layout.borrow();
        let mut observable = 0;
        for (step, key) in steps.iter().enumerate() {
            observable = find_slot(&layout, observable, |entry| {
                entry.next_observable().is_some() && matches(entry, key)
            })
            .and_then(|slot| layout.properties()[slot].next_observable())
            .ok_or(BindingError::NotInLayout { step })?;
        }
        find_slot(&layout, observable, |entry| !entry.has_handler() && matches(entry, last))
            .ok_or(BindingError::NotInLayout { step: steps.len() })
    }
}

fn find_slot(
    layout: &CompiledLayout,
    observable: usize,
    predicate: impl Fn(&PropertyEntry) -> bool,
) -> Option<usize> {
    let range = layout.observables().get(observable)?.property_range();
    let start = range.start;
    layout.properties()[range]
        .iter()
        .position(predicate)
        .map(|offset| start + offset)
}

impl Drop for BindingWorker {
    fn drop(&mut self) {
        self.stop_listening();
    }
}

impl fmt::Debug for BindingWorker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BindingWorker")
            .field("owner", &self.owner_id())
            .field("listening", &self.is_listening())
            .field("layout", &*self.layout.borrow())
            .finish_non_exhaustive()
    }
}

/// Binds handlers declared by a view. Paths the template dropped are
/// skipped.
impl BindingSink for &BindingWorker {
    fn bind(&mut self, path: &[PropertyId], handler: Box<dyn PropertyChangeHandler>) {
        if let Err(err) = self.try_add_binding_handler(path, handler) {
            debug!(owner = ?self.owner_id(), error = %err, "binding skipped");
        }
    }

    fn bind_by_name(&mut self, path: &[&str], handler: Box<dyn PropertyChangeHandler>) {
        if let Err(err) = self.try_add_binding_handler_by_name(path, handler) {
            debug!(owner = ?self.owner_id(), error = %err, "binding skipped");
        }
    }
}
