#![forbid(unsafe_code)]

//! Tracks which views are being initialized or updated right now.
//!
//! Handlers sometimes need to know why they run: a value delivered while a
//! view starts listening is not a user-visible change, so an animation
//! should not play. [`ChangeTracker`] keeps two stacks that the runtime
//! pushes onto around handler invocation:
//!
//! - an initialization entry `(view, view model)` while a view starts
//!   listening;
//! - a change entry `(view, view model, property)` while a change handler
//!   runs.
//!
//! Scopes are RAII guards, so entries are popped even if a handler panics
//! and the panic is caught further up.
//!
//! Views are identified by the [`OwnerId`] of their binding worker.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use vmbind_core::{OwnerId, PropertyId, ViewModelRef};

struct InitEntry {
    view: OwnerId,
    view_model: Option<ViewModelRef>,
}

struct ChangeEntry {
    view: OwnerId,
    view_model: Option<ViewModelRef>,
    property: PropertyId,
}

#[derive(Default)]
struct TrackerState {
    initializations: Vec<InitEntry>,
    changes: Vec<ChangeEntry>,
}

fn same(held: Option<&ViewModelRef>, view_model: &ViewModelRef) -> bool {
    held.is_some_and(|held| Rc::ptr_eq(held, view_model))
}

/// Shared handle to the initialization and change stacks.
///
/// Cloning yields another handle to the same stacks.
#[derive(Clone, Default)]
pub struct ChangeTracker {
    state: Rc<RefCell<TrackerState>>,
}

impl ChangeTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `view` as initializing with `view_model` until the guard drops.
    #[must_use = "the scope ends when the guard is dropped"]
    pub fn initialization_scope(
        &self,
        view: OwnerId,
        view_model: Option<&ViewModelRef>,
    ) -> InitializationScope {
        self.state.borrow_mut().initializations.push(InitEntry {
            view,
            view_model: view_model.cloned(),
        });
        InitializationScope {
            tracker: self.clone(),
        }
    }

    /// Mark a change of `property` on `view_model`, delivered to `view`,
    /// until the guard drops.
    #[must_use = "the scope ends when the guard is dropped"]
    pub fn change_scope(
        &self,
        view: OwnerId,
        view_model: Option<&ViewModelRef>,
        property: PropertyId,
    ) -> ChangeScope {
        self.state.borrow_mut().changes.push(ChangeEntry {
            view,
            view_model: view_model.cloned(),
            property,
        });
        ChangeScope {
            tracker: self.clone(),
        }
    }

    #[must_use]
    pub fn is_initializing_view(&self, view: OwnerId) -> bool {
        self.state
            .borrow()
            .initializations
            .iter()
            .any(|e| e.view == view)
    }

    #[must_use]
    pub fn is_initializing_view_model(&self, view_model: &ViewModelRef) -> bool {
        self.state
            .borrow()
            .initializations
            .iter()
            .any(|e| same(e.view_model.as_ref(), view_model))
    }

    #[must_use]
    pub fn is_changing_view(&self, view: OwnerId) -> bool {
        self.state.borrow().changes.iter().any(|e| e.view == view)
    }

    #[must_use]
    pub fn is_changing_view_model(&self, view_model: &ViewModelRef) -> bool {
        self.state
            .borrow()
            .changes
            .iter()
            .any(|e| same(e.view_model.as_ref(), view_model))
    }

    #[must_use]
    pub fn is_changing_property(&self, property: PropertyId) -> bool {
        self.state
            .borrow()
            .changes
            .iter()
            .any(|e| e.property == property)
    }

    /// Number of open initialization scopes.
    #[must_use]
    pub fn initialization_depth(&self) -> usize {
        self.state.borrow().initializations.len()
    }

    /// Number of open change scopes.
    #[must_use]
    pub fn change_depth(&self) -> usize {
        self.state.borrow().changes.len()
    }
}

impl fmt::Debug for ChangeTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeTracker")
            .field("initialization_depth", &self.initialization_depth())
            .field("change_depth", &self.change_depth())
            .finish()
    }
}

/// Guard returned by [`ChangeTracker::initialization_scope`].
#[derive(Debug)]
pub struct InitializationScope {
    tracker: ChangeTracker,
}

impl Drop for InitializationScope {
    fn drop(&mut self) {
        let popped = self.tracker.state.borrow_mut().initializations.pop();
        debug_assert!(popped.is_some(), "initialization scope stack underflow");
    }
}

/// Guard returned by [`ChangeTracker::change_scope`].
#[derive(Debug)]
pub struct ChangeScope {
    tracker: ChangeTracker,
}

impl Drop for ChangeScope {
    fn drop(&mut self) {
        let popped = self.tracker.state.borrow_mut().changes.pop();
        debug_assert!(popped.is_some(), "change scope stack underflow");
    }
}
