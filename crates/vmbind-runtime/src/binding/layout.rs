#![forbid(unsafe_code)]

//! Flattened binding tree: observable entries and property entries.
//!
//! # Design
//!
//! A [`CompiledLayout`] is the breadth-first flattening of a binding tree.
//! Every tree node that has children becomes an [`ObservableEntry`]; every
//! edge out of such a node becomes a [`PropertyEntry`]. Entries refer to each
//! other by `u8` index, never by pointer, so a layout can be copied freely.
//!
//! ```text
//! observables: [ root ][ Root.Child ][ Child.Inner ]
//!                 │          │             │
//! properties:  [Child][Title][Inner][Value][Value]
//!                 └─next──┘     └─next─┘
//! ```
//!
//! The same type serves two roles:
//!
//! - **Template**: produced by the builder, holds the class of every entry,
//!   never has handlers. Shared read-only by all views of one type.
//! - **Instance**: a copy owned by one worker, holding live view models and
//!   the handlers bound by that view.
//!
//! # Invariants
//!
//! 1. Observable entry 0 is the root.
//! 2. Property entries of one observable are contiguous, in tree order.
//! 3. A layout with attached handlers is never copied.
//! 4. Every handler is dropped exactly once, with its entry or after its
//!    last running invocation.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | More than 255 entries | Unreasonably large binding set | Panic in [`CompiledLayout::new`] |
//! | Clone with handlers | Copying an instance instead of a template | Panic |
//! | Second handler on one slot | Same leaf bound twice to one entry | Panic |

use std::fmt;
use std::ops::Range;
use std::rc::Rc;

use vmbind_core::{ClassId, PropertyId, ViewModelRef};

use super::handler::PropertyChangeHandler;

/// Largest number of observable or property entries a layout can hold.
pub const MAX_LAYOUT_ENTRIES: usize = u8::MAX as usize;

fn narrow(value: usize) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}

/// Sizes and the listening flag of one layout.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayoutHeader {
    num_observables: u8,
    num_properties: u8,
    has_subscription: bool,
}

impl LayoutHeader {
    #[must_use]
    pub fn num_observables(&self) -> usize {
        usize::from(self.num_observables)
    }

    #[must_use]
    pub fn num_properties(&self) -> usize {
        usize::from(self.num_properties)
    }

    /// Whether the owning worker is currently listening.
    #[must_use]
    pub fn has_subscription(&self) -> bool {
        self.has_subscription
    }
}

/// One node of the binding tree that leads to further properties.
#[derive(Debug, Clone, Default)]
pub struct ObservableEntry {
    pub(crate) class: Option<ClassId>,
    pub(crate) view_model: Option<ViewModelRef>,
    first_property: u8,
    num_properties: u8,
}

impl ObservableEntry {
    /// Declared class of the view model expected at this entry.
    #[must_use]
    pub fn class(&self) -> Option<ClassId> {
        self.class
    }

    /// Live view model, on an instance layout.
    #[must_use]
    pub fn view_model(&self) -> Option<&ViewModelRef> {
        self.view_model.as_ref()
    }

    #[must_use]
    pub fn first_property(&self) -> usize {
        usize::from(self.first_property)
    }

    #[must_use]
    pub fn num_properties(&self) -> usize {
        usize::from(self.num_properties)
    }

    /// Indices of this entry's properties in [`CompiledLayout::properties`].
    #[must_use]
    pub fn property_range(&self) -> Range<usize> {
        let start = self.first_property();
        start..start + self.num_properties()
    }

    pub(crate) fn holds(&self, view_model: &ViewModelRef) -> bool {
        self.view_model
            .as_ref()
            .is_some_and(|held| Rc::ptr_eq(held, view_model))
    }
}

/// One edge out of an [`ObservableEntry`].
pub struct PropertyEntry {
    property: PropertyId,
    next_observable: Option<u8>,
    handler: Option<Rc<dyn PropertyChangeHandler>>,
}

impl PropertyEntry {
    fn new(property: PropertyId) -> Self {
        Self {
            property,
            next_observable: None,
            handler: None,
        }
    }

    #[must_use]
    pub fn property(&self) -> PropertyId {
        self.property
    }

    /// Observable entry reached by following this property, if it leads
    /// anywhere.
    #[must_use]
    pub fn next_observable(&self) -> Option<usize> {
        self.next_observable.map(usize::from)
    }

    #[must_use]
    pub fn has_handler(&self) -> bool {
        self.handler.is_some()
    }

    #[must_use]
    pub fn handler(&self) -> Option<&dyn PropertyChangeHandler> {
        self.handler.as_deref()
    }

    /// Shared handle to the handler, so it can run without the layout
    /// borrowed.
    pub(crate) fn shared_handler(&self) -> Option<Rc<dyn PropertyChangeHandler>> {
        self.handler.clone()
    }

    /// Attach a handler to this slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot already holds a handler.
    pub fn emplace_handler<H>(&mut self, handler: H)
    where
        H: PropertyChangeHandler + 'static,
    {
        self.emplace_boxed_handler(Box::new(handler));
    }

    /// Attach an already boxed handler to this slot.
    ///
    /// # Panics
    ///
    /// Panics if the slot already holds a handler.
    pub fn emplace_boxed_handler(&mut self, handler: Box<dyn PropertyChangeHandler>) {
        assert!(
            self.handler.is_none(),
            "a handler is already bound to {}",
            self.property
        );
        self.handler = Some(Rc::from(handler));
    }

    fn copy_unbound(&self) -> Self {
        Self {
            property: self.property,
            next_observable: self.next_observable,
            handler: None,
        }
    }
}

impl fmt::Debug for PropertyEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyEntry")
            .field("property", &self.property)
            .field("next_observable", &self.next_observable)
            .field("has_handler", &self.has_handler())
            .finish()
    }
}

/// Compiled, index-linked binding layout.
///
/// `Default` is the empty layout. Moving out with [`std::mem::take`] leaves
/// an empty layout behind.
#[derive(Debug, Default)]
pub struct CompiledLayout {
    header: LayoutHeader,
    observables: Vec<ObservableEntry>,
    properties: Vec<PropertyEntry>,
}

impl CompiledLayout {
    /// Reserve a layout for the given number of entries. Entries are then
    /// appended in breadth-first order.
    ///
    /// # Panics
    ///
    /// Panics if either count exceeds [`MAX_LAYOUT_ENTRIES`].
    #[must_use]
    pub fn new(num_observables: usize, num_properties: usize) -> Self {
        assert!(
            num_observables <= MAX_LAYOUT_ENTRIES && num_properties <= MAX_LAYOUT_ENTRIES,
            "binding layout too large: {num_observables} observables, {num_properties} properties (max {MAX_LAYOUT_ENTRIES})"
        );
        Self {
            header: LayoutHeader {
                num_observables: narrow(num_observables),
                num_properties: narrow(num_properties),
                has_subscription: false,
            },
            observables: Vec::with_capacity(num_observables),
            properties: Vec::with_capacity(num_properties),
        }
    }

    #[must_use]
    pub fn header(&self) -> LayoutHeader {
        self.header
    }

    /// Whether the layout binds nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observables.is_empty()
    }

    #[must_use]
    pub fn observables(&self) -> &[ObservableEntry] {
        &self.observables
    }

    #[must_use]
    pub fn properties(&self) -> &[PropertyEntry] {
        &self.properties
    }

    /// Properties of the observable entry at `observable`. Empty when the
    /// index is out of range.
    #[must_use]
    pub fn properties_of(&self, observable: usize) -> &[PropertyEntry] {
        self.observables
            .get(observable)
            .and_then(|entry| self.properties.get(entry.property_range()))
            .unwrap_or_default()
    }

    /// Mutable access to the properties of one observable entry, for
    /// attaching handlers.
    pub fn properties_of_mut(&mut self, observable: usize) -> &mut [PropertyEntry] {
        match self.observables.get(observable) {
            Some(entry) => {
                let range = entry.property_range();
                self.properties.get_mut(range).unwrap_or_default()
            }
            None => &mut [],
        }
    }

    #[must_use]
    pub fn root(&self) -> Option<&ObservableEntry> {
        self.observables.first()
    }

    #[must_use]
    pub fn has_subscription(&self) -> bool {
        self.header.has_subscription
    }

    pub(crate) fn set_has_subscription(&mut self, value: bool) {
        self.header.has_subscription = value;
    }

    #[must_use]
    pub fn has_handlers(&self) -> bool {
        self.properties.iter().any(PropertyEntry::has_handler)
    }

    #[must_use]
    pub fn handler_count(&self) -> usize {
        self.properties.iter().filter(|p| p.has_handler()).count()
    }

    /// Copy this template into a fresh instance: no view models, not
    /// listening.
    ///
    /// # Panics
    ///
    /// Panics if this layout has handlers attached.
    #[must_use]
    pub fn instantiate(&self) -> Self {
        let mut instance = self.clone();
        instance.clear_view_models();
        instance.header.has_subscription = false;
        instance
    }

    pub(crate) fn observable_mut(&mut self, index: usize) -> &mut ObservableEntry {
        &mut self.observables[index]
    }

    pub(crate) fn property_mut(&mut self, index: usize) -> &mut PropertyEntry {
        &mut self.properties[index]
    }

    pub(crate) fn observables_mut(&mut self) -> &mut [ObservableEntry] {
        &mut self.observables
    }

    /// Append an observable entry whose properties start at the current end
    /// of the property array. Returns its index.
    pub(crate) fn push_observable(&mut self, class: Option<ClassId>, num_properties: usize) -> usize {
        assert!(
            self.observables.len() < self.header.num_observables(),
            "binding layout observable capacity exceeded"
        );
        let index = self.observables.len();
        self.observables.push(ObservableEntry {
            class,
            view_model: None,
            first_property: narrow(self.properties.len()),
            num_properties: narrow(num_properties),
        });
        index
    }

    /// Append a property entry. Returns its index.
    pub(crate) fn push_property(&mut self, property: PropertyId) -> usize {
        assert!(
            self.properties.len() < self.header.num_properties(),
            "binding layout property capacity exceeded"
        );
        let index = self.properties.len();
        self.properties.push(PropertyEntry::new(property));
        index
    }

    /// Point property entry `property` at observable entry `observable`.
    pub(crate) fn link(&mut self, property: usize, observable: usize) {
        self.properties[property].next_observable = Some(narrow(observable));
    }

    /// Whether every reserved entry has been written.
    pub(crate) fn is_complete(&self) -> bool {
        self.observables.len() == self.header.num_observables()
            && self.properties.len() == self.header.num_properties()
    }

    fn clear_view_models(&mut self) {
        for entry in &mut self.observables {
            entry.view_model = None;
        }
    }
}

impl Clone for CompiledLayout {
    /// # Panics
    ///
    /// Panics if any handler is attached.
    fn clone(&self) -> Self {
        assert!(
            !self.has_handlers(),
            "cannot copy a binding layout with attached handlers"
        );
        Self {
            header: self.header,
            observables: self.observables.clone(),
            properties: self
                .properties
                .iter()
                .map(PropertyEntry::copy_unbound)
                .collect(),
        }
    }
}
