#![forbid(unsafe_code)]

//! Runtime: compiled binding layouts, binding workers, and view lifecycle.
//!
//! # Role in vmbind
//! `vmbind-runtime` turns declared property paths into something that can
//! be listened to. A view type declares its bindings once; the
//! [`ViewRegistry`] compiles them into a shared [`CompiledLayout`] template,
//! and every view instance owns a [`BindingWorker`] that copies the
//! template, attaches its own handlers and keeps subscriptions in sync as
//! view models along the paths are replaced.
//!
//! # Primary responsibilities
//! - **Compilation**: [`BindingLayoutBuilder`] merges paths into a prefix tree
//!   and flattens it breadth-first into a [`CompiledLayout`].
//! - **Propagation**: [`BindingWorker`] subscribes, delivers initial values
//!   and cascades re-subscription when an intermediate link changes.
//! - **Lifecycle**: [`ViewComponent`] decides when a worker listens, and
//!   [`ChangeTracker`] lets handlers ask why they are being called.
//!
//! # Example
//!
//! ```
//! use std::cell::RefCell;
//! use std::rc::Rc;
//!
//! use vmbind_core::{PropertyKind, ViewModel, ViewModelRegistry};
//! use vmbind_runtime::{BindingSink, ViewComponent, ViewRegistry, ViewTypeKey, handler_fn};
//!
//! let mut models = ViewModelRegistry::new();
//! let counter = models.register_class("Counter", None).unwrap();
//! let count = models.register_property(counter, "Count", PropertyKind::Value).unwrap();
//!
//! let mut views = ViewRegistry::new(models);
//! let key = ViewTypeKey::named("CounterView");
//! views.register_view_with(key, counter, move |sink: &mut dyn BindingSink| {
//!     sink.bind(&[count], handler_fn(|_, _| {}));
//! });
//!
//! let seen = Rc::new(RefCell::new(Vec::new()));
//! let mut component = ViewComponent::new(&views, key);
//! let log = Rc::clone(&seen);
//! component.bind(&[count], handler_fn(move |vm, property| {
//!     let value = vm.and_then(|vm| vm.get(property)).and_then(|v| v.as_int());
//!     log.borrow_mut().push(value);
//! }));
//!
//! let model = ViewModel::new(counter);
//! model.set(count, 1);
//! component.set_view_model(Some(model.clone()));
//! component.construct();
//! model.set(count, 2);
//!
//! assert_eq!(*seen.borrow(), vec![Some(1), Some(2)]);
//! ```

pub mod binding;
pub mod config;
pub mod view;

pub use binding::{
    BindableView, BindingError, BindingLayoutBuilder, BindingSink, BindingWorker, CompiledLayout,
    LayoutHeader, ObservableEntry, PropertyChangeHandler, PropertyEntry, WorkerOwner, handler_fn,
};
pub use config::BindingConfig;
pub use view::{
    ChangeScope, ChangeTracker, InitializationScope, ViewComponent, ViewRegistry, ViewTypeKey,
};
