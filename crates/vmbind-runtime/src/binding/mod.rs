#![forbid(unsafe_code)]

//! Binding resolution and propagation.
//!
//! - [`builder`]: property paths to a compiled template.
//! - [`layout`]: the compiled, index-linked layout.
//! - [`worker`]: one layout instance bound to one root view model.
//! - [`sink`]: the declaration surface shared by builder and worker.

pub mod builder;
mod error;
pub mod handler;
pub mod layout;
pub mod sink;
pub mod worker;

#[cfg(test)]
pub(crate) mod fixtures;

pub use builder::BindingLayoutBuilder;
pub use error::BindingError;
pub use handler::{PropertyChangeHandler, handler_fn};
pub use layout::{CompiledLayout, LayoutHeader, MAX_LAYOUT_ENTRIES, ObservableEntry, PropertyEntry};
pub use sink::{BindableView, BindingSink};
pub use worker::{BindingWorker, WorkerOwner};
