//! Declaring bindings once for both compilation and instantiation.
//!
//! A view lists its bindings in [`BindableView::collect_bindings`]. The
//! registry runs that code against a [`BindingLayoutBuilder`] to compile the
//! shared template, and every view instance runs it again against its own
//! [`BindingWorker`] to attach the handlers.
//!
//! [`BindingLayoutBuilder`]: crate::BindingLayoutBuilder
//! [`BindingWorker`]: crate::BindingWorker

use vmbind_core::PropertyId;

use super::handler::PropertyChangeHandler;

/// Receives binding declarations.
pub trait BindingSink {
    /// Declare a binding by property ids.
    fn bind(&mut self, path: &[PropertyId], handler: Box<dyn PropertyChangeHandler>);

    /// Declare a binding by property names.
    fn bind_by_name(&mut self, path: &[&str], handler: Box<dyn PropertyChangeHandler>);
}

/// A view type that can declare its bindings.
pub trait BindableView {
    /// Declare every binding of this view.
    ///
    /// Called on a default instance to compile the template, then on each
    /// real instance. It must declare the same paths in the same order both
    /// times.
    fn collect_bindings(&self, sink: &mut dyn BindingSink);
}
