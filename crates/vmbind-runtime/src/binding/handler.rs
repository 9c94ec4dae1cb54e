//! The callback attached to one bound property.

use vmbind_core::{PropertyId, ViewModelRef};

/// Invoked when a bound property changes, and once when listening starts.
///
/// `view_model` is the object that owns `property`. It is `None` when a
/// cascade reaches a nested view model that was cleared.
pub trait PropertyChangeHandler {
    fn invoke(&self, view_model: Option<&ViewModelRef>, property: PropertyId);
}

impl<F> PropertyChangeHandler for F
where
    F: Fn(Option<&ViewModelRef>, PropertyId),
{
    fn invoke(&self, view_model: Option<&ViewModelRef>, property: PropertyId) {
        self(view_model, property);
    }
}

/// Box a closure as a handler, letting the compiler infer its argument types.
pub fn handler_fn<F>(f: F) -> Box<dyn PropertyChangeHandler>
where
    F: Fn(Option<&ViewModelRef>, PropertyId) + 'static,
{
    Box::new(f)
}
