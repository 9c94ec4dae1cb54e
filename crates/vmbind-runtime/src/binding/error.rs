use std::fmt;

/// Why a binding declaration could not be recorded or attached.
///
/// Declaration errors are soft: the builder drops the offending binding and
/// keeps the rest. Calling [`BindingWorker::add_binding_handler`] with a path
/// the layout does not contain is a programming error and panics with this
/// error's message.
///
/// [`BindingWorker::add_binding_handler`]: crate::BindingWorker::add_binding_handler
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BindingError {
    /// The property path had no steps.
    EmptyPath,
    /// A step does not name a property of the view model class reached so far.
    UnknownProperty { class: String, name: String },
    /// An intermediate step names a property that does not hold a view model.
    NotAViewModel { property: String },
    /// The compiled layout has no free slot matching the path at `step`.
    NotInLayout { step: usize },
}

impl fmt::Display for BindingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyPath => write!(f, "empty property path"),
            Self::UnknownProperty { class, name } => {
                write!(f, "class '{class}' has no property '{name}'")
            }
            Self::NotAViewModel { property } => {
                write!(f, "property '{property}' does not hold a view model")
            }
            Self::NotInLayout { step } => {
                write!(f, "no unbound layout slot matches path step {step}")
            }
        }
    }
}

impl std::error::Error for BindingError {}
