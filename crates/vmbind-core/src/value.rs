//! Property values stored on a [`ViewModel`](crate::ViewModel).

use std::fmt;
use std::rc::Rc;

use crate::view_model::ViewModelRef;

/// A value held by one view-model property.
///
/// Nested view models compare by identity, everything else by value.
/// Floats compare by bit pattern, so assigning `NaN` over `NaN` is not a
/// change while `0.0` and `-0.0` are distinct.
/// A property that holds no `Value` at all is "unset": null for plain
/// view-model references, "no value" for optional ones.
#[derive(Clone)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(Rc<str>),
    ViewModel(ViewModelRef),
}

impl Value {
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(v) => Some(v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_view_model(&self) -> Option<&ViewModelRef> {
        match self {
            Self::ViewModel(v) => Some(v),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::ViewModel(a), Self::ViewModel(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(v) => f.debug_tuple("Bool").field(v).finish(),
            Self::Int(v) => f.debug_tuple("Int").field(v).finish(),
            Self::Float(v) => f.debug_tuple("Float").field(v).finish(),
            Self::Text(v) => f.debug_tuple("Text").field(v).finish(),
            // Avoid recursing into nested view models.
            Self::ViewModel(v) => f
                .debug_tuple("ViewModel")
                .field(&v.class())
                .field(&Rc::as_ptr(v))
                .finish(),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(Rc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(Rc::from(v))
    }
}

impl From<ViewModelRef> for Value {
    fn from(v: ViewModelRef) -> Self {
        Self::ViewModel(v)
    }
}

impl From<&ViewModelRef> for Value {
    fn from(v: &ViewModelRef) -> Self {
        Self::ViewModel(Rc::clone(v))
    }
}
