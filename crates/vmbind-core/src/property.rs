#![forbid(unsafe_code)]

//! Identity tokens for view-model classes and their declared properties.
//!
//! Both ids are dense indices handed out by a
//! [`ViewModelRegistry`](crate::ViewModelRegistry). They are only meaningful
//! for the registry that produced them.

use std::fmt;

/// Identifies one registered view-model class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(u32);

impl ClassId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ClassId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "class#{}", self.0)
    }
}

/// Identifies one declared property on one view-model class.
///
/// Property ids compare by identity: two properties with the same name on
/// unrelated classes have different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PropertyId(u32);

impl PropertyId {
    pub(crate) fn from_index(index: usize) -> Self {
        Self(u32::try_from(index).unwrap_or(u32::MAX))
    }

    pub(crate) fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for PropertyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "property#{}", self.0)
    }
}

/// What a property holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    /// A plain value. Only valid as the last step of a property path.
    Value,
    /// A reference to a nested view model of the given class, possibly null.
    ViewModel { class: ClassId },
    /// A nested view model reference that may also hold "no value".
    OptionalViewModel { class: ClassId },
}

impl PropertyKind {
    /// Class of the nested view model, for reference kinds.
    #[must_use]
    pub fn value_class(self) -> Option<ClassId> {
        match self {
            Self::Value => None,
            Self::ViewModel { class } | Self::OptionalViewModel { class } => Some(class),
        }
    }

    /// Whether an absent value means "no value" rather than null.
    #[must_use]
    pub fn is_optional(self) -> bool {
        matches!(self, Self::OptionalViewModel { .. })
    }
}

/// Reflection data for one declared property.
#[derive(Debug, Clone)]
pub struct PropertyInfo {
    pub(crate) id: PropertyId,
    pub(crate) owner: ClassId,
    pub(crate) name: Box<str>,
    pub(crate) kind: PropertyKind,
}

impl PropertyInfo {
    #[must_use]
    pub fn id(&self) -> PropertyId {
        self.id
    }

    /// Class that declares this property.
    #[must_use]
    pub fn owner(&self) -> ClassId {
        self.owner
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn kind(&self) -> PropertyKind {
        self.kind
    }

    /// Class of the view model this property leads to, if any.
    #[must_use]
    pub fn value_class(&self) -> Option<ClassId> {
        self.kind.value_class()
    }
}

/// Reflection data for one registered class.
#[derive(Debug, Clone)]
pub struct ClassInfo {
    pub(crate) id: ClassId,
    pub(crate) name: Box<str>,
    pub(crate) parent: Option<ClassId>,
    pub(crate) properties: Vec<PropertyId>,
}

impl ClassInfo {
    #[must_use]
    pub fn id(&self) -> ClassId {
        self.id
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn parent(&self) -> Option<ClassId> {
        self.parent
    }

    /// Properties declared directly on this class, in registration order.
    /// Inherited properties are not included.
    #[must_use]
    pub fn properties(&self) -> &[PropertyId] {
        &self.properties
    }
}
