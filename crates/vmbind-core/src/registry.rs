#![forbid(unsafe_code)]

//! Reflection registry for view-model classes and their properties.
//!
//! # Invariants
//!
//! 1. **Dense ids**: the n-th registered class is `ClassId(n)`, the n-th
//!    registered property is `PropertyId(n)`.
//!
//! 2. **Inheritance lookup**: property lookups on a class walk the parent
//!    chain, so a derived class sees every property of its ancestors.
//!
//! 3. **Unique names per class**: one class cannot declare two properties
//!    with the same name. A derived class may shadow an ancestor's name; the
//!    most derived declaration wins.
//!
//! # Failure Modes
//!
//! | Failure | Cause | Behavior |
//! |---------|-------|----------|
//! | Unknown class | Id from another registry, or never registered | `RegistryError::UnknownClass` |
//! | Duplicate class name | Same name registered twice | `RegistryError::DuplicateClass` |
//! | Duplicate property | Same name twice on one class | `RegistryError::DuplicateProperty` |
//! | Unknown property on read | Property not declared on the runtime class | Empty [`NestedRef`] |

use std::fmt;

use rustc_hash::FxHashMap;

use crate::property::{ClassId, ClassInfo, PropertyId, PropertyInfo, PropertyKind};
use crate::value::Value;
use crate::view_model::{ViewModel, ViewModelRef};

/// Errors from class and property registration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A class id did not name a registered class.
    UnknownClass(ClassId),
    /// A class with this name is already registered.
    DuplicateClass(String),
    /// The class already declares a property with this name.
    DuplicateProperty { class: String, name: String },
}

impl fmt::Display for RegistryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownClass(class) => write!(f, "unknown view model class: {class}"),
            Self::DuplicateClass(name) => write!(f, "duplicate view model class '{name}'"),
            Self::DuplicateProperty { class, name } => {
                write!(f, "duplicate property '{name}' on class '{class}'")
            }
        }
    }
}

impl std::error::Error for RegistryError {}

/// Result of reading a nested view-model reference through a property.
#[derive(Debug, Clone, Default)]
pub struct NestedRef {
    /// The referenced view model, if any.
    pub view_model: Option<ViewModelRef>,
    /// `false` when the property is unknown, not a reference, or an optional
    /// property currently holding no value.
    pub has_value: bool,
}

impl NestedRef {
    /// The reference to follow: present only when there is a value.
    #[must_use]
    pub fn into_view_model(self) -> Option<ViewModelRef> {
        if self.has_value {
            self.view_model
        } else {
            None
        }
    }
}

/// Reflection capability consumed by the binding engine.
pub trait PropertyAccessor {
    /// Read the nested view model `property` currently holds on `view_model`.
    fn read_nested(&self, view_model: &ViewModel, property: PropertyId) -> NestedRef;

    /// Declared name of a property, used for name-based path matching.
    fn property_name(&self, property: PropertyId) -> Option<&str>;
}

/// Registry of view-model classes and their declared properties.
///
/// # Example
///
/// ```
/// use vmbind_core::{PropertyKind, ViewModelRegistry};
///
/// let mut registry = ViewModelRegistry::new();
/// let child = registry.register_class("Child", None).unwrap();
/// let root = registry.register_class("Root", None).unwrap();
/// let value = registry.register_property(child, "Value", PropertyKind::Value).unwrap();
/// let link = registry
///     .register_property(root, "Child", PropertyKind::ViewModel { class: child })
///     .unwrap();
///
/// assert_eq!(registry.find_property(root, "Child").map(|p| p.id()), Some(link));
/// assert_eq!(registry.find_property(child, "Value").map(|p| p.id()), Some(value));
/// assert!(registry.find_property(root, "Value").is_none());
/// ```
#[derive(Debug, Clone, Default)]
pub struct ViewModelRegistry {
    classes: Vec<ClassInfo>,
    properties: Vec<PropertyInfo>,
    class_names: FxHashMap<Box<str>, ClassId>,
    /// (declaring class, property name) -> property.
    own_properties: FxHashMap<(ClassId, Box<str>), PropertyId>,
}

impl ViewModelRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a class, optionally deriving from `parent`.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is taken or `parent` is unknown.
    pub fn register_class(
        &mut self,
        name: &str,
        parent: Option<ClassId>,
    ) -> Result<ClassId, RegistryError> {
        if let Some(parent) = parent {
            self.require_class(parent)?;
        }
        if self.class_names.contains_key(name) {
            return Err(RegistryError::DuplicateClass(name.to_string()));
        }

        let id = ClassId::from_index(self.classes.len());
        self.classes.push(ClassInfo {
            id,
            name: name.into(),
            parent,
            properties: Vec::new(),
        });
        self.class_names.insert(name.into(), id);

        #[cfg(feature = "tracing")]
        tracing::debug!(class = %id, name, ?parent, "registered view model class");

        Ok(id)
    }

    /// Declare a property on `class`.
    ///
    /// # Errors
    ///
    /// Returns an error if `class` (or the nested class named by `kind`) is
    /// unknown, or if `class` already declares a property called `name`.
    pub fn register_property(
        &mut self,
        class: ClassId,
        name: &str,
        kind: PropertyKind,
    ) -> Result<PropertyId, RegistryError> {
        let class_name = self.require_class(class)?.name.to_string();
        if let Some(nested) = kind.value_class() {
            self.require_class(nested)?;
        }
        let key = (class, Box::<str>::from(name));
        if self.own_properties.contains_key(&key) {
            return Err(RegistryError::DuplicateProperty {
                class: class_name,
                name: name.to_string(),
            });
        }

        let id = PropertyId::from_index(self.properties.len());
        self.properties.push(PropertyInfo {
            id,
            owner: class,
            name: name.into(),
            kind,
        });
        self.own_properties.insert(key, id);
        self.classes[class.index()].properties.push(id);

        #[cfg(feature = "tracing")]
        tracing::debug!(class = %class, property = %id, name, ?kind, "registered property");

        Ok(id)
    }

    #[must_use]
    pub fn class(&self, class: ClassId) -> Option<&ClassInfo> {
        self.classes.get(class.index())
    }

    #[must_use]
    pub fn class_by_name(&self, name: &str) -> Option<ClassId> {
        self.class_names.get(name).copied()
    }

    #[must_use]
    pub fn property(&self, property: PropertyId) -> Option<&PropertyInfo> {
        self.properties.get(property.index())
    }

    /// Number of registered classes.
    #[must_use]
    pub fn class_count(&self) -> usize {
        self.classes.len()
    }

    /// Number of registered properties across all classes.
    #[must_use]
    pub fn property_count(&self) -> usize {
        self.properties.len()
    }

    /// Whether `class` is `ancestor` or derives from it.
    #[must_use]
    pub fn is_child_of(&self, class: ClassId, ancestor: ClassId) -> bool {
        self.ancestry(class).any(|c| c == ancestor)
    }

    /// Find a property by name on `class` or its ancestors.
    #[must_use]
    pub fn find_property(&self, class: ClassId, name: &str) -> Option<&PropertyInfo> {
        self.ancestry(class).find_map(|c| {
            self.own_properties
                .get(&(c, Box::<str>::from(name)))
                .and_then(|id| self.property(*id))
        })
    }

    /// Resolve a property id against `class`: succeeds when the property is
    /// declared on `class` or one of its ancestors.
    #[must_use]
    pub fn resolve_property(&self, class: ClassId, property: PropertyId) -> Option<&PropertyInfo> {
        let info = self.property(property)?;
        self.is_child_of(class, info.owner).then_some(info)
    }

    /// Iterate `class`, its parent, its grandparent, ...
    fn ancestry(&self, class: ClassId) -> impl Iterator<Item = ClassId> + '_ {
        std::iter::successors(self.class(class).map(|c| c.id), move |c| {
            self.class(*c).and_then(|info| info.parent)
        })
    }

    fn require_class(&self, class: ClassId) -> Result<&ClassInfo, RegistryError> {
        self.class(class).ok_or(RegistryError::UnknownClass(class))
    }
}

impl PropertyAccessor for ViewModelRegistry {
    fn read_nested(&self, view_model: &ViewModel, property: PropertyId) -> NestedRef {
        let Some(info) = self.resolve_property(view_model.class(), property) else {
            return NestedRef::default();
        };
        if info.kind == PropertyKind::Value {
            return NestedRef::default();
        }

        view_model.with_value(property, |value| match value {
            Some(Value::ViewModel(nested)) => NestedRef {
                view_model: Some(ViewModelRef::clone(nested)),
                has_value: true,
            },
            // A plain reference that is unset is null; an optional one has no value.
            None => NestedRef {
                view_model: None,
                has_value: !info.kind.is_optional(),
            },
            Some(_) => NestedRef::default(),
        })
    }

    fn property_name(&self, property: PropertyId) -> Option<&str> {
        self.property(property).map(PropertyInfo::name)
    }
}
