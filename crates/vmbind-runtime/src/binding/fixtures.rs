//! View model classes shared by the binding unit tests.
//!
//! ```text
//! Root        { IntValue, MinIntValue, MaxIntValue, Child: FirstChild, MaybeChild: FirstChild? }
//! FirstChild  { IntValue, Child: SecondChild }
//! SecondChild { IntValue }
//! Derived : Root { Extra }
//! ```

use std::rc::Rc;

use vmbind_core::{ClassId, PropertyId, PropertyKind, ViewModel, ViewModelRef, ViewModelRegistry};

pub(crate) struct Fixture {
    pub registry: Rc<ViewModelRegistry>,
    pub root: ClassId,
    pub first: ClassId,
    pub second: ClassId,
    pub derived: ClassId,
    pub root_int: PropertyId,
    pub root_min: PropertyId,
    pub root_max: PropertyId,
    pub root_child: PropertyId,
    pub root_maybe: PropertyId,
    pub first_int: PropertyId,
    pub first_child: PropertyId,
    pub second_int: PropertyId,
    pub derived_extra: PropertyId,
}

impl Fixture {
    pub fn new() -> Self {
        let mut registry = ViewModelRegistry::new();
        let second = registry.register_class("SecondChild", None).unwrap();
        let first = registry.register_class("FirstChild", None).unwrap();
        let root = registry.register_class("Root", None).unwrap();
        let derived = registry.register_class("Derived", Some(root)).unwrap();

        let second_int = registry
            .register_property(second, "IntValue", PropertyKind::Value)
            .unwrap();
        let first_int = registry
            .register_property(first, "IntValue", PropertyKind::Value)
            .unwrap();
        let first_child = registry
            .register_property(first, "Child", PropertyKind::ViewModel { class: second })
            .unwrap();
        let root_int = registry
            .register_property(root, "IntValue", PropertyKind::Value)
            .unwrap();
        let root_min = registry
            .register_property(root, "MinIntValue", PropertyKind::Value)
            .unwrap();
        let root_max = registry
            .register_property(root, "MaxIntValue", PropertyKind::Value)
            .unwrap();
        let root_child = registry
            .register_property(root, "Child", PropertyKind::ViewModel { class: first })
            .unwrap();
        let root_maybe = registry
            .register_property(
                root,
                "MaybeChild",
                PropertyKind::OptionalViewModel { class: first },
            )
            .unwrap();
        let derived_extra = registry
            .register_property(derived, "Extra", PropertyKind::Value)
            .unwrap();

        Self {
            registry: Rc::new(registry),
            root,
            first,
            second,
            derived,
            root_int,
            root_min,
            root_max,
            root_child,
            root_maybe,
            first_int,
            first_child,
            second_int,
            derived_extra,
        }
    }

    /// Root -> FirstChild -> SecondChild, with every int set to `base`,
    /// `base + 1`, `base + 2` from the root down.
    pub fn chain(&self, base: i64) -> (ViewModelRef, ViewModelRef, ViewModelRef) {
        let root = ViewModel::new(self.root);
        let first = ViewModel::new(self.first);
        let second = ViewModel::new(self.second);
        root.set(self.root_int, base);
        first.set(self.first_int, base + 1);
        second.set(self.second_int, base + 2);
        first.set(self.first_child, &second);
        root.set(self.root_child, &first);
        (root, first, second)
    }
}
