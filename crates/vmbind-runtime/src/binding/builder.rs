#![forbid(unsafe_code)]

//! Binding tree builder: property paths in, [`CompiledLayout`] out.
//!
//! # Design
//!
//! Paths are resolved against the [`ViewModelRegistry`] one step at a time,
//! starting at the root class. Resolved paths are merged into a prefix tree:
//!
//! - an intermediate step reuses the first existing child reached through
//!   the same property, so shared prefixes share one subscription;
//! - the final step always creates a new node, so two bindings ending at
//!   the same property each get their own handler slot.
//!
//! [`build`](BindingLayoutBuilder::build) flattens the tree breadth-first.
//! Only nodes with children become observable entries.
//!
//! # Failure Modes
//!
//! A path that does not resolve is dropped as a whole and never affects
//! other bindings. Drops are counted and logged.

use std::collections::VecDeque;

use smallvec::SmallVec;
use tracing::{debug, trace, warn};
use vmbind_core::{ClassId, PropertyId, PropertyInfo, ViewModelRegistry};

use super::error::BindingError;
use super::handler::PropertyChangeHandler;
use super::layout::CompiledLayout;
use super::sink::BindingSink;

/// One resolved path step: the property and the class it leads to.
type ResolvedStep = (PropertyId, Option<ClassId>);
type ResolvedPath = SmallVec<[ResolvedStep; 8]>;

/// Parent of a tree node; `None` is the root.
type Parent = Option<usize>;

#[derive(Debug)]
struct TreeNode {
    class: Option<ClassId>,
    property: PropertyId,
    children: Vec<usize>,
    handler_expected: bool,
}

/// Collects property paths for one root view model class and compiles them.
#[derive(Debug)]
pub struct BindingLayoutBuilder<'r> {
    registry: &'r ViewModelRegistry,
    root_class: ClassId,
    root_children: Vec<usize>,
    nodes: Vec<TreeNode>,
    added: usize,
    dropped: usize,
    warn_on_dropped: bool,
}

impl<'r> BindingLayoutBuilder<'r> {
    #[must_use]
    pub fn new(registry: &'r ViewModelRegistry, root_class: ClassId) -> Self {
        Self {
            registry,
            root_class,
            root_children: Vec::new(),
            nodes: Vec::new(),
            added: 0,
            dropped: 0,
            warn_on_dropped: false,
        }
    }

    /// Log dropped bindings at warn level instead of debug.
    #[must_use]
    pub fn with_warn_on_dropped(mut self, warn: bool) -> Self {
        self.warn_on_dropped = warn;
        self
    }

    #[must_use]
    pub fn root_class(&self) -> ClassId {
        self.root_class
    }

    /// Number of bindings recorded so far.
    #[must_use]
    pub fn binding_count(&self) -> usize {
        self.added
    }

    /// Number of bindings dropped because their path did not resolve.
    #[must_use]
    pub fn dropped_bindings(&self) -> usize {
        self.dropped
    }

    /// Record a binding given by property ids.
    ///
    /// # Errors
    ///
    /// Fails if the path is empty or a step does not resolve. Nothing is
    /// recorded in that case.
    pub fn try_add_binding(&mut self, path: &[PropertyId]) -> Result<(), BindingError> {
        let registry = self.registry;
        let resolved = self.resolve(path, |class, property| {
            registry.resolve_property(class, *property).ok_or_else(|| {
                let name = registry
                    .property(*property)
                    .map_or_else(|| property.to_string(), |p| p.name().to_string());
                unknown_property(registry, class, name)
            })
        })?;
        self.insert(&resolved);
        Ok(())
    }

    /// Record a binding given by property names.
    ///
    /// # Errors
    ///
    /// Fails if the path is empty or a name is not declared on the class
    /// reached so far (or its ancestors).
    pub fn try_add_binding_by_name(&mut self, path: &[&str]) -> Result<(), BindingError> {
        let registry = self.registry;
        let resolved = self.resolve(path, |class, name| {
            registry
                .find_property(class, name)
                .ok_or_else(|| unknown_property(registry, class, (*name).to_string()))
        })?;
        self.insert(&resolved);
        Ok(())
    }

    /// Record a binding, dropping it if it does not resolve.
    ///
    /// Returns whether the binding was recorded.
    pub fn add_binding(&mut self, path: &[PropertyId]) -> bool {
        let result = self.try_add_binding(path);
        self.note_result(result)
    }

    /// Record a binding by names, dropping it if it does not resolve.
    ///
    /// Returns whether the binding was recorded.
    pub fn add_binding_by_name(&mut self, path: &[&str]) -> bool {
        let result = self.try_add_binding_by_name(path);
        self.note_result(result)
    }

    /// Flatten the binding tree into a layout, breadth-first.
    ///
    /// Returns the empty layout when no binding was recorded.
    #[must_use]
    pub fn build(&self) -> CompiledLayout {
        let mut num_observables = 0;
        let mut num_properties = 0;
        let mut queue: VecDeque<Parent> = VecDeque::from([None]);
        while let Some(node) = queue.pop_front() {
            let children = self.children(node);
            if children.is_empty() {
                continue;
            }
            num_observables += 1;
            num_properties += children.len();
            queue.extend(children.iter().map(|&child| Some(child)));
        }

        if num_properties == 0 {
            debug!(root = %self.root_class, "no bindings, empty layout");
            return CompiledLayout::default();
        }

        let mut layout = CompiledLayout::new(num_observables, num_properties);

        // Each queued node remembers the property slot that leads to it.
        let mut queue: VecDeque<(Parent, Option<usize>)> = VecDeque::from([(None, None)]);
        while let Some((node, referrer)) = queue.pop_front() {
            let children = self.children(node);
            let observable = layout.push_observable(Some(self.class_of(node)), children.len());
            if let Some(slot) = referrer {
                layout.link(slot, observable);
            }
            for &child in children {
                let child_node = &self.nodes[child];
                let slot = layout.push_property(child_node.property);
                if !child_node.children.is_empty() {
                    queue.push_back((Some(child), Some(slot)));
                }
            }
        }
        debug_assert!(layout.is_complete());

        debug!(
            root = %self.root_class,
            observables = num_observables,
            properties = num_properties,
            bindings = self.added,
            handlers = self.expected_handlers(),
            dropped = self.dropped,
            "compiled binding layout"
        );
        layout
    }

    fn resolve<K>(
        &self,
        path: &[K],
        lookup: impl Fn(ClassId, &K) -> Result<&'r PropertyInfo, BindingError>,
    ) -> Result<ResolvedPath, BindingError> {
        if path.is_empty() {
            return Err(BindingError::EmptyPath);
        }

        let mut resolved = ResolvedPath::new();
        let mut class = self.root_class;
        for (index, step) in path.iter().enumerate() {
            let info = lookup(class, step)?;
            resolved.push((info.id(), info.value_class()));
            if index + 1 < path.len() {
                class = info
                    .value_class()
                    .ok_or_else(|| BindingError::NotAViewModel {
                        property: info.name().to_string(),
                    })?;
            }
        }
        Ok(resolved)
    }

    fn insert(&mut self, path: &[ResolvedStep]) {
        let last = path.len() - 1;
        let mut current: Parent = None;
        for (index, &(property, class)) in path.iter().enumerate() {
            let shared = if index == last {
                None
            } else {
                self.find_child(current, property)
            };
            let node = match shared {
                Some(node) => node,
                None => self.push_child(current, property, class),
            };
            current = Some(node);
        }
        if let Some(leaf) = current {
            self.nodes[leaf].handler_expected = true;
        }
        self.added += 1;
        trace!(root = %self.root_class, steps = path.len(), "binding recorded");
    }

    fn note_result(&mut self, result: Result<(), BindingError>) -> bool {
        match result {
            Ok(()) => true,
            Err(err) => {
                self.dropped += 1;
                if self.warn_on_dropped {
                    warn!(root = %self.root_class, error = %err, "binding dropped");
                } else {
                    debug!(root = %self.root_class, error = %err, "binding dropped");
                }
                false
            }
        }
    }

    fn children(&self, parent: Parent) -> &[usize] {
        match parent {
            None => &self.root_children,
            Some(node) => &self.nodes[node].children,
        }
    }

    fn class_of(&self, node: Parent) -> ClassId {
        match node {
            None => self.root_class,
            Some(node) => match self.nodes[node].class {
                Some(class) => class,
                None => unreachable!("binding node with children must lead to a view model"),
            },
        }
    }

    fn find_child(&self, parent: Parent, property: PropertyId) -> Option<usize> {
        self.children(parent)
            .iter()
            .copied()
            .find(|&child| self.nodes[child].property == property)
    }

    fn push_child(&mut self, parent: Parent, property: PropertyId, class: Option<ClassId>) -> usize {
        let index = self.nodes.len();
        self.nodes.push(TreeNode {
            class,
            property,
            children: Vec::new(),
            handler_expected: false,
        });
        match parent {
            None => self.root_children.push(index),
            Some(parent) => self.nodes[parent].children.push(index),
        }
        index
    }

    /// Number of handler slots the compiled layout will offer.
    #[must_use]
    pub fn expected_handlers(&self) -> usize {
        self.nodes.iter().filter(|n| n.handler_expected).count()
    }
}

fn unknown_property(registry: &ViewModelRegistry, class: ClassId, name: String) -> BindingError {
    BindingError::UnknownProperty {
        class: registry
            .class(class)
            .map_or_else(|| class.to_string(), |c| c.name().to_string()),
        name,
    }
}

impl BindingSink for BindingLayoutBuilder<'_> {
    fn bind(&mut self, path: &[PropertyId], _handler: Box<dyn PropertyChangeHandler>) {
        self.add_binding(path);
    }

    fn bind_by_name(&mut self, path: &[&str], _handler: Box<dyn PropertyChangeHandler>) {
        self.add_binding_by_name(path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::binding::fixtures::Fixture;
    use crate::binding::layout::PropertyEntry;

    fn props(layout: &CompiledLayout) -> Vec<(PropertyId, Option<usize>)> {
        layout
            .properties()
            .iter()
            .map(|p| (p.property(), p.next_observable()))
            .collect()
    }

    fn entries(layout: &CompiledLayout) -> Vec<(Option<ClassId>, usize, usize)> {
        layout
            .observables()
            .iter()
            .map(|o| (o.class(), o.first_property(), o.num_properties()))
            .collect()
    }

    #[test]
    fn single_property() {
        let f = Fixture::new();
        let mut builder = BindingLayoutBuilder::new(&f.registry, f.root);
        assert!(builder.add_binding(&[f.root_int]));

        let layout = builder.build();
        assert_eq!(entries(&layout), vec![(Some(f.root), 0, 1)]);
        assert_eq!(props(&layout), vec![(f.root_int, None)]);
    }

    #[test]
    fn multiple_properties() {
        let f = Fixture::new();
        let mut builder = BindingLayoutBuilder::new(&f.registry, f.root);
        builder.add_binding(&[f.root_int]);
        builder.add_binding(&[f.root_min]);
        builder.add_binding(&[f.root_max]);

        let layout = builder.build();
        assert_eq!(entries(&layout), vec![(Some(f.root), 0, 3)]);
        assert_eq!(
            props(&layout),
            vec![(f.root_int, None), (f.root_min, None), (f.root_max, None)]
        );
    }

    #[test]
    fn single_path() {
        let f = Fixture::new();
        let mut builder = BindingLayoutBuilder::new(&f.registry, f.root);
        builder.add_binding(&[f.root_child, f.first_child, f.second_int]);

        let layout = builder.build();
        assert_eq!(
            entries(&layout),
            vec![
                (Some(f.root), 0, 1),
                (Some(f.first), 1, 1),
                (Some(f.second), 2, 1)
            ]
        );
        assert_eq!(
            props(&layout),
            vec![
                (f.root_child, Some(1)),
                (f.first_child, Some(2)),
                (f.second_int, None)
            ]
        );
    }

    #[test]
    fn paths_share_prefix() {
        let f = Fixture::new();
        let mut builder = BindingLayoutBuilder::new(&f.registry, f.root);
        builder.add_binding(&[f.root_child, f.first_child, f.second_int]);
        builder.add_binding(&[f.root_child, f.first_int]);

        let layout = builder.build();
        assert_eq!(
            entries(&layout),
            vec![
                (Some(f.root), 0, 1),
                (Some(f.first), 1, 2),
                (Some(f.second), 3, 1)
            ]
        );
        assert_eq!(
            props(&layout),
            vec![
                (f.root_child, Some(1)),
                (f.first_child, Some(2)),
                (f.first_int, None),
                (f.second_int, None)
            ]
        );
    }

    #[test]
    fn by_name_matches_by_id() {
        let f = Fixture::new();
        let mut by_id = BindingLayoutBuilder::new(&f.registry, f.root);
        by_id.add_binding(&[f.root_child, f.first_child, f.second_int]);
        by_id.add_binding(&[f.root_child, f.first_int]);

        let mut by_name = BindingLayoutBuilder::new(&f.registry, f.root);
        assert!(by_name.add_binding_by_name(&["Child", "Child", "IntValue"]));
        assert!(by_name.add_binding_by_name(&["Child", "IntValue"]));

        let (a, b) = (by_id.build(), by_name.build());
        assert_eq!(entries(&a), entries(&b));
        assert_eq!(props(&a), props(&b));
    }

    #[test]
    fn identical_leaves_get_separate_slots() {
        let f = Fixture::new();
        let mut builder = BindingLayoutBuilder::new(&f.registry, f.root);
        builder.add_binding(&[f.root_int]);
        builder.add_binding(&[f.root_int]);
        builder.add_binding(&[f.root_child, f.first_int]);
        builder.add_binding(&[f.root_child, f.first_int]);
        assert_eq!(builder.expected_handlers(), 4);

        let layout = builder.build();
        assert_eq!(layout.observables().len(), 2);
        let root: Vec<_> = layout.properties_of(0).iter().map(PropertyEntry::property).collect();
        assert_eq!(root, vec![f.root_int, f.root_int, f.root_child]);
        assert_eq!(layout.properties_of(1).len(), 2);
    }

    #[test]
    fn leaf_then_path_reuses_leaf_node() {
        let f = Fixture::new();
        let mut builder = BindingLayoutBuilder::new(&f.registry, f.root);
        builder.add_binding(&[f.root_child]);
        builder.add_binding(&[f.root_child, f.first_int]);

        let layout = builder.build();
        assert_eq!(props(&layout), vec![(f.root_child, Some(1)), (f.first_int, None)]);
    }

    #[test]
    fn unresolvable_binding_is_dropped_alone() {
        let f = Fixture::new();
        let mut builder = BindingLayoutBuilder::new(&f.registry, f.root);
        assert!(builder.add_binding(&[f.root_int]));
        // Second-level property used at the root.
        assert!(!builder.add_binding(&[f.second_int]));
        assert!(!builder.add_binding_by_name(&["Child", "Missing"]));
        assert!(!builder.add_binding(&[]));
        assert!(builder.add_binding(&[f.root_min]));

        assert_eq!(builder.binding_count(), 2);
        assert_eq!(builder.dropped_bindings(), 3);
        assert_eq!(
            props(&builder.build()),
            vec![(f.root_int, None), (f.root_min, None)]
        );
    }

    #[test]
    fn errors_describe_the_failure() {
        let f = Fixture::new();
        let mut builder = BindingLayoutBuilder::new(&f.registry, f.root);
        assert_eq!(builder.try_add_binding(&[]), Err(BindingError::EmptyPath));
        assert_eq!(
            builder.try_add_binding_by_name(&["Child", "Nope"]),
            Err(BindingError::UnknownProperty {
                class: "FirstChild".into(),
                name: "Nope".into()
            })
        );
        assert_eq!(
            builder.try_add_binding(&[f.root_int, f.first_int]),
            Err(BindingError::NotAViewModel {
                property: "IntValue".into()
            })
        );
    }

    #[test]
    fn inherited_properties_resolve() {
        let f = Fixture::new();
        let mut builder = BindingLayoutBuilder::new(&f.registry, f.derived);
        assert!(builder.add_binding(&[f.root_int]));
        assert!(builder.add_binding_by_name(&["Extra"]));
        assert!(builder.add_binding_by_name(&["Child", "IntValue"]));
        assert_eq!(builder.build().properties().len(), 4);

        // Declared on the derived class only.
        let mut base = BindingLayoutBuilder::new(&f.registry, f.root);
        assert!(!base.add_binding(&[f.derived_extra]));
        assert_eq!(base.dropped_bindings(), 1);
    }

    #[test]
    fn empty_builder_builds_empty_layout() {
        let f = Fixture::new();
        let builder = BindingLayoutBuilder::new(&f.registry, f.root);
        assert!(builder.build().is_empty());

        let mut dropped_only = BindingLayoutBuilder::new(&f.registry, f.root);
        dropped_only.add_binding_by_name(&["Nope"]);
        assert!(dropped_only.build().is_empty());
    }

    #[test]
    fn build_is_repeatable() {
        let f = Fixture::new();
        let mut builder = BindingLayoutBuilder::new(&f.registry, f.root);
        builder.add_binding(&[f.root_child, f.first_child, f.second_int]);
        builder.add_binding(&[f.root_int]);
        let (a, b) = (builder.build(), builder.build());
        assert_eq!(props(&a), props(&b));
        assert_eq!(entries(&a), entries(&b));
    }
}
