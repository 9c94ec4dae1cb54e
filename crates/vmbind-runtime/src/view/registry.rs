#![forbid(unsafe_code)]

//! View types, their binding declarations and the template cache.
//!
//! # Design
//!
//! A view type is registered once with the view model class it binds to
//! and the code that declares its bindings. The first
//! [`ViewRegistry::binding_template`] call for a `(view type, class)` pair
//! runs that code against a [`BindingLayoutBuilder`] and caches the result;
//! later calls hand out the same [`Rc`].
//!
//! The registry is an ordinary value. Tests build isolated instances and
//! hosts decide how long the cache lives.
//!
//! # Invariants
//!
//! 1. Cached templates never carry handlers.
//! 2. Re-registering or unregistering a view type evicts its templates.

use std::any::TypeId;
use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashMap;
use tracing::debug;
use vmbind_core::{ClassId, PropertyAccessor, ViewModelRegistry};

use super::ChangeTracker;
use crate::binding::{BindableView, BindingLayoutBuilder, BindingSink, CompiledLayout};
use crate::config::BindingConfig;

#[derive(Clone, Copy, PartialEq, Eq, Hash)]
enum KeyKind {
    Type(TypeId),
    Named,
}

/// Identifies a view type in a [`ViewRegistry`].
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct ViewTypeKey {
    kind: KeyKind,
    name: &'static str,
}

impl ViewTypeKey {
    /// Key for the Rust type `V`.
    #[must_use]
    pub fn of<V: 'static>() -> Self {
        Self {
            kind: KeyKind::Type(TypeId::of::<V>()),
            name: std::any::type_name::<V>(),
        }
    }

    /// Key for a view type known only by name.
    #[must_use]
    pub const fn named(name: &'static str) -> Self {
        Self {
            kind: KeyKind::Named,
            name,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl fmt::Debug for ViewTypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ViewTypeKey({})", self.name)
    }
}

impl fmt::Display for ViewTypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

type Collector = Rc<dyn Fn(&mut dyn BindingSink)>;

struct ViewEntry {
    root_class: ClassId,
    collector: Collector,
}

/// Registered view types and their cached binding templates.
pub struct ViewRegistry {
    models: Rc<ViewModelRegistry>,
    config: BindingConfig,
    tracker: ChangeTracker,
    views: FxHashMap<ViewTypeKey, ViewEntry>,
    templates: RefCell<FxHashMap<(ViewTypeKey, ClassId), Rc<CompiledLayout>>>,
}

impl ViewRegistry {
    #[must_use]
    pub fn new(models: ViewModelRegistry) -> Self {
        Self::with_models(Rc::new(models))
    }

    /// Registry over a view model registry shared with other owners.
    #[must_use]
    pub fn with_models(models: Rc<ViewModelRegistry>) -> Self {
        Self {
            models,
            config: BindingConfig::default(),
            tracker: ChangeTracker::new(),
            views: FxHashMap::default(),
            templates: RefCell::new(FxHashMap::default()),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: BindingConfig) -> Self {
        self.config = config;
        self
    }

    /// Register `V`, whose default instance declares the bindings.
    pub fn register_view<V>(&mut self, root_class: ClassId) -> ViewTypeKey
    where
        V: BindableView + Default + 'static,
    {
        let key = ViewTypeKey::of::<V>();
        self.register_view_with(key, root_class, |sink| V::default().collect_bindings(sink));
        key
    }

    /// Register a view type whose bindings `collector` declares.
    ///
    /// Replaces an earlier registration under the same key.
    pub fn register_view_with(
        &mut self,
        key: ViewTypeKey,
        root_class: ClassId,
        collector: impl Fn(&mut dyn BindingSink) + 'static,
    ) {
        let entry = ViewEntry {
            root_class,
            collector: Rc::new(collector),
        };
        if self.views.insert(key, entry).is_some() {
            self.evict(key);
        }
        debug!(view = %key, class = %root_class, "view type registered");
    }

    /// Forget a view type. Returns whether it was registered.
    pub fn unregister_view(&mut self, key: ViewTypeKey) -> bool {
        let removed = self.views.remove(&key).is_some();
        if removed {
            self.evict(key);
        }
        removed
    }

    #[must_use]
    pub fn is_registered(&self, key: ViewTypeKey) -> bool {
        self.views.contains_key(&key)
    }

    /// The view model class `key` was registered with.
    #[must_use]
    pub fn view_model_class(&self, key: ViewTypeKey) -> Option<ClassId> {
        self.views.get(&key).map(|entry| entry.root_class)
    }

    /// Template for `key` against its registered class.
    ///
    /// Built on first use, then shared.
    #[must_use]
    pub fn binding_template(&self, key: ViewTypeKey) -> Option<Rc<CompiledLayout>> {
        let class = self.view_model_class(key)?;
        self.binding_template_for(key, class)
    }

    /// Template for `key` against `class`, which must be the registered
    /// class or derive from it.
    ///
    /// Name-based bindings resolve against `class`, so a derived class may
    /// satisfy paths its base cannot.
    #[must_use]
    pub fn binding_template_for(
        &self,
        key: ViewTypeKey,
        class: ClassId,
    ) -> Option<Rc<CompiledLayout>> {
        let entry = self.views.get(&key)?;
        if !self.models.is_child_of(class, entry.root_class) {
            debug!(view = %key, class = %class, "class does not derive from the view's class");
            return None;
        }

        if let Some(template) = self.templates.borrow().get(&(key, class)) {
            return Some(Rc::clone(template));
        }

        let mut builder = BindingLayoutBuilder::new(&self.models, class)
            .with_warn_on_dropped(self.config.warn_on_dropped_bindings);
        (entry.collector)(&mut builder);
        let template = Rc::new(builder.build());
        debug!(
            view = %key,
            class = %class,
            observables = template.observables().len(),
            properties = template.properties().len(),
            dropped = builder.dropped_bindings(),
            "binding template cached"
        );
        self.templates
            .borrow_mut()
            .insert((key, class), Rc::clone(&template));
        Some(template)
    }

    /// Number of cached templates.
    #[must_use]
    pub fn template_count(&self) -> usize {
        self.templates.borrow().len()
    }

    /// Drop every cached template. Registrations stay.
    pub fn clear(&self) {
        self.templates.borrow_mut().clear();
    }

    #[must_use]
    pub fn change_tracker(&self) -> &ChangeTracker {
        &self.tracker
    }

    #[must_use]
    pub fn view_models(&self) -> &Rc<ViewModelRegistry> {
        &self.models
    }

    #[must_use]
    pub fn config(&self) -> BindingConfig {
        self.config
    }

    /// The accessor workers created from this registry read through.
    #[must_use]
    pub fn accessor(&self) -> Rc<dyn PropertyAccessor> {
        self.models.clone()
    }

    fn evict(&self, key: ViewTypeKey) {
        self.templates
            .borrow_mut()
            .retain(|(cached, _), _| *cached != key);
    }
}

impl fmt::Debug for ViewRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewRegistry")
            .field("views", &self.views.len())
            .field("templates", &self.template_count())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::binding::fixtures::Fixture;
    use crate::binding::handler::handler_fn;

    fn registry(f: &Fixture) -> ViewRegistry {
        ViewRegistry::with_models(Rc::clone(&f.registry))
    }

    #[derive(Default)]
    struct RootView;

    impl BindableView for RootView {
        fn collect_bindings(&self, sink: &mut dyn BindingSink) {
            sink.bind_by_name(&["IntValue"], handler_fn(|_, _| {}));
            sink.bind_by_name(&["Child", "IntValue"], handler_fn(|_, _| {}));
        }
    }

    #[test]
    fn typed_registration_compiles_default_instance_bindings() {
        let f = Fixture::new();
        let mut views = registry(&f);
        let key = views.register_view::<RootView>(f.root);

        let template = views.binding_template(key).unwrap();

        assert_eq!(key, ViewTypeKey::of::<RootView>());
        assert_eq!(views.view_model_class(key), Some(f.root));
        assert_eq!(template.observables().len(), 2);
        assert_eq!(template.properties().len(), 3);
        assert!(!template.has_handlers());
    }

    #[test]
    fn template_is_built_once_and_shared() {
        let f = Fixture::new();
        let mut views = registry(&f);
        let runs = Rc::new(Cell::new(0));
        let counter = Rc::clone(&runs);
        let int = f.root_int;
        let key = ViewTypeKey::named("Counting");
        views.register_view_with(key, f.root, move |sink| {
            counter.set(counter.get() + 1);
            sink.bind(&[int], handler_fn(|_, _| {}));
        });

        let a = views.binding_template(key).unwrap();
        let b = views.binding_template(key).unwrap();

        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(runs.get(), 1);
        assert_eq!(views.template_count(), 1);
    }

    #[test]
    fn clear_forces_rebuild() {
        let f = Fixture::new();
        let mut views = registry(&f);
        let key = views.register_view::<RootView>(f.root);
        let before = views.binding_template(key).unwrap();

        views.clear();
        assert_eq!(views.template_count(), 0);
        let after = views.binding_template(key).unwrap();

        assert!(!Rc::ptr_eq(&before, &after));
        assert!(views.is_registered(key));
    }

    #[test]
    fn reregistering_evicts_stale_template() {
        let f = Fixture::new();
        let mut views = registry(&f);
        let key = ViewTypeKey::named("Swap");
        let int = f.root_int;
        let min = f.root_min;
        views.register_view_with(key, f.root, move |sink| sink.bind(&[int], handler_fn(|_, _| {})));
        let first = views.binding_template(key).unwrap();

        views.register_view_with(key, f.root, move |sink| sink.bind(&[min], handler_fn(|_, _| {})));
        let second = views.binding_template(key).unwrap();

        assert_eq!(first.properties()[0].property(), f.root_int);
        assert_eq!(second.properties()[0].property(), f.root_min);
    }

    #[test]
    fn unregister_removes_view_and_templates() {
        let f = Fixture::new();
        let mut views = registry(&f);
        let key = views.register_view::<RootView>(f.root);
        let _ = views.binding_template(key);

        assert!(views.unregister_view(key));
        assert!(!views.unregister_view(key));
        assert_eq!(views.template_count(), 0);
        assert!(views.binding_template(key).is_none());
        assert_eq!(views.view_model_class(key), None);
    }

    #[test]
    fn unknown_view_has_no_template() {
        let f = Fixture::new();
        let views = registry(&f);
        assert!(views.binding_template(ViewTypeKey::named("Missing")).is_none());
    }

    #[test]
    fn derived_class_gets_its_own_template() {
        let f = Fixture::new();
        let mut views = registry(&f);
        let key = ViewTypeKey::named("Extra");
        views.register_view_with(key, f.root, |sink| {
            sink.bind_by_name(&["IntValue"], handler_fn(|_, _| {}));
            sink.bind_by_name(&["Extra"], handler_fn(|_, _| {}));
        });

        let base = views.binding_template(key).unwrap();
        let derived = views.binding_template_for(key, f.derived).unwrap();

        assert_eq!(base.properties().len(), 1);
        assert_eq!(derived.properties().len(), 2);
        assert_eq!(views.template_count(), 2);
        assert!(views.binding_template_for(key, f.first).is_none());
    }

    #[test]
    fn view_type_keys_compare_by_identity() {
        struct Other;
        assert_eq!(ViewTypeKey::named("A"), ViewTypeKey::named("A"));
        assert_ne!(ViewTypeKey::named("A"), ViewTypeKey::named("B"));
        assert_ne!(ViewTypeKey::of::<RootView>(), ViewTypeKey::of::<Other>());
        assert!(ViewTypeKey::of::<RootView>().name().ends_with("RootView"));
    }

    #[test]
    fn config_is_carried() {
        let f = Fixture::new();
        let views = registry(&f).with_config(BindingConfig::default().with_track_changes(false));
        assert!(!views.config().track_changes);
    }
}
