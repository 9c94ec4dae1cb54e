#![forbid(unsafe_code)]

//! The host side of one view instance.
//!
//! A [`ViewComponent`] owns the shared [`BindingWorker`] of a view and
//! decides when it listens: only while the view is constructed (visible)
//! and has a view model.
//!
//! ```text
//!             set_view_model(Some)          construct()
//!   detached ────────────────────▶ bound ───────────────▶ live
//!                                    ▲  ◀─────────────────  │
//!                                    │      destruct()      │
//!                                    └─ set_view_model(..) ─┘
//!                                       (restart on new model)
//! ```
//!
//! Handlers run with nothing borrowed, so they may write to the view models
//! they are bound to. They must not call back into the component itself,
//! which the host holds mutably while it drives the lifecycle.

use std::fmt;
use std::rc::Rc;

use tracing::debug;
use vmbind_core::{OwnerId, PropertyId, ViewModelRef};

use super::{ChangeTracker, ViewRegistry, ViewTypeKey};
use crate::binding::{
    BindableView, BindingSink, BindingWorker, CompiledLayout, PropertyChangeHandler, WorkerOwner,
};

type ViewModelChangedFn = Box<dyn Fn(Option<&ViewModelRef>, Option<&ViewModelRef>)>;

/// Binding lifecycle of one view instance.
pub struct ViewComponent {
    key: ViewTypeKey,
    id: OwnerId,
    worker: Rc<BindingWorker>,
    tracker: Option<ChangeTracker>,
    constructed: bool,
    view_model_changed: Option<ViewModelChangedFn>,
}

impl ViewComponent {
    /// Component for a view of type `key`, with a fresh copy of its
    /// template.
    ///
    /// An unregistered key yields a component without bindings.
    #[must_use]
    pub fn new(views: &ViewRegistry, key: ViewTypeKey) -> Self {
        let tracker = views
            .config()
            .track_changes
            .then(|| views.change_tracker().clone());
        let worker = Rc::new(BindingWorker::new(views.accessor()));
        let owner = WorkerOwner::forward_to(&worker);
        let id = owner.id();

        worker.set_change_tracker(tracker.clone());
        match views.binding_template(key) {
            Some(template) => worker.init(owner, &template),
            None => {
                debug!(view = %key, "view type not registered, no bindings");
                worker.init(owner, &CompiledLayout::default());
            }
        }

        Self {
            key,
            id,
            worker,
            tracker,
            constructed: false,
            view_model_changed: None,
        }
    }

    /// Component for `view`, with its handlers bound.
    #[must_use]
    pub fn for_view<V: BindableView + 'static>(views: &ViewRegistry, view: &V) -> Self {
        let mut component = Self::new(views, ViewTypeKey::of::<V>());
        component.prepare(view);
        component
    }

    /// Bind the handlers `view` declares.
    pub fn prepare(&mut self, view: &dyn BindableView) {
        let mut sink: &BindingWorker = &self.worker;
        view.collect_bindings(&mut sink);
    }

    /// Replace the view model. A constructed view stops listening to the
    /// old one and starts on the new one inside an initialization scope.
    ///
    /// The `on_view_model_changed` callback runs in between, with the
    /// worker already pointing at the new model.
    pub fn set_view_model(&mut self, view_model: Option<ViewModelRef>) {
        let old = self.view_model();
        let unchanged = match (&old, &view_model) {
            (Some(old), Some(new)) => Rc::ptr_eq(old, new),
            (None, None) => true,
            _ => false,
        };
        if unchanged {
            return;
        }

        if old.is_some() && self.constructed {
            self.worker.stop_listening();
        }
        self.worker.set_view_model(view_model.clone());
        debug!(view = %self.key, owner = %self.id, present = view_model.is_some(), "view model set");

        if let Some(callback) = &self.view_model_changed {
            callback(old.as_ref(), view_model.as_ref());
        }

        if view_model.is_some() && self.constructed {
            self.start_listening();
        }
    }

    /// The view became visible: start listening if a view model is set.
    pub fn construct(&mut self) {
        if self.constructed {
            return;
        }
        self.constructed = true;
        if self.view_model().is_some() {
            self.start_listening();
        }
    }

    /// The view went away: stop listening. The view model is kept.
    pub fn destruct(&mut self) {
        if !self.constructed {
            return;
        }
        self.constructed = false;
        self.worker.stop_listening();
    }

    #[must_use]
    pub fn is_constructed(&self) -> bool {
        self.constructed
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.worker.is_listening()
    }

    #[must_use]
    pub fn view_model(&self) -> Option<ViewModelRef> {
        self.worker.view_model()
    }

    /// Called with `(old, new)` whenever the view model is replaced.
    pub fn on_view_model_changed(
        &mut self,
        callback: impl Fn(Option<&ViewModelRef>, Option<&ViewModelRef>) + 'static,
    ) {
        self.view_model_changed = Some(Box::new(callback));
    }

    #[must_use]
    pub fn worker(&self) -> &Rc<BindingWorker> {
        &self.worker
    }

    #[must_use]
    pub fn key(&self) -> ViewTypeKey {
        self.key
    }

    /// Identity of this view in subscriptions and change scopes.
    #[must_use]
    pub fn id(&self) -> OwnerId {
        self.id
    }

    fn start_listening(&self) {
        let view_model = self.view_model();
        let _scope = self
            .tracker
            .as_ref()
            .map(|tracker| tracker.initialization_scope(self.id, view_model.as_ref()));
        self.worker.start_listening();
    }
}

impl Drop for ViewComponent {
    fn drop(&mut self) {
        self.worker.stop_listening();
    }
}

impl BindingSink for ViewComponent {
    fn bind(&mut self, path: &[PropertyId], handler: Box<dyn PropertyChangeHandler>) {
        let mut sink: &BindingWorker = &self.worker;
        sink.bind(path, handler);
    }

    fn bind_by_name(&mut self, path: &[&str], handler: Box<dyn PropertyChangeHandler>) {
        let mut sink: &BindingWorker = &self.worker;
        sink.bind_by_name(path, handler);
    }
}

impl fmt::Debug for ViewComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewComponent")
            .field("key", &self.key)
            .field("id", &self.id)
            .field("constructed", &self.constructed)
            .field("listening", &self.is_listening())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use vmbind_core::ViewModel;

    use super::*;
    use crate::binding::fixtures::Fixture;
    use crate::binding::handler::handler_fn;
    use crate::config::BindingConfig;

    type Log = Rc<RefCell<Vec<String>>>;

    /// Logs `IntValue` and `Child.IntValue` with the tracker state seen by
    /// the handler.
    struct PhaseLogView {
        log: Log,
        tracker: ChangeTracker,
    }

    impl BindableView for PhaseLogView {
        fn collect_bindings(&self, sink: &mut dyn BindingSink) {
            for path in [&["IntValue"][..], &["Child", "IntValue"][..]] {
                let log = Rc::clone(&self.log);
                let tracker = self.tracker.clone();
                let label = path.join(".");
                sink.bind_by_name(
                    path,
                    handler_fn(move |vm, property| {
                        let value = vm
                            .and_then(|vm| vm.get(property))
                            .and_then(|v| v.as_int())
                            .map_or_else(|| "-".to_string(), |v| v.to_string());
                        let phase = if tracker.initialization_depth() > 0 {
                            "init"
                        } else if tracker.change_depth() > 0 {
                            "change"
                        } else {
                            "plain"
                        };
                        log.borrow_mut().push(format!("{label}={value} {phase}"));
                    }),
                );
            }
        }
    }

    fn setup(config: BindingConfig) -> (Fixture, ViewRegistry, ViewTypeKey) {
        let f = Fixture::new();
        let mut views = ViewRegistry::with_models(Rc::clone(&f.registry)).with_config(config);
        let key = ViewTypeKey::named("PhaseLog");
        views.register_view_with(key, f.root, |sink| {
            sink.bind_by_name(&["IntValue"], handler_fn(|_, _| {}));
            sink.bind_by_name(&["Child", "IntValue"], handler_fn(|_, _| {}));
        });
        (f, views, key)
    }

    fn mount(views: &ViewRegistry, key: ViewTypeKey) -> (ViewComponent, Log) {
        let log: Log = Rc::default();
        let view = PhaseLogView {
            log: Rc::clone(&log),
            tracker: views.change_tracker().clone(),
        };
        let mut component = ViewComponent::new(views, key);
        component.prepare(&view);
        (component, log)
    }

    fn take(log: &Log) -> Vec<String> {
        std::mem::take(&mut *log.borrow_mut())
    }

    #[test]
    fn listens_only_while_constructed() {
        let (f, views, key) = setup(BindingConfig::default());
        let (mut component, log) = mount(&views, key);
        let (root, first, _) = f.chain(1);

        component.set_view_model(Some(Rc::clone(&root)));
        assert!(!component.is_listening());
        assert!(take(&log).is_empty());

        component.construct();
        assert!(component.is_listening());
        assert_eq!(take(&log), ["IntValue=1 init", "Child.IntValue=2 init"]);

        first.set(f.first_int, 7);
        assert_eq!(take(&log), ["Child.IntValue=7 change"]);

        component.destruct();
        assert!(!component.is_listening());
        root.set(f.root_int, 9);
        assert!(take(&log).is_empty());
        assert!(Rc::ptr_eq(&component.view_model().unwrap(), &root));
    }

    #[test]
    fn construct_without_view_model_waits() {
        let (f, views, key) = setup(BindingConfig::default());
        let (mut component, log) = mount(&views, key);

        component.construct();
        assert!(!component.is_listening());

        let (root, _, _) = f.chain(3);
        component.set_view_model(Some(root));
        assert!(component.is_listening());
        assert_eq!(take(&log), ["IntValue=3 init", "Child.IntValue=4 init"]);
    }

    #[test]
    fn replacing_view_model_restarts_listening() {
        let (f, views, key) = setup(BindingConfig::default());
        let (mut component, log) = mount(&views, key);
        let (old_root, old_first, _) = f.chain(0);
        let (new_root, _, _) = f.chain(10);
        component.set_view_model(Some(Rc::clone(&old_root)));
        component.construct();
        take(&log);

        component.set_view_model(Some(Rc::clone(&new_root)));
        assert_eq!(take(&log), ["IntValue=10 init", "Child.IntValue=11 init"]);
        assert_eq!(old_root.subscriber_count(), 0);
        assert_eq!(old_first.subscriber_count(), 0);

        component.set_view_model(None);
        assert!(!component.is_listening());
        assert_eq!(new_root.subscriber_count(), 0);
        assert!(take(&log).is_empty());
    }

    #[test]
    fn view_model_changed_callback_sees_old_and_new() {
        let (f, views, key) = setup(BindingConfig::default());
        let mut component = ViewComponent::new(&views, key);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        component.on_view_model_changed(move |old, new| {
            log.borrow_mut().push((old.cloned(), new.cloned()));
        });
        let a = ViewModel::new(f.root);
        let b = ViewModel::new(f.root);

        component.set_view_model(Some(Rc::clone(&a)));
        component.set_view_model(Some(Rc::clone(&a)));
        component.set_view_model(Some(Rc::clone(&b)));
        component.set_view_model(None);

        let seen = seen.borrow();
        assert_eq!(seen.len(), 3);
        assert!(seen[0].0.is_none() && Rc::ptr_eq(seen[0].1.as_ref().unwrap(), &a));
        assert!(Rc::ptr_eq(seen[1].0.as_ref().unwrap(), &a));
        assert!(Rc::ptr_eq(seen[1].1.as_ref().unwrap(), &b));
        assert!(Rc::ptr_eq(seen[2].0.as_ref().unwrap(), &b) && seen[2].1.is_none());
    }

    #[test]
    fn tracking_can_be_disabled() {
        let (f, views, key) = setup(BindingConfig::default().with_track_changes(false));
        let (mut component, log) = mount(&views, key);
        let (root, _, _) = f.chain(0);
        component.set_view_model(Some(Rc::clone(&root)));
        component.construct();
        root.set(f.root_int, 5);

        assert_eq!(
            take(&log),
            ["IntValue=0 plain", "Child.IntValue=1 plain", "IntValue=5 plain"]
        );
    }

    #[test]
    fn unregistered_view_has_no_bindings() {
        let (f, views, _) = setup(BindingConfig::default());
        let (mut component, log) = mount(&views, ViewTypeKey::named("Unknown"));
        component.set_view_model(Some(ViewModel::new(f.root)));
        component.construct();

        assert!(component.worker().layout().is_empty());
        assert!(!component.is_listening());
        assert!(take(&log).is_empty());
    }

    #[test]
    fn for_view_uses_the_type_key() {
        #[derive(Default)]
        struct CounterView;

        impl BindableView for CounterView {
            fn collect_bindings(&self, sink: &mut dyn BindingSink) {
                sink.bind_by_name(&["IntValue"], handler_fn(|_, _| {}));
            }
        }

        let f = Fixture::new();
        let mut views = ViewRegistry::with_models(Rc::clone(&f.registry));
        views.register_view::<CounterView>(f.root);

        let component = ViewComponent::for_view(&views, &CounterView);

        assert_eq!(component.key(), ViewTypeKey::of::<CounterView>());
        assert_eq!(component.worker().layout().handler_count(), 1);
    }

    #[test]
    fn dropping_component_releases_subscriptions() {
        let (f, views, key) = setup(BindingConfig::default());
        let (mut component, _log) = mount(&views, key);
        let (root, first, _) = f.chain(0);
        component.set_view_model(Some(Rc::clone(&root)));
        component.construct();
        assert_eq!(root.subscriber_count(), 1);

        drop(component);

        assert_eq!(root.subscriber_count(), 0);
        assert_eq!(first.subscriber_count(), 0);
    }
}
