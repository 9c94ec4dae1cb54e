#![forbid(unsafe_code)]

//! Observable view model with owner-keyed subscriptions.
//!
//! # Design
//!
//! A [`ViewModel`] is a bag of property values for one registered class.
//! It is shared as [`ViewModelRef`] (`Rc<ViewModel>`) and uses interior
//! mutability, so every operation takes `&self`. When a property changes
//! (determined by `PartialEq` on [`Value`]), all subscribers are notified
//! synchronously, in registration order, with the id of the property.
//!
//! Every subscription can carry an [`OwnerId`]. Binding workers subscribe
//! under their own owner id and later remove all of their subscriptions with
//! [`ViewModel::unsubscribe_owner`] without tracking handles, and without
//! touching subscriptions made by anyone else.
//!
//! # Performance
//!
//! | Operation             | Complexity                  |
//! |-----------------------|-----------------------------|
//! | `get()`               | O(1)                        |
//! | `set()`               | O(S) where S = subscribers  |
//! | `subscribe()`         | O(1) amortized              |
//! | `unsubscribe_owner()` | O(S)                        |
//!
//! # Failure Modes
//!
//! - **Re-entrant dispatch**: callbacks run outside of any internal borrow,
//!   so a callback may freely read, set, subscribe or unsubscribe on the same
//!   view model, and may itself trigger nested dispatches.
//! - **Unsubscribe during dispatch**: a subscription removed by an earlier
//!   callback of the same dispatch is skipped.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::num::NonZeroU64;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use rustc_hash::FxHashMap;

use crate::property::{ClassId, PropertyId};
use crate::value::Value;

/// Shared handle to a view model. Identity is pointer identity.
pub type ViewModelRef = Rc<ViewModel>;

/// Callback invoked with the id of the property that changed.
pub type PropertyChangedCallback = Rc<dyn Fn(PropertyId)>;

/// Identity of a subscriber that can own many subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OwnerId(NonZeroU64);

impl OwnerId {
    /// Allocate a new, process-unique owner id.
    #[must_use]
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        let raw = NEXT.fetch_add(1, Ordering::Relaxed);
        Self(NonZeroU64::new(raw).unwrap_or(NonZeroU64::MIN))
    }

    #[must_use]
    pub fn get(self) -> u64 {
        self.0.get()
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "owner#{}", self.0)
    }
}

/// Handle for one subscription, unique within its view model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(u64);

struct Subscriber {
    handle: SubscriptionHandle,
    owner: Option<OwnerId>,
    callback: PropertyChangedCallback,
}

/// An observable object: property values plus change subscribers.
///
/// # Invariants
///
/// 1. `version` increments by exactly 1 on each value-changing mutation.
/// 2. `set(p, v)` where `v` equals the current value is a no-op.
/// 3. Subscribers are notified in registration order.
/// 4. The subscription status hook sees `true` exactly when the subscriber
///    list goes from empty to non-empty, and `false` on the way back.
pub struct ViewModel {
    class: ClassId,
    values: RefCell<FxHashMap<PropertyId, Value>>,
    version: Cell<u64>,
    subscribers: RefCell<Vec<Subscriber>>,
    next_handle: Cell<u64>,
    status_hook: RefCell<Option<Rc<dyn Fn(bool)>>>,
}

impl ViewModel {
    /// Create an empty view model of the given class.
    ///
    /// All properties start unset and the version is 0.
    #[must_use]
    pub fn new(class: ClassId) -> ViewModelRef {
        Rc::new(Self {
            class,
            values: RefCell::new(FxHashMap::default()),
            version: Cell::new(0),
            subscribers: RefCell::new(Vec::new()),
            next_handle: Cell::new(1),
            status_hook: RefCell::new(None),
        })
    }

    /// Runtime class of this view model.
    #[must_use]
    pub fn class(&self) -> ClassId {
        self.class
    }

    /// Clone of the current value, or `None` if the property is unset.
    #[must_use]
    pub fn get(&self, property: PropertyId) -> Option<Value> {
        self.values.borrow().get(&property).cloned()
    }

    /// Access the current value by reference without cloning.
    pub fn with_value<R>(&self, property: PropertyId, f: impl FnOnce(Option<&Value>) -> R) -> R {
        f(self.values.borrow().get(&property))
    }

    /// Set a property. If the new value differs from the current one, the
    /// version is incremented and subscribers are notified.
    ///
    /// Returns whether the value changed.
    pub fn set(&self, property: PropertyId, value: impl Into<Value>) -> bool {
        let value = value.into();
        let previous = {
            let mut values = self.values.borrow_mut();
            if values.get(&property) == Some(&value) {
                return false;
            }
            values.insert(property, value)
        };
        // Dropped outside the borrow: it may hold the last reference to a
        // nested view model.
        drop(previous);
        self.bump_and_raise(property);
        true
    }

    /// Unset a property. Notifies subscribers if a value was removed.
    pub fn clear(&self, property: PropertyId) -> bool {
        let previous = self.values.borrow_mut().remove(&property);
        if previous.is_none() {
            return false;
        }
        drop(previous);
        self.bump_and_raise(property);
        true
    }

    /// Current version number. Useful for dirty-checking.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// Notify subscribers that `property` changed, without touching values.
    pub fn raise_changed(&self, property: PropertyId) {
        let callbacks: Vec<(SubscriptionHandle, PropertyChangedCallback)> = self
            .subscribers
            .borrow()
            .iter()
            .map(|s| (s.handle, Rc::clone(&s.callback)))
            .collect();

        #[cfg(feature = "tracing")]
        tracing::trace!(
            class = %self.class,
            property = %property,
            subscribers = callbacks.len(),
            "view model raise changed"
        );

        for (handle, callback) in callbacks {
            if self.has_handle(handle) {
                callback(property);
            }
        }
    }

    /// Subscribe without an owner. Remove with [`unsubscribe`](Self::unsubscribe).
    pub fn subscribe(&self, callback: impl Fn(PropertyId) + 'static) -> SubscriptionHandle {
        self.add_subscriber(None, Rc::new(callback))
    }

    /// Subscribe on behalf of `owner`.
    pub fn subscribe_owned(
        &self,
        owner: OwnerId,
        callback: impl Fn(PropertyId) + 'static,
    ) -> SubscriptionHandle {
        self.add_subscriber(Some(owner), Rc::new(callback))
    }

    /// Remove one subscription. Returns whether it existed.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        self.remove_where(|s| s.handle == handle) > 0
    }

    /// Remove every subscription registered by `owner`.
    ///
    /// Returns the number of removed subscriptions.
    pub fn unsubscribe_owner(&self, owner: OwnerId) -> usize {
        self.remove_where(|s| s.owner == Some(owner))
    }

    /// Whether `owner` currently holds at least one subscription.
    #[must_use]
    pub fn is_subscribed(&self, owner: OwnerId) -> bool {
        self.subscribers
            .borrow()
            .iter()
            .any(|s| s.owner == Some(owner))
    }

    /// Number of live subscriptions.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.borrow().len()
    }

    /// Whether anyone is listening to this view model.
    #[must_use]
    pub fn has_connected_views(&self) -> bool {
        !self.subscribers.borrow().is_empty()
    }

    /// Install a hook called with `true` when the first subscription is
    /// added and with `false` when the last one is removed.
    ///
    /// Typical use: stop polling an expensive source while nobody listens.
    pub fn set_subscription_status_hook(&self, hook: impl Fn(bool) + 'static) {
        *self.status_hook.borrow_mut() = Some(Rc::new(hook));
    }

    fn bump_and_raise(&self, property: PropertyId) {
        self.version.set(self.version.get() + 1);
        self.raise_changed(property);
    }

    fn has_handle(&self, handle: SubscriptionHandle) -> bool {
        self.subscribers.borrow().iter().any(|s| s.handle == handle)
    }

    fn add_subscriber(
        &self,
        owner: Option<OwnerId>,
        callback: PropertyChangedCallback,
    ) -> SubscriptionHandle {
        let handle = SubscriptionHandle(self.next_handle.get());
        self.next_handle.set(handle.0 + 1);

        let was_empty = {
            let mut subscribers = self.subscribers.borrow_mut();
            let was_empty = subscribers.is_empty();
            subscribers.push(Subscriber {
                handle,
                owner,
                callback,
            });
            was_empty
        };
        if was_empty {
            self.subscription_status_changed(true);
        }
        handle
    }

    fn remove_where(&self, predicate: impl Fn(&Subscriber) -> bool) -> usize {
        let (removed, now_empty) = {
            let mut subscribers = self.subscribers.borrow_mut();
            let before = subscribers.len();
            subscribers.retain(|s| !predicate(s));
            (before - subscribers.len(), subscribers.is_empty())
        };
        if removed > 0 && now_empty {
            self.subscription_status_changed(false);
        }
        removed
    }

    fn subscription_status_changed(&self, has_connected_views: bool) {
        let hook = self.status_hook.borrow().clone();
        if let Some(hook) = hook {
            hook(has_connected_views);
        }
    }
}

impl fmt::Debug for ViewModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ViewModel")
            .field("class", &self.class)
            .field("version", &self.version.get())
            .field("values", &self.values.borrow().len())
            .field("subscriber_count", &self.subscribers.borrow().len())
            .finish()
    }
}
