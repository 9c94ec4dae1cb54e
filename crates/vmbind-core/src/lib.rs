#![forbid(unsafe_code)]

//! Core: identities, observable view models, and property reflection.
//!
//! # Role in vmbind
//! `vmbind-core` is the data layer. It owns the identity tokens that name
//! view-model types and their properties, the observable [`ViewModel`]
//! object views subscribe to, and the [`ViewModelRegistry`] that answers
//! reflection questions ("does this class declare that property?", "what
//! nested view model does this property currently hold?").
//!
//! # Primary responsibilities
//! - **Identity**: [`ClassId`], [`PropertyId`], [`OwnerId`].
//! - **Observable**: [`ViewModel`] with owner-keyed subscriptions and
//!   synchronous change notification.
//! - **Reflection**: [`ViewModelRegistry`] with class inheritance and the
//!   [`PropertyAccessor`] capability the binding engine consumes.
//!
//! # How it fits in the system
//! The runtime (`vmbind-runtime`) compiles property paths against the
//! registry and keeps one worker per view that subscribes to the view models
//! found along those paths. Nothing in this crate knows about bindings.

pub mod property;
pub mod registry;
pub mod value;
pub mod view_model;

pub use property::{ClassId, ClassInfo, PropertyId, PropertyInfo, PropertyKind};
pub use registry::{NestedRef, PropertyAccessor, RegistryError, ViewModelRegistry};
pub use value::Value;
pub use view_model::{
    OwnerId, PropertyChangedCallback, SubscriptionHandle, ViewModel, ViewModelRef,
};
