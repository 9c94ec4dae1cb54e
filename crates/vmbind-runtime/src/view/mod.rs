#![forbid(unsafe_code)]

//! View layer: template cache, lifecycle and change tracking.

pub mod component;
pub mod registry;
pub mod tracker;

pub use component::ViewComponent;
pub use registry::{ViewRegistry, ViewTypeKey};
pub use tracker::{ChangeScope, ChangeTracker, InitializationScope};
