#![forbid(unsafe_code)]

//! sinew public facade crate.
//!
//! This crate provides the stable, ergonomic surface area for users.

pub use sinew_core::{Error, Result};

pub mod prelude {
    pub use sinew_core as core;
    pub use sinew_core::{Array, Function, Map, Object, Scope, Set, Value};
    #[cfg(feature = "runtime")]
    pub use sinew_runtime as runtime;
    #[cfg(feature = "runtime")]
    pub use sinew_runtime::{
        Binding, BindingMode, Expression, LifecycleFlags, LocatorConfig, ObservationStrategy,
        PropertyBinding, Renderer, Services,
    };
}
