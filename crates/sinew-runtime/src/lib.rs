#![forbid(unsafe_code)]

//! Runtime: observers, dependency tracking, expressions, and bindings.
//!
//! # Layers
//!
//! - [`reactive`]: observers for properties and collections, the observer
//!   locator, batching, and the dependency tracker bindings connect through.
//! - [`expression`]: the binding expression AST, its evaluator, and value
//!   converters.
//! - [`binding`]: property, listener, ref and let bindings plus the renderer
//!   that builds them from compiled instructions.
//! - [`queue`]: the write queue deferred layout writes land on.
//! - [`config`]: locator configuration (observation strategy, layout
//!   properties).
//!
//! # Example
//!
//! ```
//! use std::rc::Rc;
//! use sinew_core::{Object, Scope, Value};
//! use sinew_runtime::binding::{Binding, PropertyBinding, Services};
//! use sinew_runtime::expression::Expression;
//! use sinew_runtime::flags::LifecycleFlags;
//!
//! let vm = Object::from_entries([("greeting", "hello")]);
//! let label = Object::element("span");
//! let binding = PropertyBinding::builder()
//!     .expression(Expression::scope("greeting"))
//!     .target(Rc::clone(&label))
//!     .target_property("textContent")
//!     .services(Services::default())
//!     .build()?;
//! binding.bind(LifecycleFlags::empty(), &Scope::create(Rc::clone(&vm)))?;
//! vm.set("greeting", Value::from("bye"))?;
//! assert_eq!(label.peek("textContent"), Value::from("bye"));
//! # Ok::<(), sinew_core::Error>(())
//! ```

pub mod binding;
pub mod config;
pub mod expression;
pub mod flags;
pub mod queue;
pub mod reactive;

pub use binding::{Binding, BindingGroup, PropertyBinding, Renderer, Services};
pub use config::{LocatorConfig, ObservationStrategy};
pub use expression::{EvalContext, Expression};
pub use flags::{AccessorType, BindingMode, LifecycleFlags};
pub use queue::{TaskHandle, TaskQueue, TaskStatus};
pub use reactive::{ObserverLocator, batch};
