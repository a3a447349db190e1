//! Bindings: the connection between an expression and a target.
//!
//! - [`PropertyBinding`]: one-time / to-view / from-view / two-way
//!   synchronization of an expression with a target property.
//! - [`ListenerBinding`]: runs an expression when the target dispatches an
//!   event.
//! - [`RefBinding`]: assigns the target itself into an expression.
//! - [`LetBinding`]: keeps a scope property equal to an expression.
//! - [`BindingGroup`]: binds and unbinds a set of bindings together.
//! - [`Renderer`]: turns compiler [`Instruction`]s into a [`BindingGroup`].
//!
//! # Lifecycle
//!
//! Every binding is `unbound` until [`Binding::bind`] and again after
//! [`Binding::unbind`]. Both are idempotent: binding twice to the same scope
//! does nothing, unbinding an unbound binding does nothing. Binding to a
//! different scope unbinds first.

mod group;
mod instruction;
mod let_binding;
mod listener;
mod property;
mod ref_binding;

use std::fmt;
use std::rc::Rc;

use sinew_core::{Result, Scope};

use crate::config::LocatorConfig;
use crate::expression::{EvalContext, Resources};
use crate::flags::LifecycleFlags;
use crate::queue::TaskQueue;
use crate::reactive::ObserverLocator;

pub use group::BindingGroup;
pub use instruction::{Instruction, Renderer};
pub use let_binding::LetBinding;
pub use listener::ListenerBinding;
pub use property::{PropertyBinding, PropertyBindingBuilder};
pub use ref_binding::RefBinding;

/// Lifecycle surface the controller tree drives.
pub trait Binding {
    fn bind(&self, flags: LifecycleFlags, scope: &Rc<Scope>) -> Result<()>;
    fn unbind(&self, flags: LifecycleFlags);
    fn is_bound(&self) -> bool;
}

/// Shared services every binding resolves from.
#[derive(Clone)]
pub struct Services {
    locator: Rc<ObserverLocator>,
    queue: Rc<TaskQueue>,
    resources: Rc<Resources>,
}

impl Services {
    pub fn new(config: LocatorConfig) -> Self {
        Self {
            locator: ObserverLocator::new(config),
            queue: TaskQueue::new(),
            resources: Rc::new(Resources::new()),
        }
    }

    #[must_use]
    pub fn with_resources(mut self, resources: Resources) -> Self {
        self.resources = Rc::new(resources);
        self
    }

    #[must_use]
    pub fn with_queue(mut self, queue: Rc<TaskQueue>) -> Self {
        self.queue = queue;
        self
    }

    #[must_use]
    pub fn locator(&self) -> &Rc<ObserverLocator> {
        &self.locator
    }

    #[must_use]
    pub fn queue(&self) -> &Rc<TaskQueue> {
        &self.queue
    }

    #[must_use]
    pub fn resources(&self) -> &Rc<Resources> {
        &self.resources
    }

    /// Unconnected evaluation context over these services.
    pub(crate) fn context(&self, flags: LifecycleFlags) -> EvalContext<'_> {
        EvalContext::new(flags)
            .with_locator(&self.locator)
            .with_resources(&self.resources)
    }
}

impl Default for Services {
    fn default() -> Self {
        Self::new(LocatorConfig::default())
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services")
            .field("locator", &self.locator)
            .field("queue", &self.queue)
            .field("resources", &self.resources)
            .finish()
    }
}

/// Whether `a` and `b` are the same scope.
fn same_scope(a: &Option<Rc<Scope>>, b: &Rc<Scope>) -> bool {
    a.as_ref().is_some_and(|a| Rc::ptr_eq(a, b))
}
