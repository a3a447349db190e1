//! `let` bindings: keep a scope property equal to an expression.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use sinew_core::tracking::untracked;
use sinew_core::{Object, Result, Scope, Value};

use super::{Binding, Services, same_scope};
use crate::expression::Expression;
use crate::flags::LifecycleFlags;
use crate::reactive::{CollectionSubscriber, Connector, IndexMap, Subscriber};

/// Writes the value of `expression` into `property` of the bound scope's
/// override context, or its binding context with `to_binding_context`.
pub struct LetBinding {
    expression: Rc<Expression>,
    property: Rc<str>,
    to_binding_context: bool,
    services: Services,
    connector: Connector,
    scope: RefCell<Option<Rc<Scope>>>,
    target: RefCell<Option<Rc<Object>>>,
    bound: Cell<bool>,
}

impl LetBinding {
    pub fn new(
        expression: impl Into<Rc<Expression>>,
        property: &str,
        to_binding_context: bool,
        services: Services,
    ) -> Rc<Self> {
        let expression = expression.into();
        Rc::new_cyclic(|me: &Weak<Self>| Self {
            connector: Connector::new(Rc::clone(services.locator()), me),
            expression,
            property: Rc::from(property),
            to_binding_context,
            services,
            scope: RefCell::new(None),
            target: RefCell::new(None),
            bound: Cell::new(false),
        })
    }

    #[must_use]
    pub fn property(&self) -> &str {
        &self.property
    }

    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.connector.record().len()
    }

    fn update(&self, flags: LifecycleFlags) -> Result<()> {
        let (Some(scope), Some(target)) = (self.scope.borrow().clone(), self.target.borrow().clone())
        else {
            return Ok(());
        };
        let ctx = self.services.context(flags);
        let value = untracked(|| {
            let record = self.connector.record();
            record.begin_pass();
            let value = self.expression.evaluate(&scope, &ctx.connected(&self.connector));
            record.clear_stale();
            value
        })?;
        let observer = self
            .services
            .locator()
            .get_observer(&Value::Object(target), &self.property);
        observer.set_value(value, flags)
    }
}

impl Binding for LetBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Rc<Scope>) -> Result<()> {
        if self.bound.get() {
            if same_scope(&self.scope.borrow(), scope) {
                return Ok(());
            }
            self.unbind(flags);
        }
        let target = if self.to_binding_context {
            scope.binding_context()
        } else {
            scope.override_context()
        };
        *self.target.borrow_mut() = Some(Rc::clone(target));
        *self.scope.borrow_mut() = Some(Rc::clone(scope));
        self.bound.set(true);
        if let Err(err) = self.update(flags | LifecycleFlags::FROM_BIND) {
            self.unbind(flags);
            return Err(err);
        }
        tracing::debug!(
            message = "binding.bind",
            kind = "let",
            property = %self.property,
            dependencies = self.connector.record().len(),
        );
        Ok(())
    }

    fn unbind(&self, _flags: LifecycleFlags) {
        if !self.bound.replace(false) {
            return;
        }
        self.connector.record().clear_all();
        self.scope.borrow_mut().take();
        self.target.borrow_mut().take();
        tracing::debug!(message = "binding.unbind", kind = "let", property = %self.property);
    }

    fn is_bound(&self) -> bool {
        self.bound.get()
    }
}

impl Subscriber for LetBinding {
    fn handle_change(&self, _new: &Value, _old: &Value, flags: LifecycleFlags) -> Result<()> {
        if !self.bound.get() {
            return Ok(());
        }
        self.update(flags | LifecycleFlags::UPDATE_TARGET)
    }
}

impl CollectionSubscriber for LetBinding {
    fn handle_collection_change(&self, _index_map: &IndexMap, flags: LifecycleFlags) -> Result<()> {
        if !self.bound.get() {
            return Ok(());
        }
        self.update(flags | LifecycleFlags::UPDATE_TARGET)
    }
}

impl fmt::Debug for LetBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LetBinding")
            .field("expression", &self.expression.to_string())
            .field("property", &self.property)
            .field("to_binding_context", &self.to_binding_context)
            .field("bound", &self.bound.get())
            .finish_non_exhaustive()
    }
}

impl Drop for LetBinding {
    fn drop(&mut self) {
        self.connector.record().clear_all();
    }
}
