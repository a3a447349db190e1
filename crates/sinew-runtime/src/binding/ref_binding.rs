//! `ref` bindings: expose a host element to the view model.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use sinew_core::{Object, Result, Scope, Value};

use super::{Binding, Services, same_scope};
use crate::expression::Expression;
use crate::flags::LifecycleFlags;

/// Assigns `target` into `expression` while bound.
pub struct RefBinding {
    expression: Rc<Expression>,
    target: Rc<Object>,
    services: Services,
    scope: RefCell<Option<Rc<Scope>>>,
    bound: Cell<bool>,
}

impl RefBinding {
    pub fn new(expression: impl Into<Rc<Expression>>, target: Rc<Object>, services: Services) -> Rc<Self> {
        Rc::new(Self {
            expression: expression.into(),
            target,
            services,
            scope: RefCell::new(None),
            bound: Cell::new(false),
        })
    }

    fn target_value(&self) -> Value {
        Value::Object(Rc::clone(&self.target))
    }
}

impl Binding for RefBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Rc<Scope>) -> Result<()> {
        if self.bound.get() {
            if same_scope(&self.scope.borrow(), scope) {
                return Ok(());
            }
            self.unbind(flags);
        }
        let ctx = self.services.context(flags | LifecycleFlags::FROM_BIND);
        self.expression.assign(scope, &ctx, self.target_value())?;
        *self.scope.borrow_mut() = Some(Rc::clone(scope));
        self.bound.set(true);
        tracing::debug!(
            message = "binding.bind",
            kind = "ref",
            target = self.target.id(),
        );
        Ok(())
    }

    fn unbind(&self, flags: LifecycleFlags) {
        if !self.bound.replace(false) {
            return;
        }
        let Some(scope) = self.scope.borrow_mut().take() else {
            return;
        };
        let ctx = self.services.context(flags | LifecycleFlags::FROM_UNBIND);
        // Leave the slot alone if something else has been assigned since.
        let still_ours = self
            .expression
            .evaluate(&scope, &ctx)
            .is_ok_and(|current| current.same_value(&self.target_value()));
        if still_ours {
            if let Err(err) = self.expression.assign(&scope, &ctx, Value::Null) {
                tracing::warn!(message = "binding.unbind_error", kind = "ref", error = %err);
            }
        }
        tracing::debug!(
            message = "binding.unbind",
            kind = "ref",
            target = self.target.id(),
        );
    }

    fn is_bound(&self) -> bool {
        self.bound.get()
    }
}

impl fmt::Debug for RefBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RefBinding")
            .field("expression", &self.expression.to_string())
            .field("target", &self.target.id())
            .field("bound", &self.bound.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assigns_and_clears_element() {
        let vm = Object::new();
        let input = Object::element("input");
        let binding = RefBinding::new(Expression::scope("field"), Rc::clone(&input), Services::default());
        binding
            .bind(LifecycleFlags::empty(), &Scope::create(Rc::clone(&vm)))
            .unwrap();
        assert_eq!(vm.peek("field"), Value::from(Rc::clone(&input)));

        binding.unbind(LifecycleFlags::empty());
        assert_eq!(vm.peek("field"), Value::Null);
    }

    #[test]
    fn unbind_keeps_foreign_value() {
        let vm = Object::new();
        let binding = RefBinding::new(
            Expression::scope("field"),
            Object::element("input"),
            Services::default(),
        );
        binding
            .bind(LifecycleFlags::empty(), &Scope::create(Rc::clone(&vm)))
            .unwrap();
        vm.set("field", Value::from("replaced")).unwrap();
        binding.unbind(LifecycleFlags::empty());
        assert_eq!(vm.peek("field"), Value::from("replaced"));
    }

    #[test]
    fn non_assignable_expression_fails_bind() {
        let binding = RefBinding::new(Expression::literal(1), Object::element("div"), Services::default());
        let result = binding.bind(LifecycleFlags::empty(), &Scope::create(Object::new()));
        assert!(result.is_err());
        assert!(!binding.is_bound());
    }
}
