//! Event listener bindings.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use sinew_core::{EventListener, Object, Result, Scope, Value};

use super::{Binding, Services, same_scope};
use crate::expression::Expression;
use crate::flags::LifecycleFlags;

/// Runs an expression whenever `target` dispatches `event`.
///
/// The event value is visible to the expression as `$event`. An expression
/// that evaluates to `false` marks an object event `defaultPrevented`.
pub struct ListenerBinding {
    me: Weak<Self>,
    expression: Rc<Expression>,
    target: Rc<Object>,
    event: Rc<str>,
    services: Services,
    scope: RefCell<Option<Rc<Scope>>>,
    bound: Cell<bool>,
}

impl ListenerBinding {
    pub fn new(
        expression: impl Into<Rc<Expression>>,
        target: Rc<Object>,
        event: &str,
        services: Services,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me| Self {
            me: me.clone(),
            expression: expression.into(),
            target,
            event: Rc::from(event),
            services,
            scope: RefCell::new(None),
            bound: Cell::new(false),
        })
    }

    #[must_use]
    pub fn event(&self) -> &str {
        &self.event
    }

    #[must_use]
    pub fn target(&self) -> &Rc<Object> {
        &self.target
    }

    fn as_listener(&self) -> Weak<dyn EventListener> {
        self.me.clone()
    }
}

impl EventListener for ListenerBinding {
    fn handle_event(&self, event: &Value) -> Result<()> {
        let Some(scope) = self.scope.borrow().clone() else {
            return Ok(());
        };
        let overrides = Object::from_entries([("$event", event.clone())]);
        let local = Scope::new(
            Some(&scope),
            Rc::clone(scope.binding_context()),
            overrides,
            false,
        );
        let result = self
            .expression
            .evaluate(&local, &self.services.context(LifecycleFlags::empty()))?;
        if let (Value::Bool(false), Value::Object(event)) = (&result, event) {
            event.set("defaultPrevented", Value::Bool(true))?;
        }
        Ok(())
    }
}

impl Binding for ListenerBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Rc<Scope>) -> Result<()> {
        if self.bound.get() {
            if same_scope(&self.scope.borrow(), scope) {
                return Ok(());
            }
            self.unbind(flags);
        }
        *self.scope.borrow_mut() = Some(Rc::clone(scope));
        self.target.add_event_listener(&self.event, self.as_listener());
        self.bound.set(true);
        tracing::debug!(
            message = "binding.bind",
            kind = "listener",
            target = self.target.id(),
            event = %self.event,
        );
        Ok(())
    }

    fn unbind(&self, _flags: LifecycleFlags) {
        if !self.bound.replace(false) {
            return;
        }
        self.target
            .remove_event_listener(&self.event, &self.as_listener());
        self.scope.borrow_mut().take();
        tracing::debug!(
            message = "binding.unbind",
            kind = "listener",
            target = self.target.id(),
            event = %self.event,
        );
    }

    fn is_bound(&self) -> bool {
        self.bound.get()
    }
}

impl fmt::Debug for ListenerBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerBinding")
            .field("expression", &self.expression.to_string())
            .field("target", &self.target.id())
            .field("event", &self.event)
            .field("bound", &self.bound.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sinew_core::Function;

    fn counter_vm() -> Rc<Object> {
        let vm = Object::from_entries([("clicks", 0)]);
        let inc = Function::new("increment", |this, args| {
            let vm = this.as_object().cloned().unwrap_or_else(Object::new);
            let by = args.first().map_or(1.0, Value::to_number);
            vm.set("clicks", Value::from(vm.peek("clicks").to_number() + by))?;
            Ok(Value::Undefined)
        });
        vm.set("increment", Value::from(inc)).unwrap();
        vm
    }

    #[test]
    fn dispatch_runs_expression_with_event() {
        let vm = counter_vm();
        let button = Object::element("button");
        let expr = Expression::call_scope(
            "increment",
            vec![Expression::scope("$event").member("detail")],
        );
        let binding = ListenerBinding::new(expr, Rc::clone(&button), "click", Services::default());
        binding
            .bind(LifecycleFlags::empty(), &Scope::create(Rc::clone(&vm)))
            .unwrap();
        assert_eq!(button.listener_count("click"), 1);

        let event = Object::from_entries([("detail", 5)]);
        button.dispatch_event("click", &Value::from(event)).unwrap();
        assert_eq!(vm.peek("clicks"), Value::from(5));
        assert!(!vm.has("$event"));

        binding.unbind(LifecycleFlags::empty());
        assert_eq!(button.listener_count("click"), 0);
        button
            .dispatch_event("click", &Value::from(Object::from_entries([("detail", 1)])))
            .unwrap();
        assert_eq!(vm.peek("clicks"), Value::from(5));
    }

    #[test]
    fn false_result_prevents_default() {
        let link = Object::element("a");
        let binding = ListenerBinding::new(
            Expression::literal(false),
            Rc::clone(&link),
            "click",
            Services::default(),
        );
        binding
            .bind(LifecycleFlags::empty(), &Scope::create(Object::new()))
            .unwrap();
        let event = Object::new();
        link.dispatch_event("click", &Value::from(Rc::clone(&event)))
            .unwrap();
        assert_eq!(event.peek("defaultPrevented"), Value::Bool(true));
    }

    #[test]
    fn dropped_binding_stops_listening() {
        let button = Object::element("button");
        let binding = ListenerBinding::new(
            Expression::literal(1),
            Rc::clone(&button),
            "click",
            Services::default(),
        );
        binding
            .bind(LifecycleFlags::empty(), &Scope::create(Object::new()))
            .unwrap();
        drop(binding);
        assert_eq!(button.listener_count("click"), 0);
    }
}
