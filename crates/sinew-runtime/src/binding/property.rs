//! Property bindings.
//!
//! # Design
//!
//! A [`PropertyBinding`] evaluates its expression under its own
//! [`Connector`], so the observers it depends on are exactly those read by
//! the latest evaluation. When one of them changes the binding re-evaluates
//! and writes the target only if the new value differs from what the target
//! observer currently reports.
//!
//! Target changes (from-view, two-way) arrive through a separate subscriber
//! and are written back with [`Expression::assign`]. A round trip converges
//! because observers do not notify for writes that change nothing.
//!
//! Writes to layout-affecting targets are deferred onto the [`TaskQueue`]
//! except during the initial bind. A deferred write is cancelled on unbind
//! and replaced when the binding is triggered again before the queue flushes.
//!
//! [`TaskQueue`]: crate::queue::TaskQueue
//!
//! # Failure Modes
//!
//! - **Evaluation error**: returned from `bind` (which then leaves the
//!   binding unbound) or from the mutation that triggered the change.
//! - **Non-assignable expression**: the reverse write fails with
//!   [`Error::NotAssignable`] when a target change arrives, not at bind time.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use sinew_core::tracking::untracked;
use sinew_core::{Error, Object, Result, Scope, Value};

use super::{Binding, Services, same_scope};
use crate::expression::Expression;
use crate::flags::{AccessorType, BindingMode, LifecycleFlags};
use crate::queue::TaskHandle;
use crate::reactive::{CollectionSubscriber, Connector, IndexMap, Observer, Subscriber};

/// Fail-fast constructor for [`PropertyBinding`].
#[derive(Default)]
pub struct PropertyBindingBuilder {
    expression: Option<Rc<Expression>>,
    target: Option<Value>,
    target_property: Option<Rc<str>>,
    mode: Option<BindingMode>,
    services: Option<Services>,
}

impl PropertyBindingBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn expression(mut self, expression: impl Into<Rc<Expression>>) -> Self {
        self.expression = Some(expression.into());
        self
    }

    /// The object whose property is written. Anything but an object is
    /// rejected by [`build`](Self::build).
    #[must_use]
    pub fn target(mut self, target: impl Into<Value>) -> Self {
        self.target = Some(target.into());
        self
    }

    #[must_use]
    pub fn target_property(mut self, property: &str) -> Self {
        self.target_property = Some(Rc::from(property));
        self
    }

    /// Defaults to [`BindingMode::TO_VIEW`].
    #[must_use]
    pub fn mode(mut self, mode: BindingMode) -> Self {
        self.mode = Some(mode);
        self
    }

    #[must_use]
    pub fn services(mut self, services: Services) -> Self {
        self.services = Some(services);
        self
    }

    pub fn build(self) -> Result<Rc<PropertyBinding>> {
        let expression = self
            .expression
            .ok_or(Error::MissingParameter { name: "expression" })?;
        let target = match self.target {
            None => return Err(Error::MissingParameter { name: "target" }),
            Some(Value::Object(object)) => object,
            Some(other) => {
                return Err(Error::invalid(
                    "target",
                    format!("expected an object, got {}", other.type_of()),
                ));
            }
        };
        let target_property = self
            .target_property
            .ok_or(Error::MissingParameter {
                name: "target_property",
            })?;
        if target_property.is_empty() {
            return Err(Error::invalid("target_property", "must not be empty"));
        }
        let mode = self.mode.unwrap_or(BindingMode::TO_VIEW);
        if !mode.is_valid() {
            return Err(Error::invalid(
                "mode",
                format!("{mode:?} is not a single binding mode"),
            ));
        }
        let services = self
            .services
            .ok_or(Error::MissingParameter { name: "services" })?;

        Ok(Rc::new_cyclic(|me: &Weak<PropertyBinding>| PropertyBinding {
            connector: Connector::new(Rc::clone(services.locator()), me),
            target_subscriber: Rc::new(TargetSubscriber {
                binding: me.clone(),
            }),
            expression,
            target,
            target_property,
            mode,
            services,
            scope: RefCell::new(None),
            target_observer: RefCell::new(None),
            pending: RefCell::new(None),
            bound: Cell::new(false),
            evaluations: Cell::new(0),
        }))
    }
}

/// Receives target changes on behalf of a binding.
struct TargetSubscriber {
    binding: Weak<PropertyBinding>,
}

impl Subscriber for TargetSubscriber {
    fn handle_change(&self, new_value: &Value, _old: &Value, flags: LifecycleFlags) -> Result<()> {
        match self.binding.upgrade() {
            Some(binding) => binding.update_source(new_value.clone(), flags),
            None => Ok(()),
        }
    }
}

pub struct PropertyBinding {
    expression: Rc<Expression>,
    target: Rc<Object>,
    target_property: Rc<str>,
    mode: BindingMode,
    services: Services,
    connector: Connector,
    target_subscriber: Rc<TargetSubscriber>,
    scope: RefCell<Option<Rc<Scope>>>,
    target_observer: RefCell<Option<Rc<dyn Observer>>>,
    pending: RefCell<Option<TaskHandle>>,
    bound: Cell<bool>,
    evaluations: Cell<u64>,
}

impl PropertyBinding {
    #[must_use]
    pub fn builder() -> PropertyBindingBuilder {
        PropertyBindingBuilder::new()
    }

    #[must_use]
    pub fn expression(&self) -> &Rc<Expression> {
        &self.expression
    }

    #[must_use]
    pub fn target(&self) -> &Rc<Object> {
        &self.target
    }

    #[must_use]
    pub fn target_property(&self) -> &str {
        &self.target_property
    }

    #[must_use]
    pub fn mode(&self) -> BindingMode {
        self.mode
    }

    /// The observer writes go through; `None` while unbound.
    #[must_use]
    pub fn target_observer(&self) -> Option<Rc<dyn Observer>> {
        self.target_observer.borrow().clone()
    }

    /// Number of source observers currently subscribed to.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.connector.record().len()
    }

    /// Re-evaluations triggered by source changes since construction.
    #[must_use]
    pub fn evaluation_count(&self) -> u64 {
        self.evaluations.get()
    }

    /// Whether a deferred target write is waiting for the queue.
    #[must_use]
    pub fn has_pending_write(&self) -> bool {
        self.pending
            .borrow()
            .as_ref()
            .is_some_and(|h| h.status() == crate::queue::TaskStatus::Pending)
    }

    fn current_scope(&self) -> Option<Rc<Scope>> {
        self.scope.borrow().clone()
    }

    fn evaluate(&self, scope: &Rc<Scope>, flags: LifecycleFlags, connect: bool) -> Result<Value> {
        let ctx = self.services.context(flags);
        untracked(|| {
            if !connect {
                return self.expression.evaluate(scope, &ctx);
            }
            let record = self.connector.record();
            record.begin_pass();
            let value = self.expression.evaluate(scope, &ctx.connected(&self.connector));
            record.clear_stale();
            value
        })
    }

    fn cancel_pending(&self) {
        if let Some(handle) = self.pending.borrow_mut().take() {
            handle.cancel();
        }
    }

    fn update_target(&self, value: Value, flags: LifecycleFlags) -> Result<()> {
        let Some(observer) = self.target_observer() else {
            return Ok(());
        };
        self.cancel_pending();
        if observer.accessor_type().contains(AccessorType::LAYOUT)
            && !flags.contains(LifecycleFlags::FROM_BIND)
        {
            tracing::debug!(
                message = "binding.defer",
                target = self.target.id(),
                property = %self.target_property,
            );
            let handle = self.services.queue().queue_task(move || {
                observer.set_value(value, LifecycleFlags::UPDATE_TARGET)
            });
            *self.pending.borrow_mut() = Some(handle);
            return Ok(());
        }
        observer.set_value(value, flags)
    }

    /// Re-evaluate after a dependency change.
    fn refresh(&self, flags: LifecycleFlags) -> Result<()> {
        if !self.bound.get() {
            return Ok(());
        }
        let Some(scope) = self.current_scope() else {
            return Ok(());
        };
        self.evaluations.set(self.evaluations.get() + 1);
        let flags = (flags | LifecycleFlags::UPDATE_TARGET) - LifecycleFlags::FROM_BIND;
        let value = self.evaluate(&scope, flags, true)?;
        let Some(observer) = self.target_observer() else {
            return Ok(());
        };
        if value.same_value(&observer.get_value()) {
            self.cancel_pending();
            return Ok(());
        }
        tracing::trace!(
            message = "binding.update_target",
            target = self.target.id(),
            property = %self.target_property,
        );
        self.update_target(value, flags)
    }

    fn update_source(&self, value: Value, flags: LifecycleFlags) -> Result<()> {
        if !self.bound.get() {
            return Ok(());
        }
        let Some(scope) = self.current_scope() else {
            return Ok(());
        };
        tracing::trace!(
            message = "binding.update_source",
            target = self.target.id(),
            property = %self.target_property,
        );
        let ctx = self
            .services
            .context(flags | LifecycleFlags::UPDATE_SOURCE);
        self.expression.assign(&scope, &ctx, value)
    }

    fn bind_inner(&self, flags: LifecycleFlags, scope: &Rc<Scope>) -> Result<()> {
        let target = Value::Object(Rc::clone(&self.target));
        let observer = self
            .services
            .locator()
            .get_observer(&target, &self.target_property);
        *self.target_observer.borrow_mut() = Some(Rc::clone(&observer));

        let flags = flags | LifecycleFlags::FROM_BIND;
        if self.mode.intersects(BindingMode::ONE_TIME | BindingMode::TO_VIEW) {
            let connect = self.mode.contains(BindingMode::TO_VIEW);
            let value = self.evaluate(scope, flags, connect)?;
            self.update_target(value, flags)?;
        }
        if self.mode.contains(BindingMode::FROM_VIEW) {
            let subscriber: Rc<dyn Subscriber> = self.target_subscriber.clone();
            observer.subscribe(Rc::downgrade(&subscriber));
        }
        Ok(())
    }

    fn release(&self) {
        self.cancel_pending();
        self.connector.record().clear_all();
        if let Some(observer) = self.target_observer.borrow_mut().take() {
            let subscriber: Rc<dyn Subscriber> = self.target_subscriber.clone();
            observer.unsubscribe(&Rc::downgrade(&subscriber));
        }
        self.scope.borrow_mut().take();
    }
}

impl Binding for PropertyBinding {
    fn bind(&self, flags: LifecycleFlags, scope: &Rc<Scope>) -> Result<()> {
        if self.bound.get() {
            if same_scope(&self.scope.borrow(), scope) {
                return Ok(());
            }
            self.unbind(flags);
        }
        *self.scope.borrow_mut() = Some(Rc::clone(scope));
        // Set before the initial push so changes made by it are seen.
        self.bound.set(true);
        if let Err(err) = self.bind_inner(flags, scope) {
            self.bound.set(false);
            self.release();
            return Err(err);
        }
        tracing::debug!(
            message = "binding.bind",
            kind = "property",
            mode = self.mode.name(),
            target = self.target.id(),
            property = %self.target_property,
            dependencies = self.connector.record().len(),
        );
        Ok(())
    }

    fn unbind(&self, _flags: LifecycleFlags) {
        if !self.bound.replace(false) {
            return;
        }
        self.release();
        tracing::debug!(
            message = "binding.unbind",
            kind = "property",
            target = self.target.id(),
            property = %self.target_property,
        );
    }

    fn is_bound(&self) -> bool {
        self.bound.get()
    }
}

impl Subscriber for PropertyBinding {
    fn handle_change(&self, _new: &Value, _old: &Value, flags: LifecycleFlags) -> Result<()> {
        self.refresh(flags)
    }
}

impl CollectionSubscriber for PropertyBinding {
    fn handle_collection_change(&self, _index_map: &IndexMap, flags: LifecycleFlags) -> Result<()> {
        self.refresh(flags)
    }
}

impl fmt::Debug for PropertyBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PropertyBinding")
            .field("expression", &self.expression.to_string())
            .field("target", &self.target.id())
            .field("property", &self.target_property)
            .field("mode", &self.mode.name())
            .field("bound", &self.bound.get())
            .field("dependencies", &self.connector.record().len())
            .finish_non_exhaustive()
    }
}

impl Drop for PropertyBinding {
    fn drop(&mut self) {
        if self.bound.get() {
            self.release();
        }
    }
}
