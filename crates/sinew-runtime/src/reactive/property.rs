//! Property observers: data properties and primitives.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use sinew_core::tracking::untracked;
use sinew_core::{Error, Object, PropertyHook, Result, Value};

use super::batch::{self, Flush};
use super::observer::Observer;
use super::subscriber::{Subscriber, SubscriberSet};
use crate::config::ObservationStrategy;
use crate::flags::{AccessorType, LifecycleFlags};

/// Subscriber list plus batch coalescing for a single property.
///
/// Inside a batch, the first old value is remembered and one notification
/// with the final value is delivered when the batch ends, or none at all if
/// the property ended where it started.
#[derive(Default)]
pub(crate) struct PropertyNotifier {
    pub(crate) subscribers: SubscriberSet<dyn Subscriber>,
    pending_old: RefCell<Option<Value>>,
    queued: Cell<bool>,
}

impl PropertyNotifier {
    pub(crate) fn notify(
        &self,
        owner: impl FnOnce() -> Option<Rc<dyn Flush>>,
        new_value: &Value,
        old_value: &Value,
        flags: LifecycleFlags,
    ) -> Result<()> {
        if self.subscribers.is_empty() {
            return Ok(());
        }
        if batch::is_batching() {
            self.pending_old
                .borrow_mut()
                .get_or_insert_with(|| old_value.clone());
            if !self.queued.get()
                && let Some(owner) = owner()
            {
                self.queued.set(true);
                batch::enqueue(owner);
            }
            return Ok(());
        }
        self.subscribers
            .notify_each(|s| s.handle_change(new_value, old_value, flags))
    }

    pub(crate) fn flush(&self, current: &Value) -> Result<()> {
        self.queued.set(false);
        let Some(old) = self.pending_old.borrow_mut().take() else {
            return Ok(());
        };
        if old.same_value(current) {
            return Ok(());
        }
        self.subscribers
            .notify_each(|s| s.handle_change(current, &old, LifecycleFlags::empty()))
    }

    pub(crate) fn discard(&self) {
        self.queued.set(false);
        self.pending_old.borrow_mut().take();
    }
}

// ── SetterObserver ───────────────────────────────────────────────────

/// Observer for a plain data property.
///
/// Under [`ObservationStrategy::Intercept`] it installs a write hook on the
/// object, so every [`Object::set`] that changes the value is seen. Under
/// [`ObservationStrategy::Explicit`] only writes made through
/// [`Observer::set_value`] notify.
pub struct SetterObserver {
    me: Weak<Self>,
    object: Rc<Object>,
    key: Rc<str>,
    intercept: bool,
    accessor: AccessorType,
    notifier: PropertyNotifier,
}

impl SetterObserver {
    pub fn new(
        object: Rc<Object>,
        key: &str,
        strategy: ObservationStrategy,
        accessor: AccessorType,
    ) -> Rc<Self> {
        let intercept = strategy.intercepts();
        let observer = Rc::new_cyclic(|me| Self {
            me: me.clone(),
            object,
            key: Rc::from(key),
            intercept,
            accessor: accessor | AccessorType::OBSERVER,
            notifier: PropertyNotifier::default(),
        });
        if intercept {
            observer
                .object
                .add_hook(key, Rc::downgrade(&observer) as Weak<dyn PropertyHook>);
        }
        observer
    }

    #[must_use]
    pub fn object(&self) -> &Rc<Object> {
        &self.object
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    fn notify(&self, new_value: &Value, old_value: &Value, flags: LifecycleFlags) -> Result<()> {
        self.notifier.notify(
            || self.me.upgrade().map(|me| me as Rc<dyn Flush>),
            new_value,
            old_value,
            flags,
        )
    }
}

impl Observer for SetterObserver {
    fn get_value(&self) -> Value {
        untracked(|| self.object.get(&self.key))
    }

    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<()> {
        if self.intercept {
            return self.object.set(&self.key, value);
        }
        let old = self.get_value();
        self.object.set(&self.key, value.clone())?;
        if old.same_value(&value) {
            return Ok(());
        }
        self.notify(&value, &old, flags)
    }

    fn subscribe(&self, subscriber: Weak<dyn Subscriber>) -> bool {
        self.notifier.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Weak<dyn Subscriber>) -> bool {
        self.notifier.subscribers.remove(subscriber)
    }

    fn subscriber_count(&self) -> usize {
        self.notifier.subscribers.len()
    }

    fn accessor_type(&self) -> AccessorType {
        self.accessor
    }
}

impl PropertyHook for SetterObserver {
    fn property_changed(&self, new_value: &Value, old_value: &Value) -> Result<()> {
        tracing::trace!(
            message = "setter.change",
            object = self.object.id(),
            key = %self.key,
        );
        self.notify(new_value, old_value, LifecycleFlags::empty())
    }
}

impl Flush for SetterObserver {
    fn flush(&self) -> Result<()> {
        self.notifier.flush(&self.get_value())
    }

    fn discard(&self) {
        self.notifier.discard();
    }
}

impl Drop for SetterObserver {
    fn drop(&mut self) {
        if self.intercept {
            let hook: Weak<dyn PropertyHook> = self.me.clone();
            self.object.remove_hook(&self.key, &hook);
        }
    }
}

impl fmt::Debug for SetterObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetterObserver")
            .field("object", &self.object.id())
            .field("key", &self.key)
            .field("intercept", &self.intercept)
            .field("subscribers", &self.notifier.subscribers.len())
            .finish()
    }
}

// ── PrimitiveObserver ────────────────────────────────────────────────

/// Observer for a key read off a value that cannot change underneath it
/// (a string's `length`, a missing property of a primitive). Never notifies.
pub struct PrimitiveObserver {
    target: Value,
    key: Rc<str>,
}

impl PrimitiveObserver {
    pub fn new(target: Value, key: &str) -> Rc<Self> {
        Rc::new(Self {
            target,
            key: Rc::from(key),
        })
    }
}

impl Observer for PrimitiveObserver {
    fn get_value(&self) -> Value {
        match (&self.target, &*self.key) {
            (Value::String(s), "length") => Value::from(s.encode_utf16().count()),
            (Value::Array(a), key) => key
                .parse::<usize>()
                .ok()
                .and_then(|i| a.snapshot().get(i).cloned())
                .unwrap_or_default(),
            _ => Value::Undefined,
        }
    }

    fn set_value(&self, _value: Value, _flags: LifecycleFlags) -> Result<()> {
        Err(Error::read_only(&*self.key))
    }

    fn subscribe(&self, _subscriber: Weak<dyn Subscriber>) -> bool {
        false
    }

    fn unsubscribe(&self, _subscriber: &Weak<dyn Subscriber>) -> bool {
        false
    }

    fn subscriber_count(&self) -> usize {
        0
    }

    fn accessor_type(&self) -> AccessorType {
        AccessorType::PRIMITIVE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Log(RefCell<Vec<(Value, Value)>>);

    impl Subscriber for Log {
        fn handle_change(&self, new: &Value, old: &Value, _: LifecycleFlags) -> Result<()> {
            self.0.borrow_mut().push((new.clone(), old.clone()));
            Ok(())
        }
    }

    fn subscribed(observer: &Rc<SetterObserver>) -> Rc<Log> {
        let log = Rc::new(Log::default());
        observer.subscribe(Rc::downgrade(&log) as Weak<dyn Subscriber>);
        log
    }

    #[test]
    fn intercepts_direct_writes() {
        let obj = Object::from_entries([("name", "a")]);
        let observer = SetterObserver::new(
            Rc::clone(&obj),
            "name",
            ObservationStrategy::Intercept,
            AccessorType::empty(),
        );
        let log = subscribed(&observer);
        obj.set("name", Value::from("b")).unwrap();
        obj.set("name", Value::from("b")).unwrap();
        assert_eq!(*log.0.borrow(), vec![(Value::from("b"), Value::from("a"))]);
    }

    #[test]
    fn explicit_strategy_only_sees_routed_writes() {
        let obj = Object::from_entries([("n", 1)]);
        let observer = SetterObserver::new(
            Rc::clone(&obj),
            "n",
            ObservationStrategy::Explicit,
            AccessorType::empty(),
        );
        let log = subscribed(&observer);
        obj.set("n", Value::from(2)).unwrap();
        assert!(log.0.borrow().is_empty());
        observer.set_value(Value::from(3), LifecycleFlags::empty()).unwrap();
        assert_eq!(*log.0.borrow(), vec![(Value::from(3), Value::from(2))]);
        assert_eq!(obj.hook_count("n"), 0);
    }

    #[test]
    fn batch_coalesces_to_one_notification() {
        let obj = Object::from_entries([("n", 1)]);
        let observer = SetterObserver::new(
            Rc::clone(&obj),
            "n",
            ObservationStrategy::Intercept,
            AccessorType::empty(),
        );
        let log = subscribed(&observer);
        batch::batch(|| {
            obj.set("n", Value::from(2)).unwrap();
            obj.set("n", Value::from(3)).unwrap();
        })
        .unwrap();
        assert_eq!(*log.0.borrow(), vec![(Value::from(3), Value::from(1))]);

        batch::batch(|| {
            obj.set("n", Value::from(4)).unwrap();
            obj.set("n", Value::from(3)).unwrap();
        })
        .unwrap();
        assert_eq!(log.0.borrow().len(), 1);
    }

    #[test]
    fn dropping_observer_removes_hook() {
        let obj = Object::from_entries([("n", 1)]);
        let observer = SetterObserver::new(
            Rc::clone(&obj),
            "n",
            ObservationStrategy::Intercept,
            AccessorType::empty(),
        );
        assert_eq!(obj.hook_count("n"), 1);
        drop(observer);
        assert_eq!(obj.hook_count("n"), 0);
    }

    #[test]
    fn primitive_observer_reads_string_length() {
        let observer = PrimitiveObserver::new(Value::from("héllo"), "length");
        assert_eq!(observer.get_value(), Value::from(5));
        assert!(observer.set_value(Value::from(1), LifecycleFlags::empty()).is_err());
        assert_eq!(observer.accessor_type(), AccessorType::PRIMITIVE);
    }
}
