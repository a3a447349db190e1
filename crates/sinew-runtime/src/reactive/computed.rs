//! Observers for accessor properties.
//!
//! # Design
//!
//! A [`ComputedObserver`] wraps the getter of an accessor property. While it
//! has subscribers, the getter runs under the observer's own read tracker so
//! every property and collection it touches becomes a dependency in its
//! [`ObserverRecord`](super::connectable::ObserverRecord). A dependency change
//! marks the cached value dirty, recomputes it, and notifies subscribers if
//! the result differs under SameValue.
//!
//! With no subscribers the observer tracks nothing and `get_value` simply
//! calls the getter.
//!
//! # Invariants
//!
//! 1. While subscribed, the dependency set equals the reads of the latest
//!    getter run.
//! 2. The last unsubscribe releases every dependency.
//! 3. `version` increments by exactly 1 per tracked recomputation.
//!
//! # Failure Modes
//!
//! - **Getter reads its own key**: recursion is not detected; the getter
//!   must not read the property it defines.
//! - **No setter**: `set_value` fails with `ReadOnlyProperty`.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use sinew_core::tracking::{ReadTracker, untracked, with_tracker};
use sinew_core::{Error, Getter, Object, Result, Setter, Value};

use super::batch::Flush;
use super::connectable::{Connectable, Connector};
use super::index_map::IndexMap;
use super::locator::ObserverLocator;
use super::observer::Observer;
use super::property::PropertyNotifier;
use super::subscriber::{CollectionSubscriber, Subscriber};
use crate::flags::{AccessorType, LifecycleFlags};

pub struct ComputedObserver {
    me: Weak<Self>,
    object: Rc<Object>,
    key: Rc<str>,
    getter: Getter,
    setter: Option<Setter>,
    connector: Connector,
    cached: RefCell<Value>,
    dirty: Cell<bool>,
    running: Cell<bool>,
    version: Cell<u64>,
    notifier: PropertyNotifier,
}

impl ComputedObserver {
    pub fn new(
        locator: Rc<ObserverLocator>,
        object: Rc<Object>,
        key: &str,
        getter: Getter,
        setter: Option<Setter>,
    ) -> Rc<Self> {
        Rc::new_cyclic(|me: &Weak<Self>| Self {
            me: me.clone(),
            object,
            key: Rc::from(key),
            getter,
            setter,
            connector: Connector::new(locator, me),
            cached: RefCell::new(Value::Undefined),
            dirty: Cell::new(true),
            running: Cell::new(false),
            version: Cell::new(0),
            notifier: PropertyNotifier::default(),
        })
    }

    #[must_use]
    pub fn object(&self) -> &Rc<Object> {
        &self.object
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Number of tracked recomputations so far.
    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.get()
    }

    /// Number of dependencies the latest tracked run read.
    #[must_use]
    pub fn dependency_count(&self) -> usize {
        self.connector.record().len()
    }

    fn run_getter(&self) -> Value {
        (self.getter)(&self.object)
    }

    /// Run the getter under this observer's tracker and cache the result.
    fn compute(&self) -> Value {
        let Some(me) = self.me.upgrade() else {
            return untracked(|| self.run_getter());
        };
        self.running.set(true);
        let record = self.connector.record();
        record.begin_pass();
        let value = with_tracker(me as Rc<dyn ReadTracker>, || self.run_getter());
        record.clear_stale();
        self.running.set(false);
        self.version.set(self.version.get() + 1);
        self.dirty.set(false);
        *self.cached.borrow_mut() = value.clone();
        value
    }

    fn refresh(&self, flags: LifecycleFlags) -> Result<()> {
        self.dirty.set(true);
        if self.running.get() || self.notifier.subscribers.is_empty() {
            return Ok(());
        }
        let old = self.cached.borrow().clone();
        let new = self.compute();
        if old.same_value(&new) {
            return Ok(());
        }
        tracing::trace!(
            message = "computed.change",
            object = self.object.id(),
            key = %self.key,
            version = self.version.get(),
        );
        self.notifier.notify(
            || self.me.upgrade().map(|me| me as Rc<dyn Flush>),
            &new,
            &old,
            flags,
        )
    }
}

impl Observer for ComputedObserver {
    fn get_value(&self) -> Value {
        if self.notifier.subscribers.is_empty() {
            return untracked(|| self.run_getter());
        }
        if self.dirty.get() && !self.running.get() {
            return untracked(|| self.compute());
        }
        self.cached.borrow().clone()
    }

    fn set_value(&self, value: Value, _flags: LifecycleFlags) -> Result<()> {
        match &self.setter {
            Some(setter) => setter(&self.object, value),
            None => Err(Error::read_only(&*self.key)),
        }
    }

    fn subscribe(&self, subscriber: Weak<dyn Subscriber>) -> bool {
        let added = self.notifier.subscribers.add(subscriber);
        if added && self.notifier.subscribers.len() == 1 {
            untracked(|| self.compute());
        }
        added
    }

    fn unsubscribe(&self, subscriber: &Weak<dyn Subscriber>) -> bool {
        let removed = self.notifier.subscribers.remove(subscriber);
        if removed && self.notifier.subscribers.is_empty() {
            self.connector.record().clear_all();
            self.dirty.set(true);
        }
        removed
    }

    fn subscriber_count(&self) -> usize {
        self.notifier.subscribers.len()
    }

    fn accessor_type(&self) -> AccessorType {
        AccessorType::OBSERVER
    }
}

impl ReadTracker for ComputedObserver {
    fn track_property(&self, object: &Rc<Object>, key: &str) {
        self.connector.observe(&Value::Object(Rc::clone(object)), key);
    }

    fn track_collection(&self, collection: &Value) {
        self.connector.observe_collection(collection);
    }
}

impl Subscriber for ComputedObserver {
    fn handle_change(&self, _new: &Value, _old: &Value, flags: LifecycleFlags) -> Result<()> {
        self.refresh(flags)
    }
}

impl CollectionSubscriber for ComputedObserver {
    fn handle_collection_change(&self, _index_map: &IndexMap, flags: LifecycleFlags) -> Result<()> {
        self.refresh(flags)
    }
}

impl Flush for ComputedObserver {
    fn flush(&self) -> Result<()> {
        let current = self.cached.borrow().clone();
        self.notifier.flush(&current)
    }

    fn discard(&self) {
        self.notifier.discard();
    }
}

impl Drop for ComputedObserver {
    fn drop(&mut self) {
        self.connector.record().clear_all();
    }
}

impl fmt::Debug for ComputedObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedObserver")
            .field("object", &self.object.id())
            .field("key", &self.key)
            .field("dirty", &self.dirty.get())
            .field("version", &self.version.get())
            .field("dependencies", &self.connector.record().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocatorConfig;
    use crate::reactive::batch;
    use sinew_core::Array;

    #[derive(Default)]
    struct Log(RefCell<Vec<(Value, Value)>>);

    impl Subscriber for Log {
        fn handle_change(&self, new: &Value, old: &Value, _: LifecycleFlags) -> Result<()> {
            self.0.borrow_mut().push((new.clone(), old.clone()));
            Ok(())
        }
    }

    fn person() -> Rc<Object> {
        let obj = Object::from_entries([("first", "Ada"), ("last", "Lovelace")]);
        obj.define_getter("full", |o| {
            Value::from(format!(
                "{} {}",
                o.get("first").to_js_string(),
                o.get("last").to_js_string()
            ))
        });
        obj
    }

    fn computed(obj: &Rc<Object>, key: &str) -> (Rc<ObserverLocator>, Rc<dyn Observer>) {
        let locator = ObserverLocator::new(LocatorConfig::default());
        let observer = locator.get_observer(&Value::Object(Rc::clone(obj)), key);
        (locator, observer)
    }

    #[test]
    fn recomputes_when_dependency_changes() {
        let obj = person();
        let (_locator, observer) = computed(&obj, "full");
        let log = Rc::new(Log::default());
        observer.subscribe(Rc::downgrade(&log) as Weak<dyn Subscriber>);

        obj.set("first", Value::from("Grace")).unwrap();
        assert_eq!(
            *log.0.borrow(),
            vec![(Value::from("Grace Lovelace"), Value::from("Ada Lovelace"))]
        );
        assert_eq!(observer.get_value(), Value::from("Grace Lovelace"));
    }

    #[test]
    fn unchanged_result_is_not_notified() {
        let obj = Object::from_entries([("n", 3)]);
        obj.define_getter("positive", |o| Value::Bool(o.get("n").to_number() > 0.0));
        let (_locator, observer) = computed(&obj, "positive");
        let log = Rc::new(Log::default());
        observer.subscribe(Rc::downgrade(&log) as Weak<dyn Subscriber>);

        obj.set("n", Value::from(5)).unwrap();
        assert!(log.0.borrow().is_empty());
        obj.set("n", Value::from(-1)).unwrap();
        assert_eq!(log.0.borrow().len(), 1);
    }

    #[test]
    fn conditional_dependencies_converge() {
        let obj = Object::from_entries([
            ("flag", Value::Bool(true)),
            ("b", Value::from(1)),
            ("c", Value::from(2)),
        ]);
        obj.define_getter("pick", |o| {
            if o.get("flag").is_truthy() {
                o.get("b")
            } else {
                o.get("c")
            }
        });
        let locator = ObserverLocator::new(LocatorConfig::default());
        let target = Value::Object(Rc::clone(&obj));
        let observer = locator.get_observer(&target, "pick");
        let log = Rc::new(Log::default());
        observer.subscribe(Rc::downgrade(&log) as Weak<dyn Subscriber>);

        let b = locator.get_observer(&target, "b");
        let c = locator.get_observer(&target, "c");
        assert_eq!((b.subscriber_count(), c.subscriber_count()), (1, 0));
        obj.set("flag", Value::Bool(false)).unwrap();
        assert_eq!((b.subscriber_count(), c.subscriber_count()), (0, 1));
    }

    #[test]
    fn tracks_collection_reads() {
        let items = Array::from_values([Value::from(1), Value::from(2)]);
        let obj = Object::from_entries([("items", Value::Array(Rc::clone(&items)))]);
        obj.define_getter("total", |o| {
            let Value::Array(items) = o.get("items") else {
                return Value::from(0);
            };
            Value::from(items.to_vec().iter().map(Value::to_number).sum::<f64>())
        });
        let (_locator, observer) = computed(&obj, "total");
        let log = Rc::new(Log::default());
        observer.subscribe(Rc::downgrade(&log) as Weak<dyn Subscriber>);

        items.push([Value::from(3)]).unwrap();
        assert_eq!(*log.0.borrow(), vec![(Value::from(6), Value::from(3))]);
    }

    #[test]
    fn batch_delivers_final_value_once() {
        let obj = person();
        let (_locator, observer) = computed(&obj, "full");
        let log = Rc::new(Log::default());
        observer.subscribe(Rc::downgrade(&log) as Weak<dyn Subscriber>);

        batch::batch(|| {
            obj.set("first", Value::from("Grace")).unwrap();
            obj.set("last", Value::from("Hopper")).unwrap();
        })
        .unwrap();
        assert_eq!(
            *log.0.borrow(),
            vec![(Value::from("Grace Hopper"), Value::from("Ada Lovelace"))]
        );
    }

    #[test]
    fn last_unsubscribe_releases_dependencies() {
        let obj = person();
        let locator = ObserverLocator::new(LocatorConfig::default());
        let target = Value::Object(Rc::clone(&obj));
        let observer = locator.get_observer(&target, "full");
        let log = Rc::new(Log::default());
        let weak = Rc::downgrade(&log) as Weak<dyn Subscriber>;
        observer.subscribe(weak.clone());
        let first = locator.get_observer(&target, "first");
        assert_eq!(first.subscriber_count(), 1);
        observer.unsubscribe(&weak);
        assert_eq!(first.subscriber_count(), 0);
    }

    #[test]
    fn setter_and_read_only() {
        let obj = Object::from_entries([("celsius", 0)]);
        obj.define_accessor(
            "fahrenheit",
            Rc::new(|o: &Rc<Object>| Value::from(o.get("celsius").to_number() * 9.0 / 5.0 + 32.0)),
            Some(Rc::new(|o: &Rc<Object>, v: Value| {
                o.set("celsius", Value::from((v.to_number() - 32.0) * 5.0 / 9.0))
            })),
        );
        obj.define_getter("label", |_| Value::from("temp"));
        let (locator, observer) = computed(&obj, "fahrenheit");
        observer
            .set_value(Value::from(212), LifecycleFlags::empty())
            .unwrap();
        assert_eq!(obj.peek("celsius"), Value::from(100));

        let label = locator.get_observer(&Value::Object(obj), "label");
        assert_eq!(
            label.set_value(Value::from("x"), LifecycleFlags::empty()),
            Err(Error::read_only("label"))
        );
    }
}
