//! Dependency tracking for evaluation-driven consumers.
//!
//! An [`ObserverRecord`] remembers which observers an evaluation read, each
//! stamped with the version of the pass that last touched it. A consumer
//! calls [`ObserverRecord::begin_pass`] before evaluating, reports every read
//! through [`Connectable`], and calls [`ObserverRecord::clear_stale`]
//! afterwards: observers not touched in that pass are unsubscribed, those
//! touched again are kept without resubscribing.
//!
//! # Invariants
//!
//! 1. After `clear_stale`, the tracked set equals exactly the observers read
//!    in the latest pass.
//! 2. An observer is subscribed at most once per record, however many times
//!    a pass reads it.
//! 3. The steady state (same dependencies every pass) allocates nothing.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use sinew_core::Value;
use smallvec::SmallVec;

use super::locator::ObserverLocator;
use super::observer::{CollectionObserver, Observer};
use super::subscriber::{CollectionSubscriber, Subscriber};
use crate::flags::AccessorType;

/// Capability handed to the evaluator so reads become subscriptions.
pub trait Connectable {
    /// Depend on `target[key]`.
    fn observe(&self, target: &Value, key: &str);

    /// Depend on the structure of a collection.
    fn observe_collection(&self, collection: &Value);
}

#[derive(Clone)]
pub enum Dependency {
    Property(Rc<dyn Observer>),
    Collection(Rc<dyn CollectionObserver>),
}

impl Dependency {
    fn same_as(&self, other: &Dependency) -> bool {
        match (self, other) {
            (Self::Property(a), Self::Property(b)) => std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b)),
            (Self::Collection(a), Self::Collection(b)) => {
                std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
            }
            _ => false,
        }
    }

    /// Whether this dependency is `observer`.
    #[must_use]
    pub fn is_property(&self, observer: &Rc<dyn Observer>) -> bool {
        matches!(self, Self::Property(a) if std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(observer)))
    }
}

impl fmt::Debug for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(o) => write!(f, "Property({:?})", o.accessor_type()),
            Self::Collection(o) => write!(f, "Collection({:?})", o.collection()),
        }
    }
}

struct Slot {
    dependency: Dependency,
    version: u64,
}

/// Version-stamped set of observed dependencies.
pub struct ObserverRecord {
    version: Cell<u64>,
    slots: RefCell<SmallVec<[Slot; 3]>>,
    subscriber: Weak<dyn Subscriber>,
    collection_subscriber: Weak<dyn CollectionSubscriber>,
}

impl ObserverRecord {
    /// A record that subscribes `owner` to whatever it tracks.
    pub fn new<T>(owner: &Weak<T>) -> Self
    where
        T: Subscriber + CollectionSubscriber + 'static,
    {
        Self {
            version: Cell::new(0),
            slots: RefCell::new(SmallVec::new()),
            subscriber: owner.clone(),
            collection_subscriber: owner.clone(),
        }
    }

    #[must_use]
    pub fn version(&self) -> u64 {
        self.version.get()
    }

    /// Start an evaluation pass.
    pub fn begin_pass(&self) {
        self.version.set(self.version.get() + 1);
    }

    /// Stamp `dependency` with the current version, subscribing if new.
    pub fn add(&self, dependency: Dependency) {
        let version = self.version.get();
        {
            let mut slots = self.slots.borrow_mut();
            if let Some(slot) = slots.iter_mut().find(|s| s.dependency.same_as(&dependency)) {
                slot.version = version;
                return;
            }
            slots.push(Slot {
                dependency: dependency.clone(),
                version,
            });
        }
        match &dependency {
            Dependency::Property(o) => {
                o.subscribe(self.subscriber.clone());
            }
            Dependency::Collection(o) => {
                o.subscribe(self.collection_subscriber.clone());
            }
        }
    }

    /// Unsubscribe and drop every dependency not touched in this pass.
    pub fn clear_stale(&self) {
        let version = self.version.get();
        let stale: SmallVec<[Dependency; 3]> = {
            let mut slots = self.slots.borrow_mut();
            let mut stale = SmallVec::new();
            let mut i = 0;
            while i < slots.len() {
                if slots[i].version == version {
                    i += 1;
                } else {
                    stale.push(slots.swap_remove(i).dependency);
                }
            }
            stale
        };
        for dependency in &stale {
            self.release(dependency);
        }
    }

    /// Unsubscribe and drop everything.
    pub fn clear_all(&self) {
        let all: SmallVec<[Slot; 3]> = std::mem::take(&mut *self.slots.borrow_mut());
        for slot in &all {
            self.release(&slot.dependency);
        }
    }

    fn release(&self, dependency: &Dependency) {
        match dependency {
            Dependency::Property(o) => {
                o.unsubscribe(&self.subscriber);
            }
            Dependency::Collection(o) => {
                o.unsubscribe(&self.collection_subscriber);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.borrow().is_empty()
    }

    /// The currently tracked dependencies.
    #[must_use]
    pub fn dependencies(&self) -> Vec<Dependency> {
        self.slots
            .borrow()
            .iter()
            .map(|s| s.dependency.clone())
            .collect()
    }

    /// Whether `observer` is currently tracked.
    #[must_use]
    pub fn tracks(&self, observer: &Rc<dyn Observer>) -> bool {
        self.slots
            .borrow()
            .iter()
            .any(|s| s.dependency.is_property(observer))
    }
}

impl fmt::Debug for ObserverRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRecord")
            .field("version", &self.version.get())
            .field("len", &self.len())
            .finish()
    }
}

/// An [`ObserverRecord`] wired to a locator: the concrete [`Connectable`].
pub struct Connector {
    locator: Rc<ObserverLocator>,
    record: ObserverRecord,
}

impl Connector {
    pub fn new<T>(locator: Rc<ObserverLocator>, owner: &Weak<T>) -> Self
    where
        T: Subscriber + CollectionSubscriber + 'static,
    {
        Self {
            locator,
            record: ObserverRecord::new(owner),
        }
    }

    #[must_use]
    pub fn locator(&self) -> &Rc<ObserverLocator> {
        &self.locator
    }

    #[must_use]
    pub fn record(&self) -> &ObserverRecord {
        &self.record
    }
}

impl Connectable for Connector {
    fn observe(&self, target: &Value, key: &str) {
        let observer = self.locator.get_observer(target, key);
        if observer.accessor_type().contains(AccessorType::PRIMITIVE) {
            return;
        }
        self.record.add(Dependency::Property(observer));
    }

    fn observe_collection(&self, collection: &Value) {
        if let Some(observer) = self.locator.get_collection_observer(collection) {
            self.record.add(Dependency::Collection(observer));
        }
    }
}

impl fmt::Debug for Connector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connector")
            .field("record", &self.record)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LocatorConfig;
    use crate::flags::LifecycleFlags;
    use crate::reactive::index_map::IndexMap;
    use sinew_core::{Object, Result};

    struct Owner {
        changes: Cell<u32>,
        connector: RefCell<Option<Connector>>,
    }

    impl Subscriber for Owner {
        fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) -> Result<()> {
            self.changes.set(self.changes.get() + 1);
            Ok(())
        }
    }

    impl CollectionSubscriber for Owner {
        fn handle_collection_change(&self, _: &IndexMap, _: LifecycleFlags) -> Result<()> {
            self.changes.set(self.changes.get() + 1);
            Ok(())
        }
    }

    fn owner(locator: &Rc<ObserverLocator>) -> Rc<Owner> {
        let owner = Rc::new(Owner {
            changes: Cell::new(0),
            connector: RefCell::new(None),
        });
        let weak = Rc::downgrade(&owner);
        *owner.connector.borrow_mut() = Some(Connector::new(Rc::clone(locator), &weak));
        owner
    }

    #[test]
    fn stale_dependencies_are_dropped() {
        let locator = ObserverLocator::new(LocatorConfig::default());
        let vm = Object::from_entries([("a", 1), ("b", 2), ("c", 3)]);
        let target = Value::from(Rc::clone(&vm));
        let owner = owner(&locator);
        let guard = owner.connector.borrow();
        let connector = guard.as_ref().unwrap();

        connector.record().begin_pass();
        connector.observe(&target, "a");
        connector.observe(&target, "b");
        connector.observe(&target, "b");
        connector.record().clear_stale();
        assert_eq!(connector.record().len(), 2);

        connector.record().begin_pass();
        connector.observe(&target, "a");
        connector.observe(&target, "c");
        connector.record().clear_stale();
        assert_eq!(connector.record().len(), 2);

        let b = locator.get_observer(&target, "b");
        let c = locator.get_observer(&target, "c");
        assert!(!connector.record().tracks(&b));
        assert!(connector.record().tracks(&c));
        assert_eq!(b.subscriber_count(), 0);
        assert_eq!(c.subscriber_count(), 1);
        drop(guard);

        vm.set("b", Value::from(20)).unwrap();
        assert_eq!(owner.changes.get(), 0);
        vm.set("c", Value::from(30)).unwrap();
        assert_eq!(owner.changes.get(), 1);
    }

    #[test]
    fn primitives_are_not_tracked() {
        let locator = ObserverLocator::new(LocatorConfig::default());
        let owner = owner(&locator);
        let guard = owner.connector.borrow();
        let connector = guard.as_ref().unwrap();
        connector.record().begin_pass();
        connector.observe(&Value::from("text"), "length");
        connector.record().clear_stale();
        assert!(connector.record().is_empty());
    }

    #[test]
    fn clear_all_unsubscribes_everything() {
        let locator = ObserverLocator::new(LocatorConfig::default());
        let vm = Object::from_entries([("items", Value::from(sinew_core::Array::new()))]);
        let owner = owner(&locator);
        let guard = owner.connector.borrow();
        let connector = guard.as_ref().unwrap();
        connector.record().begin_pass();
        connector.observe(&Value::from(Rc::clone(&vm)), "items");
        connector.observe_collection(&vm.get("items"));
        assert_eq!(connector.record().len(), 2);
        connector.record().clear_all();
        assert!(connector.record().is_empty());
    }
}
