//! Map and set observation.
//!
//! Same delivery discipline as [`ArrayObserver`](super::array::ArrayObserver),
//! over insertion-order slots: adding a key appends a created slot,
//! replacing a map value records the old entry as deleted and marks its slot
//! created, deleting removes the slot, clearing records every original slot.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use sinew_core::{KeyedChange, KeyedHook, Map, MapOp, Result, Set, SetOp, Value};

use super::batch::{self, Flush};
use super::index_map::IndexMap;
use super::observer::CollectionObserver;
use super::subscriber::{CollectionSubscriber, SubscriberSet};
use crate::config::ObservationStrategy;
use crate::flags::LifecycleFlags;

/// A keyed native collection an observer can sit on.
pub trait KeyedCollection: 'static {
    /// Whether deleted items are recorded as `[key, value]` pairs.
    const PAIRS: bool;
    const KIND: &'static str;

    fn id(&self) -> u64;
    fn snapshot_len(&self) -> usize;
    fn add_hook(&self, hook: Weak<dyn KeyedHook>);
    fn remove_hook(&self, hook: &Weak<dyn KeyedHook>);
    fn to_value(self: &Rc<Self>) -> Value;
}

impl KeyedCollection for Map {
    const PAIRS: bool = true;
    const KIND: &'static str = "map";

    fn id(&self) -> u64 {
        Map::id(self)
    }
    fn snapshot_len(&self) -> usize {
        Map::snapshot_len(self)
    }
    fn add_hook(&self, hook: Weak<dyn KeyedHook>) {
        Map::add_hook(self, hook);
    }
    fn remove_hook(&self, hook: &Weak<dyn KeyedHook>) {
        Map::remove_hook(self, hook);
    }
    fn to_value(self: &Rc<Self>) -> Value {
        Value::Map(Rc::clone(self))
    }
}

impl KeyedCollection for Set {
    const PAIRS: bool = false;
    const KIND: &'static str = "set";

    fn id(&self) -> u64 {
        Set::id(self)
    }
    fn snapshot_len(&self) -> usize {
        Set::snapshot_len(self)
    }
    fn add_hook(&self, hook: Weak<dyn KeyedHook>) {
        Set::add_hook(self, hook);
    }
    fn remove_hook(&self, hook: &Weak<dyn KeyedHook>) {
        Set::remove_hook(self, hook);
    }
    fn to_value(self: &Rc<Self>) -> Value {
        Value::Set(Rc::clone(self))
    }
}

pub struct KeyedObserver<C: KeyedCollection> {
    me: Weak<Self>,
    collection: Rc<C>,
    intercept: bool,
    index_map: RefCell<IndexMap>,
    queued: Cell<bool>,
    subscribers: SubscriberSet<dyn CollectionSubscriber>,
}

pub type MapObserver = KeyedObserver<Map>;
pub type SetObserver = KeyedObserver<Set>;

impl<C: KeyedCollection> KeyedObserver<C> {
    pub fn new(collection: Rc<C>, strategy: ObservationStrategy) -> Rc<Self> {
        let intercept = strategy.intercepts();
        let len = collection.snapshot_len();
        let observer = Rc::new_cyclic(|me| Self {
            me: me.clone(),
            collection,
            intercept,
            index_map: RefCell::new(IndexMap::identity(len)),
            queued: Cell::new(false),
            subscribers: SubscriberSet::new(),
        });
        if intercept {
            observer
                .collection
                .add_hook(Rc::downgrade(&observer) as Weak<dyn KeyedHook>);
        }
        observer
    }

    #[must_use]
    pub fn target(&self) -> &Rc<C> {
        &self.collection
    }

    fn rebase(&self) {
        if !self.intercept && !self.queued.get() {
            self.index_map
                .borrow_mut()
                .reset(self.collection.snapshot_len());
        }
    }

    fn deliver(&self) -> Result<()> {
        let len = self.collection.snapshot_len();
        let map = std::mem::replace(&mut *self.index_map.borrow_mut(), IndexMap::identity(len));
        if !map.has_changes() {
            return Ok(());
        }
        tracing::trace!(
            message = "keyed.flush",
            kind = C::KIND,
            collection = self.collection.id(),
            len = map.len(),
            deleted = map.deleted_indices.len(),
        );
        self.subscribers
            .notify_each(|s| s.handle_collection_change(&map, LifecycleFlags::empty()))
    }
}

impl KeyedObserver<Map> {
    pub fn set(&self, key: Value, value: Value) -> Result<()> {
        self.rebase();
        self.collection
            .apply(MapOp::Set(key, value), Some(self))
            .map(drop)
    }

    pub fn delete(&self, key: &Value) -> Result<bool> {
        self.rebase();
        Ok(self
            .collection
            .apply(MapOp::Delete(key.clone()), Some(self))?
            .is_truthy())
    }

    pub fn clear(&self) -> Result<()> {
        self.rebase();
        self.collection.apply(MapOp::Clear, Some(self)).map(drop)
    }
}

impl KeyedObserver<Set> {
    pub fn add(&self, value: Value) -> Result<()> {
        self.rebase();
        self.collection
            .apply(SetOp::Add(value), Some(self))
            .map(drop)
    }

    pub fn delete(&self, value: &Value) -> Result<bool> {
        self.rebase();
        Ok(self
            .collection
            .apply(SetOp::Delete(value.clone()), Some(self))?
            .is_truthy())
    }

    pub fn clear(&self) -> Result<()> {
        self.rebase();
        self.collection.apply(SetOp::Clear, Some(self)).map(drop)
    }
}

impl<C: KeyedCollection> KeyedHook for KeyedObserver<C> {
    fn keyed_changed(&self, change: &KeyedChange) -> Result<()> {
        self.index_map
            .borrow_mut()
            .apply_keyed_change(change, C::PAIRS);
        if batch::is_batching() {
            if !self.queued.replace(true)
                && let Some(me) = self.me.upgrade()
            {
                batch::enqueue(me);
            }
            return Ok(());
        }
        self.deliver()
    }
}

impl<C: KeyedCollection> Flush for KeyedObserver<C> {
    fn flush(&self) -> Result<()> {
        self.queued.set(false);
        self.deliver()
    }

    fn discard(&self) {
        self.queued.set(false);
        self.index_map
            .borrow_mut()
            .reset(self.collection.snapshot_len());
    }
}

impl<C: KeyedCollection> CollectionObserver for KeyedObserver<C> {
    fn collection(&self) -> Value {
        self.collection.to_value()
    }

    fn subscribe(&self, subscriber: Weak<dyn CollectionSubscriber>) -> bool {
        self.subscribers.add(subscriber)
    }

    fn unsubscribe(&self, subscriber: &Weak<dyn CollectionSubscriber>) -> bool {
        self.subscribers.remove(subscriber)
    }

    fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl<C: KeyedCollection> Drop for KeyedObserver<C> {
    fn drop(&mut self) {
        if self.intercept {
            let hook: Weak<dyn KeyedHook> = self.me.clone();
            self.collection.remove_hook(&hook);
        }
    }
}

impl<C: KeyedCollection> fmt::Debug for KeyedObserver<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyedObserver")
            .field("kind", &C::KIND)
            .field("collection", &self.collection.id())
            .field("queued", &self.queued.get())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
