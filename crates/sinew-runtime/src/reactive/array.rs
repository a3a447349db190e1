//! Array observation.
//!
//! An [`ArrayObserver`] keeps a cumulative [`IndexMap`] for its array. Every
//! structural change it hears about is folded into that map; outside a batch
//! the map is delivered and reset immediately, inside a batch it is delivered
//! once when the outermost batch ends. A net no-op (push then pop) delivers
//! nothing.
//!
//! The observer also exposes the array's mutating operations as methods.
//! Calling them is equivalent to mutating the array directly under the
//! intercepting strategy, and is the only way to be observed under the
//! explicit one.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use sinew_core::{Array, ArrayChange, ArrayHook, ArrayOp, Comparator, Result, Value};

use super::batch::{self, Flush};
use super::index_map::IndexMap;
use super::observer::CollectionObserver;
use super::subscriber::{CollectionSubscriber, SubscriberSet};
use crate::config::ObservationStrategy;
use crate::flags::LifecycleFlags;

pub struct ArrayObserver {
    me: Weak<Self>,
    array: Rc<Array>,
    intercept: bool,
    index_map: RefCell<IndexMap>,
    queued: Cell<bool>,
    subscribers: SubscriberSet<dyn CollectionSubscriber>,
}

impl ArrayObserver {
    pub fn new(array: Rc<Array>, strategy: ObservationStrategy) -> Rc<Self> {
        let intercept = strategy.intercepts();
        let len = array.snapshot_len();
        let observer = Rc::new_cyclic(|me| Self {
            me: me.clone(),
            array,
            intercept,
            index_map: RefCell::new(IndexMap::identity(len)),
            queued: Cell::new(false),
            subscribers: SubscriberSet::new(),
        });
        if intercept {
            observer
                .array
                .add_hook(Rc::downgrade(&observer) as Weak<dyn ArrayHook>);
        }
        observer
    }

    #[must_use]
    pub fn array(&self) -> &Rc<Array> {
        &self.array
    }

    /// The changes recorded since the last delivery.
    #[must_use]
    pub fn pending_index_map(&self) -> IndexMap {
        self.index_map.borrow().clone()
    }

    fn apply(&self, op: ArrayOp) -> Result<Value> {
        if !self.intercept && !self.queued.get() {
            // Direct mutations are invisible without hooks; rebase on the
            // current contents before recording this one.
            self.index_map.borrow_mut().reset(self.array.snapshot_len());
        }
        self.array.apply(op, Some(self))
    }

    fn deliver(&self) -> Result<()> {
        let len = self.array.snapshot_len();
        let map = std::mem::replace(&mut *self.index_map.borrow_mut(), IndexMap::identity(len));
        if !map.has_changes() {
            return Ok(());
        }
        tracing::trace!(
            message = "array.flush",
            array = self.array.id(),
            len = map.len(),
            deleted = map.deleted_indices.len(),
            subscribers = self.subscribers.len(),
        );
        self.subscribers
            .notify_each(|s| s.handle_collection_change(&map, LifecycleFlags::empty()))
    }

    // ── Wrapped operations ───────────────────────────────────────────

    pub fn push(&self, values: impl IntoIterator<Item = Value>) -> Result<usize> {
        let len = self.apply(ArrayOp::Push(values.into_iter().collect()))?;
        Ok(len.to_number() as usize)
    }

    pub fn pop(&self) -> Result<Value> {
        self.apply(ArrayOp::Pop)
    }

    pub fn shift(&self) -> Result<Value> {
        self.apply(ArrayOp::Shift)
    }

    pub fn unshift(&self, values: impl IntoIterator<Item = Value>) -> Result<usize> {
        let len = self.apply(ArrayOp::Unshift(values.into_iter().collect()))?;
        Ok(len.to_number() as usize)
    }

    pub fn splice(
        &self,
        start: i64,
        delete_count: Option<i64>,
        items: impl IntoIterator<Item = Value>,
    ) -> Result<Vec<Value>> {
        let removed = self.apply(ArrayOp::Splice {
            start,
            delete_count,
            items: items.into_iter().collect(),
        })?;
        Ok(removed.as_array().map(|a| a.snapshot()).unwrap_or_default())
    }

    pub fn reverse(&self) -> Result<()> {
        self.apply(ArrayOp::Reverse).map(drop)
    }

    pub fn sort(&self, comparator: Option<Comparator>) -> Result<()> {
        self.apply(ArrayOp::Sort(comparator)).map(drop)
    }

    pub fn set(&self, index: usize, value: Value) -> Result<()> {
        self.apply(ArrayOp::Set { index, value }).map(drop)
    }

    /// Run an arbitrary op through the observer.
    pub fn apply_op(&self, op: ArrayOp) -> Result<Value> {
        self.apply(op)
    }
}

impl ArrayHook for ArrayObserver {
    fn array_changed(&self, change: &ArrayChange) -> Result<()> {
        self.index_map.borrow_mut().apply_array_change(change);
        if self.intercept {
            debug_assert_eq!(
                self.index_map.borrow().len(),
                self.array.snapshot_len(),
                "index map out of step with its array"
            );
        }
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

impl Flush for ArrayObserver {
    fn flush(&self) -> Result<()> {
        self.queued.set(false);
        self.deliver()
    }

    fn discard(&self) {
        self.queued.set(false);
        self.index_map
            .borrow_mut()
            .reset(self.array.snapshot_len());
    }
}

impl CollectionObserver for ArrayObserver {
    fn collection(&self) -> Value {
        Value::Array(Rc::clone(&self.array))
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

impl Drop for ArrayObserver {
    fn drop(&mut self) {
        if self.intercept {
            let hook: Weak<dyn ArrayHook> = self.me.clone();
            self.array.remove_hook(&hook);
        }
    }
}

impl fmt::Debug for ArrayObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayObserver")
            .field("array", &self.array.id())
            .field("intercept", &self.intercept)
            .field("queued", &self.queued.get())
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reactive::index_map::CREATED;

    #[derive(Default)]
    struct Log(RefCell<Vec<IndexMap>>);

    impl CollectionSubscriber for Log {
        fn handle_collection_change(&self, map: &IndexMap, _: LifecycleFlags) -> Result<()> {
            self.0.borrow_mut().push(map.clone());
            Ok(())
        }
    }

    fn observe(values: &[i32], strategy: ObservationStrategy) -> (Rc<ArrayObserver>, Rc<Log>) {
        let array = Array::from_values(values.iter().map(|&n| Value::from(n)));
        let observer = ArrayObserver::new(array, strategy);
        let log = Rc::new(Log::default());
        observer.subscribe(Rc::downgrade(&log) as Weak<dyn CollectionSubscriber>);
        (observer, log)
    }

    #[test]
    fn immediate_mode_notifies_per_call() {
        let (observer, log) = observe(&[1, 2], ObservationStrategy::Intercept);
        observer.array().push([Value::from(3)]).unwrap();
        observer.array().shift().unwrap();
        let log = log.0.borrow();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].entries, vec![0, 1, CREATED]);
        assert_eq!(log[1].entries, vec![1, 2]);
        assert_eq!(log[1].deleted_indices, vec![0]);
    }

    #[test]
    fn batch_delivers_cumulative_map_once() {
        let (observer, log) = observe(&[1], ObservationStrategy::Intercept);
        batch::batch(|| {
            observer.array().push([Value::from(2)]).unwrap();
            observer.array().shift().unwrap();
        })
        .unwrap();
        let log = log.0.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].entries, vec![CREATED]);
        assert_eq!(log[0].deleted_items, vec![Value::from(1)]);
    }

    #[test]
    fn explicit_mode_sees_only_wrapped_calls() {
        let (observer, log) = observe(&[1, 2], ObservationStrategy::Explicit);
        observer.array().push([Value::from(3)]).unwrap();
        assert!(log.0.borrow().is_empty());
        observer.pop().unwrap();
        let log = log.0.borrow();
        assert_eq!(log.len(), 1);
        assert_eq!(log[0].entries, vec![0, 1]);
        assert_eq!(log[0].deleted_indices, vec![2]);
    }

    #[test]
    fn unsubscribe_mid_batch_stops_delivery() {
        let (observer, log) = observe(&[], ObservationStrategy::Intercept);
        let weak = Rc::downgrade(&log) as Weak<dyn CollectionSubscriber>;
        batch::batch(|| {
            observer.push([Value::from(1)]).unwrap();
            observer.unsubscribe(&weak);
        })
        .unwrap();
        assert!(log.0.borrow().is_empty());
    }
}
