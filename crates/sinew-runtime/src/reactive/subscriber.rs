//! Subscriber traits and the inline subscriber set.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Weak;

use sinew_core::{Error, Result, Value};
use smallvec::SmallVec;

use super::index_map::IndexMap;
use crate::flags::LifecycleFlags;

/// Receiver of property changes.
pub trait Subscriber {
    fn handle_change(
        &self,
        new_value: &Value,
        old_value: &Value,
        flags: LifecycleFlags,
    ) -> Result<()>;
}

/// Receiver of collection changes.
pub trait CollectionSubscriber {
    fn handle_collection_change(&self, index_map: &IndexMap, flags: LifecycleFlags) -> Result<()>;
}

/// Non-owning set of subscribers.
///
/// The first two subscribers live inline. Adding the same subscriber twice
/// is a no-op. Dead entries are pruned lazily.
pub struct SubscriberSet<S: ?Sized> {
    slots: RefCell<SmallVec<[Weak<S>; 2]>>,
    /// Bumped on every removal; a pass only rechecks membership after one.
    removals: Cell<u64>,
}

impl<S: ?Sized> Default for SubscriberSet<S> {
    fn default() -> Self {
        Self {
            slots: RefCell::new(SmallVec::new()),
            removals: Cell::new(0),
        }
    }
}

impl<S: ?Sized> SubscriberSet<S> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if `subscriber` was already present.
    pub fn add(&self, subscriber: Weak<S>) -> bool {
        let mut slots = self.slots.borrow_mut();
        slots.retain(|s| s.strong_count() > 0);
        if slots.iter().any(|s| Weak::ptr_eq(s, &subscriber)) {
            return false;
        }
        slots.push(subscriber);
        true
    }

    /// Returns `false` if `subscriber` was not present.
    pub fn remove(&self, subscriber: &Weak<S>) -> bool {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|s| s.strong_count() > 0 && !Weak::ptr_eq(s, subscriber));
        let removed = slots.len() != before;
        if removed {
            self.removals.set(self.removals.get() + 1);
        }
        removed
    }

    #[must_use]
    pub fn contains(&self, subscriber: &Weak<S>) -> bool {
        self.slots
            .borrow()
            .iter()
            .any(|s| Weak::ptr_eq(s, subscriber))
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots
            .borrow()
            .iter()
            .filter(|s| s.strong_count() > 0)
            .count()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.borrow_mut().clear();
        self.removals.set(self.removals.get() + 1);
    }

    /// Call `notify` for every subscriber present when the pass starts.
    ///
    /// Subscribers removed by an earlier callback in the same pass are
    /// skipped; subscribers added during the pass wait for the next one.
    /// Every subscriber is visited even if some fail; the first error is
    /// returned and later ones are logged.
    pub fn notify_each(&self, mut notify: impl FnMut(&S) -> Result<()>) -> Result<()> {
        let snapshot: SmallVec<[Weak<S>; 2]> = self.slots.borrow().clone();
        let removals = self.removals.get();
        let mut first: Option<Error> = None;
        for weak in &snapshot {
            if self.removals.get() != removals && !self.contains(weak) {
                continue;
            }
            let Some(subscriber) = weak.upgrade() else {
                continue;
            };
            if let Err(err) = notify(&subscriber) {
                if first.is_none() {
                    first = Some(err);
                } else {
                    tracing::warn!(message = "subscriber.error", error = %err);
                }
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl<S: ?Sized> fmt::Debug for SubscriberSet<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubscriberSet")
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    struct Counter {
        calls: Cell<u32>,
        fail: bool,
    }

    impl Subscriber for Counter {
        fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                Err(Error::thrown("fail"))
            } else {
                Ok(())
            }
        }
    }

    fn counter(fail: bool) -> Rc<Counter> {
        Rc::new(Counter {
            calls: Cell::new(0),
            fail,
        })
    }

    fn weak(c: &Rc<Counter>) -> Weak<dyn Subscriber> {
        Rc::downgrade(c) as Weak<dyn Subscriber>
    }

    fn notify(set: &SubscriberSet<dyn Subscriber>) -> Result<()> {
        set.notify_each(|s| s.handle_change(&Value::Null, &Value::Null, LifecycleFlags::empty()))
    }

    #[test]
    fn add_is_idempotent() {
        let set = SubscriberSet::<dyn Subscriber>::new();
        let a = counter(false);
        assert!(set.add(weak(&a)));
        assert!(!set.add(weak(&a)));
        notify(&set).unwrap();
        assert_eq!(a.calls.get(), 1);
        assert!(set.remove(&weak(&a)));
        assert!(set.is_empty());
    }

    #[test]
    fn dead_subscribers_are_skipped() {
        let set = SubscriberSet::<dyn Subscriber>::new();
        {
            let gone = counter(false);
            set.add(weak(&gone));
        }
        assert_eq!(set.len(), 0);
        notify(&set).unwrap();
    }

    #[test]
    fn failures_do_not_stop_the_pass() {
        let set = SubscriberSet::<dyn Subscriber>::new();
        let a = counter(true);
        let b = counter(true);
        let c = counter(false);
        for s in [&a, &b, &c] {
            set.add(weak(s));
        }
        assert_eq!(notify(&set), Err(Error::thrown("fail")));
        assert_eq!((a.calls.get(), b.calls.get(), c.calls.get()), (1, 1, 1));
    }

    /// Runs `action` on every call after counting it.
    #[derive(Default)]
    struct Actor {
        calls: Cell<u32>,
        action: RefCell<Option<Box<dyn Fn()>>>,
    }

    impl Subscriber for Actor {
        fn handle_change(&self, _: &Value, _: &Value, _: LifecycleFlags) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            if let Some(action) = self.action.borrow().as_ref() {
                action();
            }
            Ok(())
        }
    }

    fn actor_weak(a: &Rc<Actor>) -> Weak<dyn Subscriber> {
        Rc::downgrade(a) as Weak<dyn Subscriber>
    }

    #[test]
    fn removed_mid_pass_is_not_called() {
        let set = Rc::new(SubscriberSet::<dyn Subscriber>::new());
        let a = Rc::new(Actor::default());
        let b = counter(false);
        set.add(actor_weak(&a));
        set.add(weak(&b));
        let (s, wb) = (Rc::downgrade(&set), weak(&b));
        *a.action.borrow_mut() = Some(Box::new(move || {
            if let Some(set) = s.upgrade() {
                set.remove(&wb);
            }
        }));
        notify(&set).unwrap();
        assert_eq!(a.calls.get(), 1);
        assert_eq!(b.calls.get(), 0);
    }

    #[test]
    fn added_mid_pass_waits_for_next_pass() {
        let set = Rc::new(SubscriberSet::<dyn Subscriber>::new());
        let a = Rc::new(Actor::default());
        let c = counter(false);
        set.add(actor_weak(&a));
        let (s, wc) = (Rc::downgrade(&set), weak(&c));
        *a.action.borrow_mut() = Some(Box::new(move || {
            if let Some(set) = s.upgrade() {
                set.add(wc.clone());
            }
        }));
        notify(&set).unwrap();
        assert_eq!(c.calls.get(), 0);
        notify(&set).unwrap();
        assert_eq!(c.calls.get(), 1);
        assert_eq!(a.calls.get(), 2);
    }

    #[test]
    fn resubscribing_self_mid_pass_calls_once() {
        let set = Rc::new(SubscriberSet::<dyn Subscriber>::new());
        let a = Rc::new(Actor::default());
        let b = counter(false);
        set.add(actor_weak(&a));
        set.add(weak(&b));
        let (s, wa) = (Rc::downgrade(&set), actor_weak(&a));
        *a.action.borrow_mut() = Some(Box::new(move || {
            if let Some(set) = s.upgrade() {
                set.remove(&wa);
                set.add(wa.clone());
            }
        }));
        notify(&set).unwrap();
        assert_eq!(a.calls.get(), 1);
        assert_eq!(b.calls.get(), 1);
        assert_eq!(set.len(), 2);
    }
}
