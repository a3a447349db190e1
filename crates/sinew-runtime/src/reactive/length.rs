//! `array.length`, `map.size` and `set.size`.

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

use sinew_core::{Error, Result, Value};

use super::array::ArrayObserver;
use super::batch::Flush;
use super::index_map::IndexMap;
use super::keyed::{MapObserver, SetObserver};
use super::observer::{CollectionObserver, Observer};
use super::property::PropertyNotifier;
use super::subscriber::{CollectionSubscriber, Subscriber};
use crate::flags::{AccessorType, LifecycleFlags};

/// The collection observer a length observer listens to.
#[derive(Clone)]
pub enum LengthSource {
    Array(Rc<ArrayObserver>),
    Map(Rc<MapObserver>),
    Set(Rc<SetObserver>),
}

impl LengthSource {
    fn len(&self) -> usize {
        match self {
            Self::Array(o) => o.array().snapshot_len(),
            Self::Map(o) => o.target().snapshot_len(),
            Self::Set(o) => o.target().snapshot_len(),
        }
    }

    fn as_collection_observer(&self) -> &dyn CollectionObserver {
        match self {
            Self::Array(o) => &**o,
            Self::Map(o) => &**o,
            Self::Set(o) => &**o,
        }
    }

    fn key(&self) -> &'static str {
        match self {
            Self::Array(_) => "length",
            Self::Map(_) | Self::Set(_) => "size",
        }
    }
}

/// Observer for a collection's element count.
///
/// Listens to the collection observer and notifies when the count differs
/// from the last one it saw. Writing an array's `length` truncates or pads
/// with `undefined`; `size` is read-only.
pub struct CollectionLengthObserver {
    source: LengthSource,
    current: Cell<usize>,
    notifier: PropertyNotifier,
    me: Weak<Self>,
}

impl CollectionLengthObserver {
    pub fn new(source: LengthSource) -> Rc<Self> {
        let current = source.len();
        let observer = Rc::new_cyclic(|me| Self {
            source,
            current: Cell::new(current),
            notifier: PropertyNotifier::default(),
            me: me.clone(),
        });
        observer
            .source
            .as_collection_observer()
            .subscribe(Rc::downgrade(&observer) as Weak<dyn CollectionSubscriber>);
        observer
    }
}

impl Observer for CollectionLengthObserver {
    fn get_value(&self) -> Value {
        Value::from(self.source.len())
    }

    fn set_value(&self, value: Value, _flags: LifecycleFlags) -> Result<()> {
        let LengthSource::Array(observer) = &self.source else {
            return Err(Error::read_only(self.source.key()));
        };
        let n = value.to_number();
        if !(n >= 0.0 && n.fract() == 0.0 && n <= f64::from(u32::MAX)) {
            return Err(Error::invalid("length", format!("invalid array length {n}")));
        }
        let target = n as usize;
        let len = observer.array().snapshot_len();
        if target < len {
            observer.splice(target as i64, None, [])?;
        } else if target > len {
            observer.push(std::iter::repeat_n(Value::Undefined, target - len))?;
        }
        Ok(())
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
        AccessorType::OBSERVER
    }
}

impl CollectionSubscriber for CollectionLengthObserver {
    fn handle_collection_change(&self, _index_map: &IndexMap, flags: LifecycleFlags) -> Result<()> {
        let len = self.source.len();
        let old = self.current.replace(len);
        if old == len {
            return Ok(());
        }
        self.notifier.notify(
            || self.me.upgrade().map(|me| me as Rc<dyn Flush>),
            &Value::from(len),
            &Value::from(old),
            flags,
        )
    }
}

impl Flush for CollectionLengthObserver {
    fn flush(&self) -> Result<()> {
        self.notifier.flush(&self.get_value())
    }

    fn discard(&self) {
        self.notifier.discard();
    }
}

impl Drop for CollectionLengthObserver {
    fn drop(&mut self) {
        let me: Weak<dyn CollectionSubscriber> = self.me.clone();
        self.source.as_collection_observer().unsubscribe(&me);
    }
}

impl fmt::Debug for CollectionLengthObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionLengthObserver")
            .field("key", &self.source.key())
            .field("current", &self.current.get())
            .finish()
    }
}
