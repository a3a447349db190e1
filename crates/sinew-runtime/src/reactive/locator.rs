//! Maps `(target, key)` to the right observer.
//!
//! The locator is the only place observers are created. It keeps a
//! non-owning cache so that everyone asking for the same property while an
//! observer is alive gets the same instance; an observer nobody holds any
//! more is dropped and a later request builds a fresh one.
//!
//! | Target | Key | Observer |
//! |---|---|---|
//! | object | accessor property | [`ComputedObserver`] |
//! | object | data property | [`SetterObserver`] |
//! | array | `length` | [`CollectionLengthObserver`] |
//! | map / set | `size` | [`CollectionLengthObserver`] |
//! | anything else | any | [`PrimitiveObserver`] |

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use sinew_core::{Array, Map, Object, Set, Value};

use super::array::ArrayObserver;
use super::computed::ComputedObserver;
use super::keyed::{MapObserver, SetObserver};
use super::length::{CollectionLengthObserver, LengthSource};
use super::observer::{CollectionObserver, Observer};
use super::property::{PrimitiveObserver, SetterObserver};
use crate::config::LocatorConfig;
use crate::flags::AccessorType;

type PropertyCache = AHashMap<u64, AHashMap<Rc<str>, Weak<dyn Observer>>>;

pub struct ObserverLocator {
    config: LocatorConfig,
    properties: RefCell<PropertyCache>,
    arrays: RefCell<AHashMap<u64, Weak<ArrayObserver>>>,
    maps: RefCell<AHashMap<u64, Weak<MapObserver>>>,
    sets: RefCell<AHashMap<u64, Weak<SetObserver>>>,
    lengths: RefCell<AHashMap<u64, Weak<CollectionLengthObserver>>>,
}

fn cached<T: ?Sized>(cache: &RefCell<AHashMap<u64, Weak<T>>>, id: u64) -> Option<Rc<T>> {
    cache.borrow().get(&id).and_then(Weak::upgrade)
}

impl ObserverLocator {
    pub fn new(config: LocatorConfig) -> Rc<Self> {
        tracing::debug!(
            message = "locator.new",
            strategy = %config.strategy,
            layout_properties = config.layout_properties.len(),
        );
        Rc::new(Self {
            config,
            properties: RefCell::new(AHashMap::new()),
            arrays: RefCell::new(AHashMap::new()),
            maps: RefCell::new(AHashMap::new()),
            sets: RefCell::new(AHashMap::new()),
            lengths: RefCell::new(AHashMap::new()),
        })
    }

    #[must_use]
    pub fn config(&self) -> &LocatorConfig {
        &self.config
    }

    /// The observer for `target[key]`.
    pub fn get_observer(self: &Rc<Self>, target: &Value, key: &str) -> Rc<dyn Observer> {
        match target {
            Value::Object(object) => self.object_observer(object, key),
            Value::Array(array) if key == "length" => self.array_length_observer(array),
            Value::Map(map) if key == "size" => self.length_observer(map.id(), || {
                LengthSource::Map(self.get_map_observer(map))
            }),
            Value::Set(set) if key == "size" => self.length_observer(set.id(), || {
                LengthSource::Set(self.get_set_observer(set))
            }),
            _ => PrimitiveObserver::new(target.clone(), key),
        }
    }

    fn object_observer(self: &Rc<Self>, object: &Rc<Object>, key: &str) -> Rc<dyn Observer> {
        if let Some(observer) = self
            .properties
            .borrow()
            .get(&object.id())
            .and_then(|keys| keys.get(key))
            .and_then(Weak::upgrade)
        {
            return observer;
        }

        let observer: Rc<dyn Observer> = match object.accessor(key) {
            Some((getter, setter)) => {
                ComputedObserver::new(Rc::clone(self), Rc::clone(object), key, getter, setter)
            }
            None => {
                let mut accessor = AccessorType::empty();
                if object.is_element() {
                    accessor |= AccessorType::NODE;
                    if self.config.is_layout_property(key) {
                        accessor |= AccessorType::LAYOUT;
                    }
                }
                SetterObserver::new(Rc::clone(object), key, self.config.strategy, accessor)
            }
        };
        tracing::trace!(
            message = "locator.create",
            object = object.id(),
            key,
            accessor = ?observer.accessor_type(),
        );
        self.properties
            .borrow_mut()
            .entry(object.id())
            .or_default()
            .insert(Rc::from(key), Rc::downgrade(&observer));
        observer
    }

    fn array_length_observer(self: &Rc<Self>, array: &Rc<Array>) -> Rc<dyn Observer> {
        self.length_observer(array.id(), || {
            LengthSource::Array(self.get_array_observer(array))
        })
    }

    fn length_observer(
        &self,
        id: u64,
        source: impl FnOnce() -> LengthSource,
    ) -> Rc<dyn Observer> {
        if let Some(observer) = cached(&self.lengths, id) {
            return observer;
        }
        let observer = CollectionLengthObserver::new(source());
        self.lengths
            .borrow_mut()
            .insert(id, Rc::downgrade(&observer));
        observer
    }

    pub fn get_array_observer(&self, array: &Rc<Array>) -> Rc<ArrayObserver> {
        if let Some(observer) = cached(&self.arrays, array.id()) {
            return observer;
        }
        let observer = ArrayObserver::new(Rc::clone(array), self.config.strategy);
        self.arrays
            .borrow_mut()
            .insert(array.id(), Rc::downgrade(&observer));
        observer
    }

    pub fn get_map_observer(&self, map: &Rc<Map>) -> Rc<MapObserver> {
        if let Some(observer) = cached(&self.maps, map.id()) {
            return observer;
        }
        let observer = MapObserver::new(Rc::clone(map), self.config.strategy);
        self.maps
            .borrow_mut()
            .insert(map.id(), Rc::downgrade(&observer));
        observer
    }

    pub fn get_set_observer(&self, set: &Rc<Set>) -> Rc<SetObserver> {
        if let Some(observer) = cached(&self.sets, set.id()) {
            return observer;
        }
        let observer = SetObserver::new(Rc::clone(set), self.config.strategy);
        self.sets
            .borrow_mut()
            .insert(set.id(), Rc::downgrade(&observer));
        observer
    }

    /// The structural observer for a collection value, `None` for anything
    /// that is not an array, map, or set.
    pub fn get_collection_observer(&self, value: &Value) -> Option<Rc<dyn CollectionObserver>> {
        match value {
            Value::Array(array) => Some(self.get_array_observer(array)),
            Value::Map(map) => Some(self.get_map_observer(map)),
            Value::Set(set) => Some(self.get_set_observer(set)),
            _ => None,
        }
    }

    /// Drop cache entries whose observer is gone. Returns how many were
    /// removed.
    pub fn prune(&self) -> usize {
        fn prune_ids<T: ?Sized>(cache: &RefCell<AHashMap<u64, Weak<T>>>) -> usize {
            let mut cache = cache.borrow_mut();
            let before = cache.len();
            cache.retain(|_, weak| weak.strong_count() > 0);
            before - cache.len()
        }

        let mut removed = 0;
        {
            let mut properties = self.properties.borrow_mut();
            for keys in properties.values_mut() {
                let before = keys.len();
                keys.retain(|_, weak| weak.strong_count() > 0);
                removed += before - keys.len();
            }
            properties.retain(|_, keys| !keys.is_empty());
        }
        removed += prune_ids(&self.arrays);
        removed += prune_ids(&self.maps);
        removed += prune_ids(&self.sets);
        removed += prune_ids(&self.lengths);
        if removed > 0 {
            tracing::trace!(message = "locator.prune", removed);
        }
        removed
    }

    /// Number of cached observers still alive.
    #[must_use]
    pub fn live_count(&self) -> usize {
        fn live<T: ?Sized>(cache: &RefCell<AHashMap<u64, Weak<T>>>) -> usize {
            cache
                .borrow()
                .values()
                .filter(|w| w.strong_count() > 0)
                .count()
        }
        let properties: usize = self
            .properties
            .borrow()
            .values()
            .map(|keys| keys.values().filter(|w| w.strong_count() > 0).count())
            .sum();
        properties + live(&self.arrays) + live(&self.maps) + live(&self.sets) + live(&self.lengths)
    }
}

impl fmt::Debug for ObserverLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverLocator")
            .field("strategy", &self.config.strategy)
            .field("live", &self.live_count())
            .finish()
    }
}
