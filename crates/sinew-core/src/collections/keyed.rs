use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use indexmap::{IndexMap, IndexSet};

use crate::error::Result;
use crate::tracking;
use crate::value::{Value, ValueKey};

#[derive(Debug, Clone)]
pub enum MapOp {
    Set(Value, Value),
    Delete(Value),
    Clear,
}

#[derive(Debug, Clone)]
pub enum SetOp {
    Add(Value),
    Delete(Value),
    Clear,
}

/// Structural effect of one applied [`MapOp`] or [`SetOp`].
///
/// Indices are insertion-order positions. For sets, `value` is the key.
#[derive(Debug, Clone, PartialEq)]
pub enum KeyedChange {
    Added {
        key: Value,
    },
    Replaced {
        index: usize,
        key: Value,
        previous: Value,
    },
    Deleted {
        index: usize,
        key: Value,
        value: Value,
    },
    Cleared {
        entries: Vec<(Value, Value)>,
    },
}

/// Mutation interception for maps and sets.
pub trait KeyedHook {
    fn keyed_changed(&self, change: &KeyedChange) -> Result<()>;
}

// ── Map ──────────────────────────────────────────────────────────────

/// Insertion-ordered map keyed by SameValueZero.
pub struct Map {
    id: u64,
    entries: RefCell<IndexMap<ValueKey, Value>>,
    hooks: RefCell<Vec<Weak<dyn KeyedHook>>>,
}

impl Map {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::from_entries([])
    }

    pub fn from_entries(entries: impl IntoIterator<Item = (Value, Value)>) -> Rc<Self> {
        Rc::new(Self {
            id: crate::next_id(),
            entries: RefCell::new(
                entries
                    .into_iter()
                    .map(|(k, v)| (ValueKey(k), v))
                    .collect(),
            ),
            hooks: RefCell::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    fn track(self: &Rc<Self>) {
        tracking::track_collection(Value::Map(Rc::clone(self)));
    }

    pub fn get(self: &Rc<Self>, key: &Value) -> Value {
        self.track();
        self.entries
            .borrow()
            .get(&ValueKey(key.clone()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn has(self: &Rc<Self>, key: &Value) -> bool {
        self.track();
        self.entries.borrow().contains_key(&ValueKey(key.clone()))
    }

    pub fn size(self: &Rc<Self>) -> usize {
        self.track();
        self.entries.borrow().len()
    }

    /// Tracked copy of the entries in insertion order.
    pub fn to_vec(self: &Rc<Self>) -> Vec<(Value, Value)> {
        self.track();
        self.snapshot()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<(Value, Value)> {
        self.entries
            .borrow()
            .iter()
            .map(|(k, v)| (k.0.clone(), v.clone()))
            .collect()
    }

    #[must_use]
    pub fn snapshot_len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn add_hook(&self, hook: Weak<dyn KeyedHook>) {
        super::install(&self.hooks, hook);
    }

    pub fn remove_hook(&self, hook: &Weak<dyn KeyedHook>) {
        super::uninstall(&self.hooks, hook);
    }

    #[must_use]
    pub fn hook_count(&self) -> usize {
        super::live_count(&self.hooks)
    }

    /// Perform `op` natively, then report the change.
    ///
    /// Returns the map for `Set`, whether a key was removed for `Delete`, and
    /// `undefined` for `Clear`.
    pub fn apply(
        self: &Rc<Self>,
        op: MapOp,
        via: Option<&(dyn KeyedHook + 'static)>,
    ) -> Result<Value> {
        let (result, change) = {
            let mut entries = self.entries.borrow_mut();
            match op {
                MapOp::Set(key, value) => {
                    let change = match entries.get_full_mut(&ValueKey(key.clone())) {
                        Some((index, _, slot)) => {
                            let previous = std::mem::replace(slot, value);
                            (!previous.same_value(slot)).then_some(KeyedChange::Replaced {
                                index,
                                key,
                                previous,
                            })
                        }
                        None => {
                            entries.insert(ValueKey(key.clone()), value);
                            Some(KeyedChange::Added { key })
                        }
                    };
                    (Value::Map(Rc::clone(self)), change)
                }
                MapOp::Delete(key) => match entries.shift_remove_full(&ValueKey(key)) {
                    Some((index, key, value)) => (
                        Value::Bool(true),
                        Some(KeyedChange::Deleted {
                            index,
                            key: key.0,
                            value,
                        }),
                    ),
                    None => (Value::Bool(false), None),
                },
                MapOp::Clear => {
                    let drained: Vec<(Value, Value)> =
                        entries.drain(..).map(|(k, v)| (k.0, v)).collect();
                    let change = (!drained.is_empty())
                        .then_some(KeyedChange::Cleared { entries: drained });
                    (Value::Undefined, change)
                }
            }
        };
        if let Some(change) = change {
            #[cfg(feature = "tracing")]
            tracing::trace!(message = "map.mutate", map = self.id, change = ?change);
            super::deliver(&self.hooks, via, |hook| hook.keyed_changed(&change))?;
        }
        Ok(result)
    }

    pub fn set(self: &Rc<Self>, key: Value, value: Value) -> Result<()> {
        self.apply(MapOp::Set(key, value), None).map(drop)
    }

    pub fn delete(self: &Rc<Self>, key: &Value) -> Result<bool> {
        Ok(self.apply(MapOp::Delete(key.clone()), None)?.is_truthy())
    }

    pub fn clear(self: &Rc<Self>) -> Result<()> {
        self.apply(MapOp::Clear, None).map(drop)
    }
}

impl fmt::Debug for Map {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Map")
            .field("id", &self.id)
            .field("entries", &self.snapshot())
            .finish()
    }
}

// ── Set ──────────────────────────────────────────────────────────────

/// Insertion-ordered set keyed by SameValueZero.
pub struct Set {
    id: u64,
    items: RefCell<IndexSet<ValueKey>>,
    hooks: RefCell<Vec<Weak<dyn KeyedHook>>>,
}

impl Set {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::from_values([])
    }

    pub fn from_values(values: impl IntoIterator<Item = Value>) -> Rc<Self> {
        Rc::new(Self {
            id: crate::next_id(),
            items: RefCell::new(values.into_iter().map(ValueKey).collect()),
            hooks: RefCell::new(Vec::new()),
        })
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    fn track(self: &Rc<Self>) {
        tracking::track_collection(Value::Set(Rc::clone(self)));
    }

    pub fn has(self: &Rc<Self>, value: &Value) -> bool {
        self.track();
        self.items.borrow().contains(&ValueKey(value.clone()))
    }

    pub fn size(self: &Rc<Self>) -> usize {
        self.track();
        self.items.borrow().len()
    }

    pub fn to_vec(self: &Rc<Self>) -> Vec<Value> {
        self.track();
        self.snapshot()
    }

    #[must_use]
    pub fn snapshot(&self) -> Vec<Value> {
        self.items.borrow().iter().map(|k| k.0.clone()).collect()
    }

    #[must_use]
    pub fn snapshot_len(&self) -> usize {
        self.items.borrow().len()
    }

    pub fn add_hook(&self, hook: Weak<dyn KeyedHook>) {
        super::install(&self.hooks, hook);
    }

    pub fn remove_hook(&self, hook: &Weak<dyn KeyedHook>) {
        super::uninstall(&self.hooks, hook);
    }

    #[must_use]
    pub fn hook_count(&self) -> usize {
        super::live_count(&self.hooks)
    }

    /// Perform `op` natively, then report the change.
    ///
    /// Returns the set for `Add`, whether a value was removed for `Delete`,
    /// and `undefined` for `Clear`.
    pub fn apply(
        self: &Rc<Self>,
        op: SetOp,
        via: Option<&(dyn KeyedHook + 'static)>,
    ) -> Result<Value> {
        let (result, change) = {
            let mut items = self.items.borrow_mut();
            match op {
                SetOp::Add(value) => {
                    let added = items.insert(ValueKey(value.clone()));
                    (
                        Value::Set(Rc::clone(self)),
                        added.then_some(KeyedChange::Added { key: value }),
                    )
                }
                SetOp::Delete(value) => match items.shift_remove_full(&ValueKey(value)) {
                    Some((index, key)) => (
                        Value::Bool(true),
                        Some(KeyedChange::Deleted {
                            index,
                            key: key.0.clone(),
                            value: key.0,
                        }),
                    ),
                    None => (Value::Bool(false), None),
                },
                SetOp::Clear => {
                    let drained: Vec<(Value, Value)> =
                        items.drain(..).map(|k| (k.0.clone(), k.0)).collect();
                    let change = (!drained.is_empty())
                        .then_some(KeyedChange::Cleared { entries: drained });
                    (Value::Undefined, change)
                }
            }
        };
        if let Some(change) = change {
            #[cfg(feature = "tracing")]
            tracing::trace!(message = "set.mutate", set = self.id, change = ?change);
            super::deliver(&self.hooks, via, |hook| hook.keyed_changed(&change))?;
        }
        Ok(result)
    }

    pub fn add(self: &Rc<Self>, value: Value) -> Result<()> {
        self.apply(SetOp::Add(value), None).map(drop)
    }

    pub fn delete(self: &Rc<Self>, value: &Value) -> Result<bool> {
        Ok(self.apply(SetOp::Delete(value.clone()), None)?.is_truthy())
    }

    pub fn clear(self: &Rc<Self>) -> Result<()> {
        self.apply(SetOp::Clear, None).map(drop)
    }
}

impl fmt::Debug for Set {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Set")
            .field("id", &self.id)
            .field("items", &self.snapshot())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct Recorder(RefCell<Vec<KeyedChange>>);

    impl KeyedHook for Recorder {
        fn keyed_changed(&self, change: &KeyedChange) -> Result<()> {
            self.0.borrow_mut().push(change.clone());
            Ok(())
        }
    }

    fn recorder_on_map(map: &Rc<Map>) -> Rc<Recorder> {
        let rec = Rc::new(Recorder::default());
        map.add_hook(Rc::downgrade(&rec) as Weak<dyn KeyedHook>);
        rec
    }

    #[test]
    fn map_reports_add_replace_delete() {
        let map = Map::new();
        let rec = recorder_on_map(&map);
        map.set(Value::from("a"), Value::from(1)).unwrap();
        map.set(Value::from("b"), Value::from(2)).unwrap();
        map.set(Value::from("a"), Value::from(1)).unwrap();
        map.set(Value::from("b"), Value::from(3)).unwrap();
        assert!(map.delete(&Value::from("a")).unwrap());
        assert!(!map.delete(&Value::from("zzz")).unwrap());

        assert_eq!(
            *rec.0.borrow(),
            vec![
                KeyedChange::Added {
                    key: Value::from("a")
                },
                KeyedChange::Added {
                    key: Value::from("b")
                },
                KeyedChange::Replaced {
                    index: 1,
                    key: Value::from("b"),
                    previous: Value::from(2)
                },
                KeyedChange::Deleted {
                    index: 0,
                    key: Value::from("a"),
                    value: Value::from(1)
                },
            ]
        );
        assert_eq!(map.get(&Value::from("b")), Value::from(3));
    }

    #[test]
    fn map_keys_use_same_value_zero() {
        let map = Map::new();
        map.set(Value::from(0.0), Value::from("zero")).unwrap();
        assert_eq!(map.get(&Value::from(-0.0)), Value::from("zero"));
        map.set(Value::from(f64::NAN), Value::from("nan")).unwrap();
        assert!(map.has(&Value::from(f64::NAN)));
        assert_eq!(map.snapshot_len(), 2);
    }

    #[test]
    fn clearing_empty_collections_is_silent() {
        let map = Map::new();
        let rec = recorder_on_map(&map);
        map.clear().unwrap();
        assert!(rec.0.borrow().is_empty());

        map.set(Value::from(1), Value::from(1)).unwrap();
        map.clear().unwrap();
        assert_eq!(
            rec.0.borrow().last(),
            Some(&KeyedChange::Cleared {
                entries: vec![(Value::from(1), Value::from(1))]
            })
        );
    }

    #[test]
    fn set_reports_only_new_members() {
        let set = Set::from_values([Value::from(1)]);
        let rec = Rc::new(Recorder::default());
        set.add_hook(Rc::downgrade(&rec) as Weak<dyn KeyedHook>);
        set.add(Value::from(1)).unwrap();
        set.add(Value::from(2)).unwrap();
        set.delete(&Value::from(1)).unwrap();
        assert_eq!(
            *rec.0.borrow(),
            vec![
                KeyedChange::Added {
                    key: Value::from(2)
                },
                KeyedChange::Deleted {
                    index: 0,
                    key: Value::from(1),
                    value: Value::from(1)
                },
            ]
        );
        assert_eq!(set.snapshot(), vec![Value::from(2)]);
    }
}
