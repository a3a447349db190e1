//! Reflective property bags.
//!
//! An [`Object`] is an ordered map from property names to either a plain
//! data value or an accessor pair (getter plus optional setter). It is the
//! explicit stand-in for the dynamic objects a binding context is made of:
//! every read goes through [`Object::get`] and every write through
//! [`Object::set`], which is what makes interception possible without
//! patching anything.
//!
//! # Interception
//!
//! Observers register a [`PropertyHook`] for a key. Hooks are held as
//! `Weak` references: the object never keeps an observer alive. When a data
//! property changes (SameValue comparison), every live hook for that key is
//! told about the transition, *after* the new value has been stored and all
//! internal borrows have been released, so hooks may freely re-enter the
//! object.
//!
//! # Elements
//!
//! Objects created with [`Object::element`] carry a tag name and act as host
//! nodes: they can be event targets and the observer locator may classify
//! some of their properties as layout-affecting.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use ahash::AHashMap;
use indexmap::IndexMap;

use crate::error::{Error, Result, keep_first};
use crate::tracking;
use crate::value::Value;

/// Getter closure for an accessor property.
pub type Getter = Rc<dyn Fn(&Rc<Object>) -> Value>;

/// Setter closure for an accessor property.
pub type Setter = Rc<dyn Fn(&Rc<Object>, Value) -> Result<()>>;

/// Write interception for a single property.
pub trait PropertyHook {
    /// Called after `key` changed from `old_value` to `new_value`.
    fn property_changed(&self, new_value: &Value, old_value: &Value) -> Result<()>;
}

/// Receiver for events dispatched on an element.
pub trait EventListener {
    fn handle_event(&self, event: &Value) -> Result<()>;
}

#[derive(Clone)]
enum Property {
    Data(Value),
    Accessor { get: Getter, set: Option<Setter> },
}

pub struct Object {
    id: u64,
    tag: Option<Rc<str>>,
    props: RefCell<IndexMap<Rc<str>, Property>>,
    hooks: RefCell<AHashMap<Rc<str>, Vec<Weak<dyn PropertyHook>>>>,
    listeners: RefCell<Vec<(Rc<str>, Weak<dyn EventListener>)>>,
}

impl Object {
    fn with_tag(tag: Option<Rc<str>>) -> Rc<Self> {
        Rc::new(Self {
            id: crate::next_id(),
            tag,
            props: RefCell::new(IndexMap::new()),
            hooks: RefCell::new(AHashMap::new()),
            listeners: RefCell::new(Vec::new()),
        })
    }

    /// Create an empty plain object.
    #[must_use]
    pub fn new() -> Rc<Self> {
        Self::with_tag(None)
    }

    /// Create a host element with the given tag name.
    #[must_use]
    pub fn element(tag: &str) -> Rc<Self> {
        Self::with_tag(Some(Rc::from(tag)))
    }

    /// Create a plain object from `(key, value)` pairs, in order.
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Rc<Self>
    where
        K: AsRef<str>,
        V: Into<Value>,
    {
        let obj = Self::new();
        {
            let mut props = obj.props.borrow_mut();
            for (key, value) in entries {
                props.insert(Rc::from(key.as_ref()), Property::Data(value.into()));
            }
        }
        obj
    }

    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Tag name, for host elements.
    #[must_use]
    pub fn tag(&self) -> Option<&str> {
        self.tag.as_deref()
    }

    #[must_use]
    pub fn is_element(&self) -> bool {
        self.tag.is_some()
    }

    /// Whether `key` exists, as a data or accessor property (the `in` operator).
    #[must_use]
    pub fn has(&self, key: &str) -> bool {
        self.props.borrow().contains_key(key)
    }

    /// Property names in insertion order.
    #[must_use]
    pub fn keys(&self) -> Vec<Rc<str>> {
        self.props.borrow().keys().cloned().collect()
    }

    /// Whether `key` is an accessor property.
    #[must_use]
    pub fn is_accessor(&self, key: &str) -> bool {
        matches!(self.props.borrow().get(key), Some(Property::Accessor { .. }))
    }

    /// The getter/setter pair of an accessor property.
    #[must_use]
    pub fn accessor(&self, key: &str) -> Option<(Getter, Option<Setter>)> {
        match self.props.borrow().get(key) {
            Some(Property::Accessor { get, set }) => Some((Rc::clone(get), set.clone())),
            _ => None,
        }
    }

    /// Read a property, reporting the read to the innermost read tracker.
    ///
    /// Missing properties read as `undefined`. Accessor properties run their
    /// getter with no internal borrow held.
    pub fn get(self: &Rc<Self>, key: &str) -> Value {
        tracking::track_property(self, key);
        let prop = self.props.borrow().get(key).cloned();
        match prop {
            Some(Property::Data(value)) => value,
            Some(Property::Accessor { get, .. }) => get(self),
            None => Value::Undefined,
        }
    }

    /// Read a data property without tracking and without running getters.
    #[must_use]
    pub fn peek(&self, key: &str) -> Value {
        match self.props.borrow().get(key) {
            Some(Property::Data(value)) => value.clone(),
            _ => Value::Undefined,
        }
    }

    /// Write a property.
    ///
    /// Accessor properties delegate to their setter (and fail if there is
    /// none). Data properties store the value and, if it differs from the
    /// previous one under SameValue, notify every live hook for `key`.
    pub fn set(self: &Rc<Self>, key: &str, value: Value) -> Result<()> {
        let setter = {
            let props = self.props.borrow();
            match props.get(key) {
                Some(Property::Accessor { set: Some(set), .. }) => Some(Rc::clone(set)),
                Some(Property::Accessor { set: None, .. }) => return Err(Error::read_only(key)),
                _ => None,
            }
        };
        if let Some(set) = setter {
            return set(self, value);
        }

        let old = {
            let mut props = self.props.borrow_mut();
            match props.get_mut(key) {
                Some(Property::Data(slot)) => std::mem::replace(slot, value.clone()),
                _ => {
                    props.insert(Rc::from(key), Property::Data(value.clone()));
                    Value::Undefined
                }
            }
        };
        if old.same_value(&value) {
            return Ok(());
        }
        self.notify_hooks(key, &value, &old)
    }

    /// Remove a property. Hooks see the transition to `undefined`.
    pub fn delete(self: &Rc<Self>, key: &str) -> Result<bool> {
        let removed = self.props.borrow_mut().shift_remove(key);
        match removed {
            Some(Property::Data(old)) if !old.is_undefined() => {
                self.notify_hooks(key, &Value::Undefined, &old)?;
                Ok(true)
            }
            Some(_) => Ok(true),
            None => Ok(false),
        }
    }

    /// Define (or replace) an accessor property.
    pub fn define_accessor(&self, key: &str, get: Getter, set: Option<Setter>) {
        self.props
            .borrow_mut()
            .insert(Rc::from(key), Property::Accessor { get, set });
    }

    /// Define a read-only accessor property from a closure.
    pub fn define_getter(&self, key: &str, get: impl Fn(&Rc<Object>) -> Value + 'static) {
        self.define_accessor(key, Rc::new(get), None);
    }

    // ── Hooks ────────────────────────────────────────────────────────

    /// Install a write hook for `key`. Installing the same hook twice is a no-op.
    pub fn add_hook(&self, key: &str, hook: Weak<dyn PropertyHook>) {
        let mut hooks = self.hooks.borrow_mut();
        let list = hooks.entry(Rc::from(key)).or_default();
        list.retain(|h| h.strong_count() > 0);
        if !list.iter().any(|h| Weak::ptr_eq(h, &hook)) {
            list.push(hook);
        }
    }

    /// Remove a previously installed hook.
    pub fn remove_hook(&self, key: &str, hook: &Weak<dyn PropertyHook>) {
        let mut hooks = self.hooks.borrow_mut();
        if let Some(list) = hooks.get_mut(key) {
            list.retain(|h| h.strong_count() > 0 && !Weak::ptr_eq(h, hook));
            if list.is_empty() {
                hooks.remove(key);
            }
        }
    }

    /// Number of live hooks installed for `key`.
    #[must_use]
    pub fn hook_count(&self, key: &str) -> usize {
        self.hooks
            .borrow()
            .get(key)
            .map_or(0, |list| list.iter().filter(|h| h.strong_count() > 0).count())
    }

    fn notify_hooks(&self, key: &str, new_value: &Value, old_value: &Value) -> Result<()> {
        let live: Vec<Rc<dyn PropertyHook>> = {
            let hooks = self.hooks.borrow();
            match hooks.get(key) {
                Some(list) => list.iter().filter_map(Weak::upgrade).collect(),
                None => return Ok(()),
            }
        };
        let mut first = None;
        for hook in live {
            if let Err(err) = hook.property_changed(new_value, old_value) {
                if first.is_none() {
                    first = Some(err);
                } else {
                    #[cfg(feature = "tracing")]
                    tracing::warn!(message = "object.hook_error", key, object = self.id, error = %err);
                }
            }
        }
        first.map_or(Ok(()), Err)
    }

    // ── Events ───────────────────────────────────────────────────────

    pub fn add_event_listener(&self, event: &str, listener: Weak<dyn EventListener>) {
        let mut listeners = self.listeners.borrow_mut();
        listeners.retain(|(_, l)| l.strong_count() > 0);
        if !listeners
            .iter()
            .any(|(name, l)| &**name == event && Weak::ptr_eq(l, &listener))
        {
            listeners.push((Rc::from(event), listener));
        }
    }

    pub fn remove_event_listener(&self, event: &str, listener: &Weak<dyn EventListener>) {
        self.listeners
            .borrow_mut()
            .retain(|(name, l)| l.strong_count() > 0 && !(&**name == event && Weak::ptr_eq(l, listener)));
    }

    #[must_use]
    pub fn listener_count(&self, event: &str) -> usize {
        self.listeners
            .borrow()
            .iter()
            .filter(|(name, l)| &**name == event && l.strong_count() > 0)
            .count()
    }

    /// Deliver `event` to every listener registered for `name`.
    pub fn dispatch_event(&self, name: &str, event: &Value) -> Result<()> {
        let targets: Vec<Rc<dyn EventListener>> = self
            .listeners
            .borrow()
            .iter()
            .filter(|(n, _)| &**n == name)
            .filter_map(|(_, l)| l.upgrade())
            .collect();
        let mut first = None;
        for listener in targets {
            if let Err(err) = listener.handle_event(event) {
                keep_first(&mut first, err);
            }
        }
        first.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Object")
            .field("id", &self.id)
            .field("tag", &self.tag)
            .field("keys", &self.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    struct CountingHook {
        calls: Cell<u32>,
        last: RefCell<(Value, Value)>,
    }

    impl PropertyHook for CountingHook {
        fn property_changed(&self, new_value: &Value, old_value: &Value) -> Result<()> {
            self.calls.set(self.calls.get() + 1);
            *self.last.borrow_mut() = (new_value.clone(), old_value.clone());
            Ok(())
        }
    }

    fn counting_hook() -> Rc<CountingHook> {
        Rc::new(CountingHook {
            calls: Cell::new(0),
            last: RefCell::new((Value::Undefined, Value::Undefined)),
        })
    }

    #[test]
    fn get_and_set_data_properties() {
        let obj = Object::from_entries([("a", 1)]);
        assert_eq!(obj.get("a"), Value::from(1));
        assert_eq!(obj.get("missing"), Value::Undefined);
        obj.set("b", Value::from("x")).unwrap();
        assert!(obj.has("b"));
        assert_eq!(obj.keys().len(), 2);
    }

    #[test]
    fn hooks_fire_only_on_change() {
        let obj = Object::from_entries([("a", 1)]);
        let hook = counting_hook();
        let weak: Weak<dyn PropertyHook> = Rc::downgrade(&hook) as Weak<dyn PropertyHook>;
        obj.add_hook("a", weak.clone());
        obj.add_hook("a", weak);
        assert_eq!(obj.hook_count("a"), 1);

        obj.set("a", Value::from(1)).unwrap();
        assert_eq!(hook.calls.get(), 0);

        obj.set("a", Value::from(2)).unwrap();
        assert_eq!(hook.calls.get(), 1);
        assert_eq!(*hook.last.borrow(), (Value::from(2), Value::from(1)));
    }

    #[test]
    fn dropped_hooks_are_pruned() {
        let obj = Object::new();
        {
            let hook = counting_hook();
            obj.add_hook("a", Rc::downgrade(&hook) as Weak<dyn PropertyHook>);
            assert_eq!(obj.hook_count("a"), 1);
        }
        assert_eq!(obj.hook_count("a"), 0);
        obj.set("a", Value::from(1)).unwrap();
    }

    #[test]
    fn accessor_properties_use_getter_and_setter() {
        let obj = Object::from_entries([("first", "Ada"), ("last", "Lovelace")]);
        obj.define_accessor(
            "full",
            Rc::new(|o: &Rc<Object>| {
                Value::from(format!("{} {}", o.get("first"), o.get("last")))
            }),
            Some(Rc::new(|o: &Rc<Object>, v: Value| {
                let text = v.to_js_string();
                let (first, last) = text.split_once(' ').unwrap_or((&text, ""));
                o.set("first", Value::from(first))?;
                o.set("last", Value::from(last))
            })),
        );
        assert_eq!(obj.get("full"), Value::from("Ada Lovelace"));
        obj.set("full", Value::from("Grace Hopper")).unwrap();
        assert_eq!(obj.get("first"), Value::from("Grace"));
        assert!(obj.is_accessor("full"));
    }

    #[test]
    fn getter_without_setter_is_read_only() {
        let obj = Object::new();
        obj.define_getter("answer", |_| Value::from(42));
        assert_eq!(
            obj.set("answer", Value::from(1)),
            Err(Error::read_only("answer"))
        );
    }

    #[test]
    fn delete_notifies_transition_to_undefined() {
        let obj = Object::from_entries([("a", 1)]);
        let hook = counting_hook();
        obj.add_hook("a", Rc::downgrade(&hook) as Weak<dyn PropertyHook>);
        assert!(obj.delete("a").unwrap());
        assert_eq!(hook.calls.get(), 1);
        assert!(!obj.has("a"));
        assert!(!obj.delete("a").unwrap());
    }

    struct Recorder(RefCell<Vec<Value>>);

    impl EventListener for Recorder {
        fn handle_event(&self, event: &Value) -> Result<()> {
            self.0.borrow_mut().push(event.clone());
            Ok(())
        }
    }

    #[test]
    fn events_reach_registered_listeners() {
        let el = Object::element("button");
        let rec = Rc::new(Recorder(RefCell::new(Vec::new())));
        let weak = Rc::downgrade(&rec) as Weak<dyn EventListener>;
        el.add_event_listener("click", weak.clone());
        el.dispatch_event("click", &Value::from(1)).unwrap();
        el.dispatch_event("input", &Value::from(2)).unwrap();
        assert_eq!(rec.0.borrow().len(), 1);

        el.remove_event_listener("click", &weak);
        el.dispatch_event("click", &Value::from(3)).unwrap();
        assert_eq!(rec.0.borrow().len(), 1);
        assert_eq!(el.tag(), Some("button"));
    }
}
