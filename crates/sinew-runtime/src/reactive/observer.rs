//! Observer traits.

use std::rc::Weak;

use sinew_core::{Result, Value};

use super::subscriber::{CollectionSubscriber, Subscriber};
use crate::flags::{AccessorType, LifecycleFlags};

/// Observer of one property of one target.
pub trait Observer {
    /// Current value of the observed property. Never tracked.
    fn get_value(&self) -> Value;

    /// Write the observed property.
    fn set_value(&self, value: Value, flags: LifecycleFlags) -> Result<()>;

    /// Returns `false` if `subscriber` was already subscribed.
    fn subscribe(&self, subscriber: Weak<dyn Subscriber>) -> bool;

    /// Returns `false` if `subscriber` was not subscribed.
    fn unsubscribe(&self, subscriber: &Weak<dyn Subscriber>) -> bool;

    fn subscriber_count(&self) -> usize;

    fn accessor_type(&self) -> AccessorType;
}

/// Observer of a whole collection.
pub trait CollectionObserver {
    /// The observed collection.
    fn collection(&self) -> Value;

    fn subscribe(&self, subscriber: Weak<dyn CollectionSubscriber>) -> bool;

    fn unsubscribe(&self, subscriber: &Weak<dyn CollectionSubscriber>) -> bool;

    fn subscriber_count(&self) -> usize;
}
