//! Observation: observers, index maps, batching, and dependency tracking.
//!
//! - [`ObserverLocator`]: hands out the observer for a `(target, key)` pair
//!   or for a whole collection, caching them non-owningly.
//! - [`SetterObserver`], [`ComputedObserver`], [`CollectionLengthObserver`],
//!   [`PrimitiveObserver`]: property observers ([`Observer`]).
//! - [`ArrayObserver`], [`MapObserver`], [`SetObserver`]: collection observers
//!   ([`CollectionObserver`]) delivering [`IndexMap`]s.
//! - [`batch`]: coalesces notifications until the outermost scope exits.
//! - [`ObserverRecord`] / [`Connector`]: version-stamped dependency tracking
//!   for anything that evaluates expressions.
//!
//! # Architecture
//!
//! Everything is single-threaded. Observers hold their subscribers as `Weak`
//! and objects/collections hold observers as `Weak` hooks, so lifetimes flow
//! one way: bindings own the observers they depend on, nothing owns the
//! bindings except the caller.
//!
//! # Invariants
//!
//! 1. A delivered index map has the length of the collection at delivery
//!    time, and no original index appears twice in it.
//! 2. Inside a batch each observer notifies at most once, when the outermost
//!    scope exits, and not at all if the net effect is nothing.
//! 3. Subscribing the same subscriber twice delivers once.
//! 4. A subscriber removed mid-pass is not called later in that pass.
//! 5. Every live subscriber is called even if an earlier one fails; the
//!    first error is returned.

pub mod array;
pub mod batch;
pub mod computed;
pub mod connectable;
pub mod index_map;
pub mod keyed;
pub mod length;
pub mod locator;
pub mod observer;
pub mod property;
pub mod subscriber;

pub use array::ArrayObserver;
pub use batch::{BatchScope, Flush, batch, is_batching, try_batch};
pub use computed::ComputedObserver;
pub use connectable::{Connectable, Connector, Dependency, ObserverRecord};
pub use index_map::{
    CREATED, IndexMap, apply_mutations_to_indices, copy_index_map, synchronize_indices,
};
pub use keyed::{KeyedCollection, KeyedObserver, MapObserver, SetObserver};
pub use length::{CollectionLengthObserver, LengthSource};
pub use locator::ObserverLocator;
pub use observer::{CollectionObserver, Observer};
pub use property::{PrimitiveObserver, SetterObserver};
pub use subscriber::{CollectionSubscriber, Subscriber, SubscriberSet};
