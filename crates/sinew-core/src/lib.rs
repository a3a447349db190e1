#![forbid(unsafe_code)]

//! Core: dynamic values, native collections, scopes, and errors.
//!
//! Everything in this crate is single-threaded (`Rc`/`RefCell`). Objects and
//! collections never own the observers watching them; they hold `Weak` hooks
//! that are pruned lazily once the observer is dropped.

pub mod collections;
pub mod error;
pub mod function;
pub mod object;
pub mod scope;
pub mod tracking;
pub mod value;

pub use collections::{
    Array, ArrayChange, ArrayHook, ArrayOp, Comparator, KeyedChange, KeyedHook, Map, MapOp, Set,
    SetOp,
};
pub use error::{Error, Result};
pub use function::Function;
pub use object::{EventListener, Getter, Object, PropertyHook, Setter};
pub use scope::Scope;
pub use value::{Value, ValueKey};

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Allocate a process-unique identity for an object or collection.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}
