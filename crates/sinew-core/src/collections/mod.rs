//! Native collections with interceptable mutations.
//!
//! Every mutating operation is described by an op value ([`ArrayOp`],
//! [`MapOp`], [`SetOp`]) and performed through the collection's `apply`
//! method. `apply` runs the native operation first, then reports the
//! resulting structural change to each installed hook. The `via` argument
//! lets an observer that is *not* installed (explicit observation) route a
//! mutation through itself and still hear about it.

mod array;
mod keyed;

pub use array::{Array, ArrayChange, ArrayHook, ArrayOp, Comparator};
pub use keyed::{KeyedChange, KeyedHook, Map, MapOp, Set, SetOp};

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use crate::error::{Error, Result};

pub(crate) fn install<H: ?Sized>(hooks: &RefCell<Vec<Weak<H>>>, hook: Weak<H>) {
    let mut hooks = hooks.borrow_mut();
    hooks.retain(|h| h.strong_count() > 0);
    if !hooks.iter().any(|h| Weak::ptr_eq(h, &hook)) {
        hooks.push(hook);
    }
}

pub(crate) fn uninstall<H: ?Sized>(hooks: &RefCell<Vec<Weak<H>>>, hook: &Weak<H>) {
    hooks
        .borrow_mut()
        .retain(|h| h.strong_count() > 0 && !Weak::ptr_eq(h, hook));
}

pub(crate) fn live_count<H: ?Sized>(hooks: &RefCell<Vec<Weak<H>>>) -> usize {
    hooks.borrow().iter().filter(|h| h.strong_count() > 0).count()
}

/// Deliver one change to every installed hook plus `via` (unless `via` is
/// already installed). Delivery continues past failures; the first error is
/// returned.
pub(crate) fn deliver<H: ?Sized>(
    hooks: &RefCell<Vec<Weak<H>>>,
    via: Option<&H>,
    mut notify: impl FnMut(&H) -> Result<()>,
) -> Result<()> {
    let live: Vec<Rc<H>> = hooks.borrow().iter().filter_map(Weak::upgrade).collect();
    let mut first = None;
    for hook in &live {
        if let Err(err) = notify(&**hook) {
            record(&mut first, err);
        }
    }
    if let Some(via) = via {
        let installed = live
            .iter()
            .any(|h| std::ptr::addr_eq(Rc::as_ptr(h), via as *const H));
        if !installed {
            if let Err(err) = notify(via) {
                record(&mut first, err);
            }
        }
    }
    first.map_or(Ok(()), Err)
}

fn record(first: &mut Option<Error>, err: Error) {
    if first.is_none() {
        *first = Some(err);
    } else {
        #[cfg(feature = "tracing")]
        tracing::warn!(message = "collection.hook_error", error = %err);
    }
}
