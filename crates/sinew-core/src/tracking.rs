//! Ambient read tracking.
//!
//! A computed getter is arbitrary code: it reads properties and collections
//! without knowing who is interested. While a [`ReadTracker`] is installed
//! with [`with_tracker`], every [`Object::get`](crate::Object::get) and every
//! tracked collection read reports itself to the innermost tracker on the
//! current thread.
//!
//! Trackers nest. [`untracked`] pushes an empty frame so that reads inside it
//! are invisible to the enclosing tracker.

use std::cell::RefCell;
use std::rc::Rc;

use crate::object::Object;
use crate::value::Value;

/// Receiver of reads performed while it is the innermost tracker.
pub trait ReadTracker {
    fn track_property(&self, object: &Rc<Object>, key: &str);
    fn track_collection(&self, collection: &Value);
}

thread_local! {
    static STACK: RefCell<Vec<Option<Rc<dyn ReadTracker>>>> = const { RefCell::new(Vec::new()) };
}

/// Pops the frame pushed by `enter` even if the closure unwinds.
struct Frame;

impl Frame {
    fn enter(tracker: Option<Rc<dyn ReadTracker>>) -> Self {
        STACK.with(|stack| stack.borrow_mut().push(tracker));
        Self
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}

fn current() -> Option<Rc<dyn ReadTracker>> {
    STACK.with(|stack| stack.borrow().last().cloned().flatten())
}

/// Run `f` with `tracker` receiving all reads it performs.
pub fn with_tracker<R>(tracker: Rc<dyn ReadTracker>, f: impl FnOnce() -> R) -> R {
    let _frame = Frame::enter(Some(tracker));
    f()
}

/// Run `f` with read tracking suspended.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let _frame = Frame::enter(None);
    f()
}

/// Whether a tracker is currently receiving reads.
#[must_use]
pub fn is_tracking() -> bool {
    current().is_some()
}

pub(crate) fn track_property(object: &Rc<Object>, key: &str) {
    if let Some(tracker) = current() {
        tracker.track_property(object, key);
    }
}

pub(crate) fn track_collection(collection: Value) {
    if let Some(tracker) = current() {
        tracker.track_collection(&collection);
    }
}
