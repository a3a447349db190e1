//! Batch coordinator.
//!
//! A batch is a dynamically scoped section during which observers record
//! changes instead of notifying. Nested batches flatten: only when the
//! outermost scope ends do the queued observers flush, each delivering at
//! most one notification describing the net effect.
//!
//! # Invariants
//!
//! 1. Observers are enqueued at most once per batch (they track their own
//!    `queued` flag).
//! 2. Flushing happens with the depth back at zero, so changes made by
//!    subscribers during the flush are delivered immediately.
//! 3. A scope dropped while unwinding discards pending bookkeeping without
//!    notifying anyone.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;
use std::rc::Rc;

use sinew_core::{Error, Result};

/// Something that deferred its notification until the end of a batch.
pub trait Flush {
    /// Deliver the pending notification, if the net effect is a change.
    fn flush(&self) -> Result<()>;
    /// Drop pending state without notifying.
    fn discard(&self);
}

thread_local! {
    static DEPTH: Cell<u32> = const { Cell::new(0) };
    static QUEUE: RefCell<Vec<Rc<dyn Flush>>> = const { RefCell::new(Vec::new()) };
}

/// Whether a batch is open on this thread.
#[must_use]
pub fn is_batching() -> bool {
    DEPTH.with(Cell::get) > 0
}

/// Queue `item` for the end of the current batch.
pub(crate) fn enqueue(item: Rc<dyn Flush>) {
    QUEUE.with(|queue| queue.borrow_mut().push(item));
}

/// RAII batch scope.
///
/// Prefer [`BatchScope::finish`] so flush errors can be observed; a scope
/// that is merely dropped still flushes but can only log errors.
#[must_use = "dropping a BatchScope immediately ends the batch"]
pub struct BatchScope {
    finished: bool,
    _not_send: PhantomData<Rc<()>>,
}

impl BatchScope {
    pub fn enter() -> Self {
        DEPTH.with(|depth| depth.set(depth.get() + 1));
        Self {
            finished: false,
            _not_send: PhantomData,
        }
    }

    /// End this scope. The outermost scope flushes every queued observer.
    pub fn finish(mut self) -> Result<()> {
        self.finished = true;
        exit()
    }
}

impl Drop for BatchScope {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if std::thread::panicking() {
            let depth = DEPTH.with(|depth| {
                let next = depth.get().saturating_sub(1);
                depth.set(next);
                next
            });
            if depth == 0 {
                let pending = QUEUE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
                for item in pending {
                    item.discard();
                }
            }
            return;
        }
        tracing::warn!(message = "batch.unfinished");
        if let Err(err) = exit() {
            tracing::warn!(message = "batch.flush_error", error = %err);
        }
    }
}

fn exit() -> Result<()> {
    let depth = DEPTH.with(|depth| {
        let next = depth.get().saturating_sub(1);
        depth.set(next);
        next
    });
    if depth > 0 {
        return Ok(());
    }

    let mut first: Option<Error> = None;
    let mut flushed = 0usize;
    loop {
        let pending = QUEUE.with(|queue| std::mem::take(&mut *queue.borrow_mut()));
        if pending.is_empty() {
            break;
        }
        for item in pending {
            flushed += 1;
            if let Err(err) = item.flush() {
                if first.is_none() {
                    first = Some(err);
                } else {
                    tracing::warn!(message = "batch.flush_error", error = %err);
                }
            }
        }
    }
    tracing::trace!(message = "batch.flush", observers = flushed);
    first.map_or(Ok(()), Err)
}

/// Run `f` inside a batch.
pub fn batch<R>(f: impl FnOnce() -> R) -> Result<R> {
    let scope = BatchScope::enter();
    let out = f();
    scope.finish()?;
    Ok(out)
}

/// Run a fallible `f` inside a batch.
///
/// Queued observers flush even when `f` fails, since the mutations it made
/// before failing did happen; `f`'s error takes precedence.
pub fn try_batch<R>(f: impl FnOnce() -> Result<R>) -> Result<R> {
    let scope = BatchScope::enter();
    let out = f();
    let flushed = scope.finish();
    let out = out?;
    flushed?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Probe {
        flushed: Cell<u32>,
        discarded: Cell<u32>,
        queued: Cell<bool>,
    }

    impl Probe {
        fn new() -> Rc<Self> {
            Rc::new(Self {
                flushed: Cell::new(0),
                discarded: Cell::new(0),
                queued: Cell::new(false),
            })
        }

        fn touch(self: &Rc<Self>) {
            if !self.queued.replace(true) {
                enqueue(Rc::clone(self) as Rc<dyn Flush>);
            }
        }
    }

    impl Flush for Probe {
        fn flush(&self) -> Result<()> {
            self.queued.set(false);
            self.flushed.set(self.flushed.get() + 1);
            Ok(())
        }

        fn discard(&self) {
            self.queued.set(false);
            self.discarded.set(self.discarded.get() + 1);
        }
    }

    #[test]
    fn nested_batches_flush_once_at_outermost() {
        let probe = Probe::new();
        batch(|| {
            probe.touch();
            batch(|| probe.touch()).unwrap();
            assert_eq!(probe.flushed.get(), 0);
            assert!(is_batching());
        })
        .unwrap();
        assert_eq!(probe.flushed.get(), 1);
        assert!(!is_batching());
    }

    #[test]
    fn try_batch_prefers_closure_error() {
        let probe = Probe::new();
        let out: Result<()> = try_batch(|| {
            probe.touch();
            Err(Error::thrown("inner"))
        });
        assert_eq!(out, Err(Error::thrown("inner")));
        assert_eq!(probe.flushed.get(), 1);
    }

    #[test]
    fn dropped_scope_still_flushes() {
        let probe = Probe::new();
        {
            let _scope = BatchScope::enter();
            probe.touch();
        }
        assert_eq!(probe.flushed.get(), 1);
    }

    #[test]
    fn panicking_scope_discards() {
        let probe = Probe::new();
        let p = Rc::clone(&probe);
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _scope = BatchScope::enter();
            p.touch();
            panic!("boom");
        }));
        assert!(result.is_err());
        assert_eq!(probe.flushed.get(), 0);
        assert_eq!(probe.discarded.get(), 1);
        assert!(!is_batching());
    }
}
