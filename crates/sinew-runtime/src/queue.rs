//! Deferred write queue.
//!
//! Layout-affecting target writes are not applied synchronously; they are
//! queued here and applied when the host calls [`TaskQueue::flush`] at its
//! end-of-turn checkpoint. Every queued task is cancellable through the
//! returned [`TaskHandle`].
//!
//! # Invariants
//!
//! 1. Tasks run in queue order, each at most once.
//! 2. A cancelled task never runs.
//! 3. Tasks queued while a flush is running are deferred to the next flush.
//! 4. A failing task does not prevent the rest of the flush; the first
//!    error is returned.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use sinew_core::Result;
use sinew_core::error::keep_first;

type TaskFn = Box<dyn FnOnce() -> Result<()>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Canceled,
}

struct Task {
    id: u64,
    status: Cell<TaskStatus>,
    callback: RefCell<Option<TaskFn>>,
}

/// Handle to a queued task.
#[derive(Clone)]
pub struct TaskHandle {
    task: Rc<Task>,
}

impl TaskHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.task.id
    }

    #[must_use]
    pub fn status(&self) -> TaskStatus {
        self.task.status.get()
    }

    /// Cancel the task if it has not started. Returns whether it was pending.
    pub fn cancel(&self) -> bool {
        if self.task.status.get() != TaskStatus::Pending {
            return false;
        }
        self.task.status.set(TaskStatus::Canceled);
        self.task.callback.borrow_mut().take();
        tracing::trace!(message = "queue.cancel", task = self.task.id);
        true
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("id", &self.task.id)
            .field("status", &self.task.status.get())
            .finish()
    }
}

#[derive(Default)]
pub struct TaskQueue {
    tasks: RefCell<VecDeque<Rc<Task>>>,
    next_id: Cell<u64>,
}

impl TaskQueue {
    #[must_use]
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    pub fn queue_task(&self, callback: impl FnOnce() -> Result<()> + 'static) -> TaskHandle {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let task = Rc::new(Task {
            id,
            status: Cell::new(TaskStatus::Pending),
            callback: RefCell::new(Some(Box::new(callback))),
        });
        self.tasks.borrow_mut().push_back(Rc::clone(&task));
        TaskHandle { task }
    }

    /// Number of tasks still waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks
            .borrow()
            .iter()
            .filter(|t| t.status.get() == TaskStatus::Pending)
            .count()
    }

    /// Run every task queued before this call.
    pub fn flush(&self) -> Result<()> {
        let batch: Vec<Rc<Task>> = self.tasks.borrow_mut().drain(..).collect();
        let mut first = None;
        let mut ran = 0usize;
        for task in batch {
            if task.status.get() != TaskStatus::Pending {
                continue;
            }
            let Some(callback) = task.callback.borrow_mut().take() else {
                continue;
            };
            task.status.set(TaskStatus::Running);
            let outcome = callback();
            task.status.set(TaskStatus::Completed);
            ran += 1;
            if let Err(err) = outcome
                && !keep_first(&mut first, err.clone())
            {
                tracing::warn!(message = "queue.task_error", task = task.id, error = %err);
            }
        }
        tracing::trace!(message = "queue.flush", ran, deferred = self.tasks.borrow().len());
        first.map_or(Ok(()), Err)
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue")
            .field("pending", &self.pending())
            .finish()
    }
}
