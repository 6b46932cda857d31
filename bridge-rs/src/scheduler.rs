//! Host task scheduler: deferred callbacks.
//!
//! Tasks queued with [`TaskScheduler::delayed`] run on the next turn of the
//! host loop, never synchronously.  Window teardown goes here so nothing is
//! destroyed while its own handlers are still on the call stack.
//!
//! The host loop calls [`TaskScheduler::run_pending`] after every unit of
//! work:
//!
//! ```rust,ignore
//! while let Some(line) = lines.recv().await {
//!     engine.eval(&line);
//!     bridge.scheduler().run_pending();
//! }
//! ```

use std::cell::RefCell;
use std::collections::VecDeque;

pub type Task = Box<dyn FnOnce()>;

// ── TaskScheduler ─────────────────────────────────────────────────────────────

#[derive(Default)]
pub struct TaskScheduler {
    idle: RefCell<VecDeque<Task>>,
}

impl TaskScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` once, on the next turn of the host loop.
    pub fn delayed(&self, task: impl FnOnce() + 'static) {
        self.idle.borrow_mut().push_back(Box::new(task));
        tracing::trace!(target: "scheduler", queued = self.len(), "task queued");
    }

    pub fn is_empty(&self) -> bool {
        self.idle.borrow().is_empty()
    }

    pub fn len(&self) -> usize {
        self.idle.borrow().len()
    }

    /// Run every task queued before this call.  Tasks queued while these run
    /// wait for the next turn.
    ///
    /// Returns the number of tasks run.
    pub fn run_pending(&self) -> usize {
        let tasks: Vec<Task> = self.idle.borrow_mut().drain(..).collect();
        let count = tasks.len();
        for task in tasks {
            task();
        }
        if count > 0 {
            tracing::debug!(target: "scheduler", count, "ran pending tasks");
        }
        count
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
