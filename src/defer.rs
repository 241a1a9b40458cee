//! Deferred task execution seam.
//!
//! Every asynchronous re-entry into the coordinator (flush completion
//! hand-off, recording restart, late delivery of a stored payload) goes
//! through a [`TaskQueue`]. The contract is deferred-never-inline: `defer`
//! must return before the task runs, so callers observe uniform timing
//! whether data was live or already available.

use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;

/// A deferred unit of work.
pub type Task = Box<dyn FnOnce() + Send>;

/// Defers tasks for later execution on the embedder's control thread.
///
/// Implementations must never run the task inside `defer` itself. Beyond
/// that, ordering across tasks is implementation-defined; the coordinator
/// only ever relies on eventual execution.
pub trait TaskQueue: Send + Sync {
    /// Enqueues `task` to run later.
    fn defer(&self, task: Task);
}

/// A FIFO task queue stepped by hand.
///
/// Suits tests and simple single-threaded embeddings: enqueue from anywhere,
/// then drain on the control thread with [`run_until_idle`](Self::run_until_idle).
#[derive(Default)]
pub struct StepQueue {
    tasks: Mutex<VecDeque<Task>>,
}

impl StepQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of tasks currently queued.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Runs one queued task, if any. Returns `true` if a task ran.
    pub fn run_one(&self) -> bool {
        // Pop under the lock, run after release, so a task may defer more work.
        let task = self.tasks.lock().pop_front();
        match task {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs queued tasks until the queue is empty, including tasks queued by
    /// tasks. Returns the number of tasks executed.
    pub fn run_until_idle(&self) -> usize {
        let mut executed = 0;
        while self.run_one() {
            executed += 1;
        }
        executed
    }
}

impl TaskQueue for StepQueue {
    fn defer(&self, task: Task) {
        self.tasks.lock().push_back(task);
    }
}

impl fmt::Debug for StepQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StepQueue")
            .field("pending", &self.pending())
            .finish()
    }
}
