//! Shared identifiers and the task model used across the system.

use std::fmt;

use crate::error::TaskFailure;

/// Unique identifier for a task in the queue.
pub type TaskId = u64;
/// Index of a worker thread within its pool.
pub type WorkerId = usize;

/// Executable body of a task, run exactly once by the worker that claims it.
pub type TaskAction = Box<dyn FnOnce() -> Result<(), TaskFailure> + Send + 'static>;

/// Unit of work handed from producers to workers.
///
/// Immutable once built; owned by the queue while pending and by exactly
/// one worker while executing.
pub struct Task {
    /// Stable task identifier for logging and validation.
    pub id: TaskId,
    /// Human-readable description for demo output.
    pub name: String,
    action: TaskAction,
}

impl Task {
    /// Construct a new task with the provided id, name, and action.
    pub fn new(
        id: TaskId,
        name: impl Into<String>,
        action: impl FnOnce() -> Result<(), TaskFailure> + Send + 'static,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            action: Box::new(action),
        }
    }

    /// Execute the task's action, consuming the task.
    pub fn run(self) -> Result<(), TaskFailure> {
        (self.action)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}
