//! Typed outcomes for the expected failure modes of the queue and pool.

use thiserror::Error;

use crate::types::Task;

/// Returned by `TaskQueue::push` once the queue stops accepting work.
///
/// Carries the rejected task back so the producer can drop or redirect it.
#[derive(Debug, Error)]
#[error("task queue is closed")]
pub struct QueueClosed(pub Task);

/// Returned by `TaskQueue::pop_blocking` once the queue is closed and empty.
///
/// This is the expected termination signal for a worker loop, not a fault.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("task queue cancelled")]
pub struct Cancelled;

/// Failure raised by a task's action during execution.
///
/// Isolated per task: a worker reports it and moves on to the next item.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TaskFailure(pub String);

impl TaskFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Advisory condition from `WorkerPool::shutdown` when the drain wait
/// elapses before every worker stops. Remaining workers finish their
/// current task and exit on their own.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("shutdown timed out with {running} of {total} workers still running")]
pub struct ShutdownTimeout {
    pub running: usize,
    pub total: usize,
}
