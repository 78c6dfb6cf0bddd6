//! Thread-safe FIFO task queue with blocking consumers and cooperative
//! shutdown.
//!
//! One mutex guards both the pending sequence and the queue state; one
//! condition variable blocks consumers until "non-empty or closed" holds.

use std::collections::VecDeque;
use std::sync::{Condvar, Mutex};

use crate::error::{Cancelled, QueueClosed};
use crate::types::Task;

/// Lifecycle of the queue. Transitions are one-way: `Open` -> `Closing`
/// (tasks still pending at close) -> `Closed`, or `Open` -> `Closed`
/// directly when the queue is empty at close.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueState {
    /// Accepting both push and pop.
    Open,
    /// No new pushes; pending tasks are still handed out.
    Closing,
    /// No new pushes; every pop fails with `Cancelled`.
    Closed,
}

/// A synchronized multi-producer/multi-consumer FIFO queue of tasks.
pub struct TaskQueue {
    inner: Mutex<TaskQueueInner>,
    available: Condvar,
}

struct TaskQueueInner {
    tasks: VecDeque<Task>,
    state: QueueState,
}

impl TaskQueue {
    /// Create an empty, open task queue.
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(TaskQueueInner {
                tasks: VecDeque::new(),
                state: QueueState::Open,
            }),
            available: Condvar::new(),
        }
    }

    /// Append a task and wake one blocked consumer.
    ///
    /// Once the queue has left `Open` the task is handed back inside
    /// [`QueueClosed`] so the producer can drop or redirect it.
    pub fn push(&self, task: Task) -> Result<(), QueueClosed> {
        let mut guard = self.inner.lock().expect("task queue mutex poisoned");
        if guard.state != QueueState::Open {
            return Err(QueueClosed(task));
        }
        guard.tasks.push_back(task);
        // One waiter is enough: consumers re-check the predicate on wakeup.
        self.available.notify_one();
        Ok(())
    }

    /// Try to pop immediately without blocking, regardless of state.
    pub fn try_pop(&self) -> Option<Task> {
        let mut guard = self.inner.lock().expect("task queue mutex poisoned");
        guard.tasks.pop_front()
    }

    /// Block until a task is available or the queue is closed and drained.
    ///
    /// Pending tasks are still delivered while `Closing`; `Cancelled` is
    /// only returned once the queue is empty and no longer `Open`.
    pub fn pop_blocking(&self) -> Result<Task, Cancelled> {
        let mut guard = self.inner.lock().expect("task queue mutex poisoned");
        loop {
            if let Some(task) = guard.tasks.pop_front() {
                return Ok(task);
            }
            match guard.state {
                QueueState::Open => {
                    // Wait releases the lock and re-acquires it before
                    // returning; the loop re-checks the predicate because a
                    // competing consumer may have claimed the new head.
                    guard = self.available.wait(guard).expect("condvar wait failed");
                }
                QueueState::Closing => {
                    guard.state = QueueState::Closed;
                    return Err(Cancelled);
                }
                QueueState::Closed => return Err(Cancelled),
            }
        }
    }

    /// Stop accepting new tasks and wake all blocked consumers.
    ///
    /// Idempotent and one-way. Tasks already accepted are drained to
    /// consumers before any of them observes `Cancelled`.
    pub fn close(&self) {
        let mut guard = self.inner.lock().expect("task queue mutex poisoned");
        if guard.state != QueueState::Open {
            return;
        }
        guard.state = if guard.tasks.is_empty() {
            QueueState::Closed
        } else {
            QueueState::Closing
        };
        // Broadcast: a single wake could strand other blocked consumers.
        self.available.notify_all();
    }

    /// Current number of queued tasks.
    pub fn len(&self) -> usize {
        let guard = self.inner.lock().expect("task queue mutex poisoned");
        guard.tasks.len()
    }

    /// Snapshot of the queue lifecycle state.
    #[allow(dead_code)]
    pub fn state(&self) -> QueueState {
        let guard = self.inner.lock().expect("task queue mutex poisoned");
        guard.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::mpsc;
    use std::sync::{Arc, Barrier, Mutex};
    use std::thread;
    use std::time::Duration;

    fn noop_task(id: u64) -> Task {
        Task::new(id, format!("task-{id}"), || Ok(()))
    }

    #[test]
    fn tasks_are_consumed_once() {
        let queue = Arc::new(TaskQueue::new());
        let total_tasks = 100;
        for id in 0..total_tasks {
            queue.push(noop_task(id)).expect("task queue closed");
        }

        let consumers = 4;
        let barrier = Arc::new(Barrier::new(consumers));
        let seen: Arc<Mutex<HashSet<u64>>> = Arc::new(Mutex::new(HashSet::new()));

        let mut handles = Vec::new();
        for _ in 0..consumers {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            let seen = Arc::clone(&seen);
            handles.push(thread::spawn(move || {
                barrier.wait();
                loop {
                    match queue.try_pop() {
                        Some(task) => {
                            let mut guard = seen.lock().expect("seen mutex poisoned");
                            // Each task id should be observed at most once.
                            assert!(guard.insert(task.id));
                        }
                        None => break,
                    }
                }
            }));
        }

        for handle in handles {
            handle.join().expect("consumer thread panicked");
        }

        let guard = seen.lock().expect("seen mutex poisoned");
        assert_eq!(guard.len(), total_tasks as usize);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn pop_blocking_wakes_on_push() {
        let queue = Arc::new(TaskQueue::new());
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::channel();

        let queue_clone = Arc::clone(&queue);
        let handle = thread::spawn(move || {
            ready_tx.send(()).expect("send ready");
            let task = queue_clone.pop_blocking().expect("task queue cancelled");
            tx.send(task.id).expect("send task id");
        });

        ready_rx
            .recv_timeout(Duration::from_secs(1))
            .expect("ready");
        // Pushing after the consumer blocks should wake it.
        queue.push(noop_task(99)).expect("task queue closed");

        let received = rx
            .recv_timeout(Duration::from_secs(1))
            .expect("receive task id");
        assert_eq!(received, 99);
        handle.join().expect("blocking pop thread panicked");
    }

    #[test]
    fn blocking_consumers_each_get_unique_task() {
        let queue = Arc::new(TaskQueue::new());
        let consumers = 4;
        let barrier = Arc::new(Barrier::new(consumers));
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let mut handles = Vec::new();
        for _ in 0..consumers {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            let ready_tx = ready_tx.clone();
            let done_tx = done_tx.clone();
            handles.push(thread::spawn(move || {
                barrier.wait();
                ready_tx.send(()).expect("ready");
                let task = queue.pop_blocking().expect("task queue cancelled");
                done_tx.send(task.id).expect("done");
            }));
        }

        for _ in 0..consumers {
            ready_rx
                .recv_timeout(Duration::from_secs(1))
                .expect("ready recv");
        }

        // Provide exactly one task per consumer.
        for id in 0..consumers as u64 {
            queue.push(noop_task(id)).expect("task queue closed");
        }

        let mut seen = HashSet::new();
        for _ in 0..consumers {
            let id = done_rx
                .recv_timeout(Duration::from_secs(1))
                .expect("done recv");
            assert!(seen.insert(id));
        }

        for handle in handles {
            handle.join().expect("consumer thread panicked");
        }
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn fifo_order_is_preserved_for_a_single_consumer() {
        let queue = TaskQueue::new();
        for id in 0..5 {
            queue.push(noop_task(id)).expect("task queue closed");
        }
        for expected in 0..5 {
            let task = queue.pop_blocking().expect("task queue cancelled");
            assert_eq!(task.id, expected);
        }
    }

    #[test]
    fn close_releases_all_blocked_consumers() {
        let queue = Arc::new(TaskQueue::new());
        let consumers = 4;
        let (ready_tx, ready_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel();

        let mut handles = Vec::new();
        for _ in 0..consumers {
            let queue = Arc::clone(&queue);
            let ready_tx = ready_tx.clone();
            let done_tx = done_tx.clone();
            handles.push(thread::spawn(move || {
                ready_tx.send(()).expect("ready");
                let result = queue.pop_blocking();
                done_tx.send(result.is_err()).expect("done");
            }));
        }

        for _ in 0..consumers {
            ready_rx
                .recv_timeout(Duration::from_secs(1))
                .expect("ready recv");
        }
        queue.close();

        // Every blocked consumer must observe Cancelled within bounded time.
        for _ in 0..consumers {
            let cancelled = done_rx
                .recv_timeout(Duration::from_secs(1))
                .expect("done recv");
            assert!(cancelled);
        }
        for handle in handles {
            handle.join().expect("consumer thread panicked");
        }
        assert_eq!(queue.state(), QueueState::Closed);
    }

    #[test]
    fn close_drains_pending_then_cancels() {
        let queue = TaskQueue::new();
        queue.push(noop_task(1)).expect("task queue closed");
        queue.push(noop_task(2)).expect("task queue closed");

        queue.close();
        assert_eq!(queue.state(), QueueState::Closing);

        // Tasks accepted before close are still delivered in order.
        assert_eq!(queue.pop_blocking().expect("drained task").id, 1);
        assert_eq!(queue.pop_blocking().expect("drained task").id, 2);
        assert_eq!(queue.pop_blocking().expect_err("queue drained"), Cancelled);
        assert_eq!(queue.state(), QueueState::Closed);
    }

    #[test]
    fn push_fails_after_close_and_returns_the_task() {
        let queue = TaskQueue::new();
        queue.close();
        let rejected = queue.push(noop_task(7)).expect_err("push should fail");
        assert_eq!(rejected.0.id, 7);
        assert_eq!(rejected.0.name, "task-7");
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn close_is_idempotent() {
        let queue = TaskQueue::new();
        queue.push(noop_task(1)).expect("task queue closed");
        queue.close();
        queue.close();
        assert_eq!(queue.state(), QueueState::Closing);
        assert_eq!(queue.pop_blocking().expect("drained task").id, 1);
        assert_eq!(queue.pop_blocking().expect_err("queue drained"), Cancelled);
    }
}
