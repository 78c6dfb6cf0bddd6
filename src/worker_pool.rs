//! Fixed-size pool of worker threads draining one shared task queue, plus
//! the cooperative shutdown controller.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::error::ShutdownTimeout;
use crate::log_dev;
use crate::task_queue::TaskQueue;
use crate::types::WorkerId;

/// Counts workers that have observed `Cancelled` and exited their loop.
struct StopLatch {
    stopped: Mutex<usize>,
    all_stopped: Condvar,
}

impl StopLatch {
    fn new() -> Self {
        Self {
            stopped: Mutex::new(0),
            all_stopped: Condvar::new(),
        }
    }

    fn arrive(&self) {
        let mut guard = self.stopped.lock().expect("stop latch mutex poisoned");
        *guard += 1;
        self.all_stopped.notify_all();
    }

    /// Wait until `total` workers have arrived; returns the count actually
    /// observed when the wait ends.
    fn wait(&self, total: usize, timeout: Option<Duration>) -> usize {
        let guard = self.stopped.lock().expect("stop latch mutex poisoned");
        match timeout {
            None => {
                let guard = self
                    .all_stopped
                    .wait_while(guard, |stopped| *stopped < total)
                    .expect("condvar wait failed");
                *guard
            }
            Some(limit) => {
                let (guard, _) = self
                    .all_stopped
                    .wait_timeout_while(guard, limit, |stopped| *stopped < total)
                    .expect("condvar wait failed");
                *guard
            }
        }
    }
}

/// Task counts observed by a pool over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolReport {
    /// Tasks whose action completed successfully.
    pub executed: usize,
    /// Tasks whose action returned an error or panicked.
    pub failed: usize,
}

/// A fixed set of symmetric worker threads bound to one queue instance.
///
/// The pool size is set at construction; workers are interchangeable and
/// have no affinity to any task.
pub struct WorkerPool {
    queue: Arc<TaskQueue>,
    workers: usize,
    handles: Vec<JoinHandle<()>>,
    latch: Arc<StopLatch>,
    executed: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
}

impl WorkerPool {
    /// Start `workers` worker loops draining `queue`.
    pub fn spawn(workers: usize, queue: Arc<TaskQueue>) -> Self {
        let latch = Arc::new(StopLatch::new());
        let executed = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = Arc::clone(&queue);
            let latch = Arc::clone(&latch);
            let executed = Arc::clone(&executed);
            let failed = Arc::clone(&failed);
            let handle = thread::Builder::new()
                .name(format!("worker-{worker_id}"))
                .spawn(move || worker_loop(worker_id, &queue, &executed, &failed, &latch))
                .expect("failed to spawn worker thread");
            handles.push(handle);
        }

        Self {
            queue,
            workers,
            handles,
            latch,
            executed,
            failed,
        }
    }

    /// Number of worker threads started at construction.
    pub fn worker_count(&self) -> usize {
        self.workers
    }

    /// Tasks completed successfully so far.
    pub fn executed_tasks(&self) -> usize {
        self.executed.load(Ordering::SeqCst)
    }

    /// Tasks that failed or panicked so far.
    pub fn failed_tasks(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    /// Workers that have exited their loop so far.
    pub fn stopped_workers(&self) -> usize {
        *self.latch.stopped.lock().expect("stop latch mutex poisoned")
    }

    /// Close the queue and wait for every worker to stop.
    ///
    /// Closing is idempotent and never interrupts a task mid-execution:
    /// workers finish their current task, drain whatever was already
    /// accepted, then observe `Cancelled` and exit. With `timeout` set, a
    /// wait that elapses first reports [`ShutdownTimeout`]; the remaining
    /// workers keep running to completion on their own and a later call can
    /// wait for them again.
    pub fn shutdown(&mut self, timeout: Option<Duration>) -> Result<PoolReport, ShutdownTimeout> {
        self.queue.close();
        let total = self.workers;
        let stopped = self.latch.wait(total, timeout);
        if stopped < total {
            return Err(ShutdownTimeout {
                running: total - stopped,
                total,
            });
        }
        for handle in self.handles.drain(..) {
            handle.join().expect("worker thread panicked");
        }
        Ok(PoolReport {
            executed: self.executed.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
        })
    }
}

fn worker_loop(
    worker_id: WorkerId,
    queue: &TaskQueue,
    executed: &AtomicUsize,
    failed: &AtomicUsize,
    latch: &StopLatch,
) {
    // Cancelled is the expected way out of this loop, not a fault.
    while let Ok(task) = queue.pop_blocking() {
        let task_id = task.id;
        let task_name = task.name.clone();
        log_dev!("[WORKER] fetched task {task_id} ({task_name})");
        // The queue lock is long released here; execution never blocks
        // producers or other workers.
        match panic::catch_unwind(AssertUnwindSafe(|| task.run())) {
            Ok(Ok(())) => {
                executed.fetch_add(1, Ordering::SeqCst);
            }
            Ok(Err(failure)) => {
                failed.fetch_add(1, Ordering::SeqCst);
                log_dev!("[WORKER] task {task_id} ({task_name}) failed: {failure}");
            }
            Err(_) => {
                failed.fetch_add(1, Ordering::SeqCst);
                log_dev!("[WORKER] task {task_id} ({task_name}) panicked");
            }
        }
    }
    log_dev!("[WORKER] worker-{worker_id} stopped");
    latch.arrive();
}
