//! Demo, benchmark, and stress-test runners driving the queue and pool.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::error::TaskFailure;
use crate::log_dev;
use crate::task_queue::TaskQueue;
use crate::types::{Task, TaskId};
use crate::worker_pool::{PoolReport, WorkerPool};

// Demo knobs (small for quick CLI feedback).
const DEMO_WORKERS: usize = 5;
const DEMO_TASKS: u64 = 10;
const DEMO_ENQUEUE_INTERVAL_MS: u64 = 50;
const DEMO_WORK_MS: u64 = 20;
// One demo task fails on purpose to show failure isolation.
const DEMO_FAILING_TASK: TaskId = 7;
const DEMO_SHUTDOWN_TIMEOUT_MS: u64 = 2_000;
// Benchmark drain wait (generous to avoid false timeouts on loaded hosts).
const BENCH_SHUTDOWN_TIMEOUT_MS: u64 = 60_000;
// With failure injection on, every Nth task returns an error.
const FAIL_INJECTION_PERIOD: u64 = 10;

/// Best-effort CPU user/system time snapshot (seconds) on Unix platforms.
#[cfg(unix)]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    use libc::{RUSAGE_SELF, getrusage, rusage};
    let mut usage: rusage = unsafe { std::mem::zeroed() };
    let rc = unsafe { getrusage(RUSAGE_SELF, &mut usage) };
    if rc != 0 {
        return None;
    }
    let user = usage.ru_utime.tv_sec as f64 + (usage.ru_utime.tv_usec as f64 / 1_000_000.0);
    let sys = usage.ru_stime.tv_sec as f64 + (usage.ru_stime.tv_usec as f64 / 1_000_000.0);
    Some((user, sys))
}

/// Stub on non-Unix platforms.
#[cfg(not(unix))]
fn cpu_times_seconds() -> Option<(f64, f64)> {
    None
}

fn demo_task(id: TaskId) -> Task {
    Task::new(id, format!("demo-{id}"), move || {
        thread::sleep(Duration::from_millis(DEMO_WORK_MS));
        if id == DEMO_FAILING_TASK {
            return Err(TaskFailure::new("demo task fails on purpose"));
        }
        Ok(())
    })
}

/// Run the default demo: one producer feeding a pool of five workers.
pub fn run_demo() {
    log_dev!("[DEMO] start");

    let queue = Arc::new(TaskQueue::new());
    let mut pool = WorkerPool::spawn(DEMO_WORKERS, Arc::clone(&queue));

    let producer = {
        let queue = Arc::clone(&queue);
        thread::Builder::new()
            .name("producer".to_string())
            .spawn(move || {
                for id in 0..DEMO_TASKS {
                    queue.push(demo_task(id)).expect("task queue closed");
                    log_dev!("[QUEUE] added task {id} (depth={})", queue.len());
                    thread::sleep(Duration::from_millis(DEMO_ENQUEUE_INTERVAL_MS));
                }
                log_dev!("[QUEUE] producer done");
            })
            .expect("failed to spawn producer thread")
    };

    let start = Instant::now();
    producer.join().expect("producer thread panicked");

    let timeout = Duration::from_millis(DEMO_SHUTDOWN_TIMEOUT_MS);
    let (report, clean) = match pool.shutdown(Some(timeout)) {
        Ok(report) => (report, true),
        Err(timed_out) => {
            eprintln!("demo warning: {timed_out}");
            let report = PoolReport {
                executed: pool.executed_tasks(),
                failed: pool.failed_tasks(),
            };
            (report, false)
        }
    };

    // Under the drain policy nothing should be left behind on a clean stop.
    let mut leftover = 0usize;
    while queue.try_pop().is_some() {
        leftover += 1;
    }

    log_dev!(
        "[DEMO] finished in {}ms (dev logs suppressed in release mode)",
        start.elapsed().as_millis()
    );

    println!("DEMO SUMMARY");
    println!("workers={} tasks_total={DEMO_TASKS}", pool.worker_count());
    println!("tasks_executed={}", report.executed);
    println!("task_failures={}", report.failed);
    println!("workers_stopped={}", pool.stopped_workers());
    println!("clean_shutdown={clean}");
    println!("queue_leftover={leftover}");
}

/// Aggregated metrics from a single benchmark run.
struct BenchResult {
    workers: usize,
    tasks_per_producer: usize,
    producers: usize,
    total_tasks: usize,
    elapsed_ms: f64,
    throughput: f64,
    avg_queue_wait_us: f64,
    cpu_user_s: Option<f64>,
    cpu_sys_s: Option<f64>,
    max_queue_depth: usize,
    executed: usize,
    failed: usize,
    duplicate_tasks: bool,
    leftover: usize,
    timed_out: bool,
}

fn benchmark_once(
    workers: usize,
    tasks_per_producer: usize,
    producers: usize,
    work_ms: u64,
    validate: bool,
    inject_failures: bool,
) -> BenchResult {
    debug_assert!(workers > 0, "workers must be > 0");
    debug_assert!(tasks_per_producer > 0, "tasks_per_producer must be > 0");
    debug_assert!(producers > 0, "producers must be > 0");

    let queue = Arc::new(TaskQueue::new());
    let mut pool = WorkerPool::spawn(workers, Arc::clone(&queue));
    let total_tasks = producers * tasks_per_producer;

    // Total enqueue-to-execution wait across all tasks for averaging.
    let queue_wait_us = Arc::new(AtomicU64::new(0));
    let max_queue_depth = Arc::new(AtomicUsize::new(0));
    let duplicate_tasks = Arc::new(AtomicBool::new(false));
    let seen_tasks = if validate {
        Some(Arc::new(Mutex::new(HashSet::new())))
    } else {
        None
    };

    let cpu_start = cpu_times_seconds();
    let start = Instant::now();

    let mut producer_handles = Vec::new();
    for producer_id in 0..producers {
        let queue = Arc::clone(&queue);
        let queue_wait_us = Arc::clone(&queue_wait_us);
        let max_queue_depth = Arc::clone(&max_queue_depth);
        let duplicate_tasks = Arc::clone(&duplicate_tasks);
        let seen_tasks = seen_tasks.as_ref().map(Arc::clone);
        let handle = thread::Builder::new()
            .name(format!("producer-{producer_id}"))
            .spawn(move || {
                for seq in 0..tasks_per_producer {
                    let id = (producer_id * tasks_per_producer + seq) as u64;
                    let queue_wait_us = Arc::clone(&queue_wait_us);
                    let duplicate_tasks = Arc::clone(&duplicate_tasks);
                    let seen_tasks = seen_tasks.as_ref().map(Arc::clone);
                    let fails = inject_failures && id % FAIL_INJECTION_PERIOD == 0;
                    let enqueued_at = Instant::now();
                    let task = Task::new(id, format!("bench-{id}"), move || {
                        let waited = enqueued_at.elapsed().as_micros() as u64;
                        queue_wait_us.fetch_add(waited, Ordering::SeqCst);
                        if let Some(seen) = seen_tasks.as_ref() {
                            let mut guard = seen.lock().expect("seen mutex poisoned");
                            if !guard.insert(id) {
                                duplicate_tasks.store(true, Ordering::SeqCst);
                            }
                        }
                        if work_ms > 0 {
                            thread::sleep(Duration::from_millis(work_ms));
                        }
                        if fails {
                            return Err(TaskFailure::new("injected failure"));
                        }
                        Ok(())
                    });
                    queue.push(task).expect("task queue closed");
                    max_queue_depth.fetch_max(queue.len(), Ordering::SeqCst);
                }
            })
            .expect("failed to spawn producer thread");
        producer_handles.push(handle);
    }

    for handle in producer_handles {
        handle.join().expect("producer thread panicked");
    }

    let timeout = Duration::from_millis(BENCH_SHUTDOWN_TIMEOUT_MS);
    let (executed, failed, timed_out) = match pool.shutdown(Some(timeout)) {
        Ok(report) => (report.executed, report.failed, false),
        Err(timed_out) => {
            log_dev!("[BENCH] {timed_out}");
            (pool.executed_tasks(), pool.failed_tasks(), true)
        }
    };

    // Drain any unexpected leftover tasks for validation reporting.
    let mut leftover = 0usize;
    while queue.try_pop().is_some() {
        leftover += 1;
    }

    let elapsed_ms = start.elapsed().as_millis() as f64;
    let throughput = if elapsed_ms > 0.0 {
        (total_tasks as f64) / (elapsed_ms / 1000.0)
    } else {
        0.0
    };
    let avg_queue_wait = if total_tasks > 0 {
        queue_wait_us.load(Ordering::SeqCst) as f64 / total_tasks as f64
    } else {
        0.0
    };

    let (cpu_user_s, cpu_sys_s) = match (cpu_start, cpu_times_seconds()) {
        (Some((user_start, sys_start)), Some((user_end, sys_end))) => {
            (Some(user_end - user_start), Some(sys_end - sys_start))
        }
        _ => (None, None),
    };

    BenchResult {
        workers,
        tasks_per_producer,
        producers,
        total_tasks,
        elapsed_ms,
        throughput,
        avg_queue_wait_us: avg_queue_wait,
        cpu_user_s,
        cpu_sys_s,
        max_queue_depth: max_queue_depth.load(Ordering::SeqCst),
        executed,
        failed,
        duplicate_tasks: duplicate_tasks.load(Ordering::SeqCst),
        leftover,
        timed_out,
    }
}

const CSV_HEADER: &str = "workers,tasks_per_producer,producers,total_tasks,elapsed_ms,\
throughput_tasks_per_s,avg_queue_wait_us,cpu_user_s,cpu_sys_s,max_queue_depth,\
executed,failed,duplicate_tasks,shutdown_timed_out";

fn print_result_row(result: &BenchResult, validate: bool) {
    let cpu_user = result
        .cpu_user_s
        .map(|v| format!("{v:.4}"))
        .unwrap_or_else(|| "NA".to_string());
    let cpu_sys = result
        .cpu_sys_s
        .map(|v| format!("{v:.4}"))
        .unwrap_or_else(|| "NA".to_string());
    println!(
        "{},{},{},{},{:.2},{:.2},{:.2},{},{},{},{},{},{},{}",
        result.workers,
        result.tasks_per_producer,
        result.producers,
        result.total_tasks,
        result.elapsed_ms,
        result.throughput,
        result.avg_queue_wait_us,
        cpu_user,
        cpu_sys,
        result.max_queue_depth,
        result.executed,
        result.failed,
        result.duplicate_tasks,
        result.timed_out
    );
    if result.leftover > 0 {
        eprintln!("# warning,leftover_tasks,{}", result.leftover);
    }
    if validate {
        if result.duplicate_tasks {
            eprintln!("# violation,duplicate_tasks");
        }
        if !result.timed_out
            && result.executed + result.failed + result.leftover != result.total_tasks
        {
            eprintln!("# violation,lost_tasks");
        }
    }
}

/// Run a single benchmark with optional parameter overrides.
pub fn run_benchmark(
    workers: Option<usize>,
    tasks_per_producer: Option<usize>,
    producers: Option<usize>,
    work_ms: Option<u64>,
    validate: bool,
    inject_failures: bool,
) {
    let workers = workers.unwrap_or(4);
    let tasks_per_producer = tasks_per_producer.unwrap_or(25);
    let producers = producers.unwrap_or(2);
    let work_ms = work_ms.unwrap_or(5);
    if workers == 0 {
        eprintln!("benchmark error: workers must be > 0");
        return;
    }
    if tasks_per_producer == 0 {
        eprintln!("benchmark error: tasks_per_producer must be > 0");
        return;
    }
    if producers == 0 {
        eprintln!("benchmark error: producers must be > 0");
        return;
    }

    let result = benchmark_once(
        workers,
        tasks_per_producer,
        producers,
        work_ms,
        validate,
        inject_failures,
    );
    println!("{CSV_HEADER}");
    print_result_row(&result, validate);
}

/// Sweep multiple benchmark configurations and print CSV output.
pub fn run_stress(
    worker_sets: Option<Vec<usize>>,
    task_sets: Option<Vec<usize>>,
    producer_sets: Option<Vec<usize>>,
    work_ms: Option<u64>,
    validate: bool,
    inject_failures: bool,
) {
    let default_worker_sets = [1usize, 2, 4, 8];
    let default_task_sets = [10usize, 25, 50];
    let default_producer_sets = [1usize, 2, 4];
    let work_ms = work_ms.unwrap_or(5);

    let worker_sets = worker_sets.unwrap_or_else(|| default_worker_sets.to_vec());
    let task_sets = task_sets.unwrap_or_else(|| default_task_sets.to_vec());
    let mut producer_sets = producer_sets.unwrap_or_else(|| default_producer_sets.to_vec());
    if worker_sets.iter().any(|&workers| workers == 0) {
        eprintln!("stress error: worker_sets must be > 0");
        return;
    }
    if task_sets.iter().any(|&tasks| tasks == 0) {
        eprintln!("stress error: task_sets must be > 0");
        return;
    }
    if producer_sets.iter().any(|&producers| producers == 0) {
        let before = producer_sets.len();
        producer_sets.retain(|&producers| producers > 0);
        let dropped = before.saturating_sub(producer_sets.len());
        if dropped > 0 {
            eprintln!("stress warning: ignored {dropped} producer set(s) <= 0");
        }
        if producer_sets.is_empty() {
            eprintln!("stress error: producers must be > 0");
            return;
        }
    }

    println!("{CSV_HEADER}");
    for workers in worker_sets {
        for tasks_per_producer in task_sets.iter().copied() {
            for producers in producer_sets.iter().copied() {
                let result = benchmark_once(
                    workers,
                    tasks_per_producer,
                    producers,
                    work_ms,
                    validate,
                    inject_failures,
                );
                print_result_row(&result, validate);
            }
        }
    }
}
