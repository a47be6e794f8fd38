//! Worker pool running tasks concurrently.
//!
//! A run spawns `min(worker_count, tasks.len())` workers. Each worker is an
//! independent async task that pulls tasks from the shared [`TaskQueue`],
//! runs them with its own [`TaskRunner`] clone and sends each [`TaskResult`]
//! over a channel. Results therefore surface in completion order.
//!
//! # Features
//!
//! - Sequential execution in list order with a single worker
//! - Cancellation stops dispatch and aborts in-flight tasks
//! - Pool statistics tracking

use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info, warn};

use super::queue::TaskQueue;
use crate::runner::{CancelSignal, RunOutcome, TaskResult, TaskRunner};
use crate::task::Task;

/// Returns the worker count for a requested value; 0 means one per CPU.
pub fn resolve_workers(requested: usize) -> usize {
    if requested > 0 {
        return requested;
    }
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Statistics about a pool run.
#[derive(Debug, Clone, Default)]
pub struct PoolStats {
    /// Number of workers spawned for the current run.
    pub num_workers: usize,
    /// Number of workers currently running a task.
    pub active_workers: usize,
    /// Tasks whose result passed.
    pub tasks_passed: u64,
    /// Tasks whose result failed.
    pub tasks_failed: u64,
    /// Tasks aborted by cancellation.
    pub tasks_cancelled: u64,
    /// Average task duration over completed tasks.
    pub average_task_duration: Duration,
}

impl PoolStats {
    /// Returns the number of tasks with a result.
    pub fn total_processed(&self) -> u64 {
        self.tasks_passed + self.tasks_failed
    }

    /// Returns the pass rate as a percentage.
    pub fn pass_rate(&self) -> f64 {
        let total = self.total_processed();
        if total == 0 {
            return 0.0;
        }
        (self.tasks_passed as f64 / total as f64) * 100.0
    }
}

/// Shared state for tracking pool statistics.
#[derive(Debug, Default)]
struct SharedPoolStats {
    num_workers: AtomicU64,
    tasks_passed: AtomicU64,
    tasks_failed: AtomicU64,
    tasks_cancelled: AtomicU64,
    total_duration_ms: AtomicU64,
    active_workers: AtomicU64,
}

impl SharedPoolStats {
    fn record_result(&self, result: &TaskResult) {
        if result.passed {
            self.tasks_passed.fetch_add(1, Ordering::SeqCst);
        } else {
            self.tasks_failed.fetch_add(1, Ordering::SeqCst);
        }
        self.total_duration_ms
            .fetch_add(result.duration_ms, Ordering::SeqCst);
    }

    fn record_cancelled(&self) {
        self.tasks_cancelled.fetch_add(1, Ordering::SeqCst);
    }

    fn increment_active(&self) {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
    }

    fn decrement_active(&self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }

    fn to_pool_stats(&self) -> PoolStats {
        let passed = self.tasks_passed.load(Ordering::SeqCst);
        let failed = self.tasks_failed.load(Ordering::SeqCst);
        let total_duration_ms = self.total_duration_ms.load(Ordering::SeqCst);

        let total = passed + failed;
        let average_task_duration = if total > 0 {
            Duration::from_millis(total_duration_ms / total)
        } else {
            Duration::ZERO
        };

        PoolStats {
            num_workers: self.num_workers.load(Ordering::SeqCst) as usize,
            active_workers: self.active_workers.load(Ordering::SeqCst) as usize,
            tasks_passed: passed,
            tasks_failed: failed,
            tasks_cancelled: self.tasks_cancelled.load(Ordering::SeqCst),
            average_task_duration,
        }
    }
}

/// Dispatches tasks to a pool of workers.
pub struct Scheduler {
    runner: TaskRunner,
    cancel: CancelSignal,
    stats: Arc<SharedPoolStats>,
}

impl Scheduler {
    /// Creates a scheduler running tasks with `runner`.
    pub fn new(runner: TaskRunner) -> Self {
        Self {
            runner,
            cancel: CancelSignal::never(),
            stats: Arc::new(SharedPoolStats::default()),
        }
    }

    /// Attaches a cancellation signal to the scheduler and every runner.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.runner = self.runner.with_cancel(cancel.clone());
        self.cancel = cancel;
        self
    }

    /// Returns current pool statistics.
    pub fn stats(&self) -> PoolStats {
        self.stats.to_pool_stats()
    }

    /// Runs `tasks` and streams their results in completion order.
    ///
    /// `worker_count <= 1` runs sequentially in list order. The stream ends
    /// once every task produced a result, or once cancellation drained the
    /// pool; cancelled tasks produce nothing.
    pub fn run(&self, tasks: Vec<Task>, worker_count: usize) -> ReceiverStream<TaskResult> {
        let num_workers = worker_count.clamp(1, tasks.len().max(1));
        let (tx, rx) = mpsc::channel(tasks.len().max(1));

        if tasks.is_empty() {
            return ReceiverStream::new(rx);
        }

        self.stats
            .num_workers
            .store(num_workers as u64, Ordering::SeqCst);
        let queue = Arc::new(TaskQueue::new(tasks));
        info!(num_workers, tasks = queue.len(), "Worker pool started");

        let handles: Vec<JoinHandle<()>> = (0..num_workers)
            .map(|i| {
                let worker = Worker {
                    id: format!("worker-{i}"),
                    queue: Arc::clone(&queue),
                    runner: self.runner.clone(),
                    cancel: self.cancel.clone(),
                    results: tx.clone(),
                    stats: Arc::clone(&self.stats),
                };
                tokio::spawn(worker.run())
            })
            .collect();
        drop(tx);

        tokio::spawn(supervise(handles, queue));
        ReceiverStream::new(rx)
    }
}

/// Waits for all workers, reporting panics and undispatched tasks.
async fn supervise(handles: Vec<JoinHandle<()>>, queue: Arc<TaskQueue>) {
    for handle in handles {
        if let Err(e) = handle.await {
            error!(error = %e, "Worker task panicked");
        }
    }

    let skipped = queue.drain_ids();
    if !skipped.is_empty() {
        warn!(count = skipped.len(), tasks = ?skipped, "Tasks not dispatched");
    }
    info!("Worker pool stopped");
}

/// A single worker pulling tasks from the queue.
struct Worker {
    id: String,
    queue: Arc<TaskQueue>,
    runner: TaskRunner,
    cancel: CancelSignal,
    results: mpsc::Sender<TaskResult>,
    stats: Arc<SharedPoolStats>,
}

impl Worker {
    async fn run(self) {
        debug!(worker_id = %self.id, "Worker started");

        loop {
            if self.cancel.is_cancelled() {
                info!(worker_id = %self.id, "Worker received cancel signal");
                break;
            }
            let Some(task) = self.queue.pop() else {
                break;
            };

            info!(worker_id = %self.id, task_id = %task.id, "Processing task");
            self.stats.increment_active();
            let outcome = self.runner.run(&task).await;
            self.stats.decrement_active();

            match outcome {
                RunOutcome::Completed(result) => {
                    self.stats.record_result(&result);
                    if self.results.send(result).await.is_err() {
                        warn!(worker_id = %self.id, "Result receiver dropped");
                        break;
                    }
                }
                RunOutcome::Cancelled { task_id } => {
                    self.stats.record_cancelled();
                    debug!(worker_id = %self.id, task_id = %task_id, "Task cancelled");
                    break;
                }
            }
        }

        debug!(worker_id = %self.id, "Worker stopped");
    }
}
