use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::core::cancel::CancellationToken;
use crate::telemetry::{self, tags};
use crate::{NxError, Result};

/// Fixed-size pool of OS threads draining a FIFO task queue.
///
/// Tasks start in submission order. The pool bounds concurrency and acts as
/// the completion barrier; callers that need ordered side effects coordinate
/// through a [`TurnGate`](super::TurnGate).
#[derive(Debug, Clone)]
pub struct WorkerPool {
    num_workers: usize,
    cancellation: CancellationToken,
}

impl WorkerPool {
    /// Creates a pool of `num_workers` threads; zero is raised to one.
    pub fn new(num_workers: usize) -> Self {
        Self {
            num_workers: num_workers.max(1),
            cancellation: CancellationToken::new(),
        }
    }

    /// Uses `token` both to stop workers from outside and to broadcast the
    /// first task failure to every other task.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Spawns the worker threads. `processor` receives the worker id and one task.
    pub fn spawn<T, F>(&self, processor: F) -> WorkerPoolHandle<T>
    where
        T: Send + 'static,
        F: Fn(usize, T) -> Result<()> + Send + Sync + 'static,
    {
        let (task_tx, task_rx) = unbounded::<T>();
        let (results_tx, results_rx) = unbounded();
        let state = Arc::new(WorkerPoolState::new(
            self.num_workers,
            self.cancellation.clone(),
        ));
        let processor = Arc::new(processor);

        let mut worker_handles = Vec::with_capacity(self.num_workers);
        for worker_id in 0..self.num_workers {
            let worker_rx = task_rx.clone();
            let worker_state = Arc::clone(&state);
            let worker_tx = results_tx.clone();
            let worker_processor = Arc::clone(&processor);

            let handle = thread::Builder::new()
                .name(format!("nx-worker-{worker_id}"))
                .spawn(move || {
                    run_worker_loop(worker_id, worker_rx, worker_state, worker_processor, worker_tx);
                });
            match handle {
                Ok(handle) => worker_handles.push(handle),
                Err(error) => {
                    tracing::warn!(
                        target: tags::TARGET_POOL,
                        worker_id,
                        %error,
                        "failed to spawn worker thread"
                    );
                }
            }
        }

        WorkerPoolHandle {
            state,
            task_tx: Some(task_tx),
            results_rx,
            worker_handles,
        }
    }
}

struct WorkerPoolState {
    started_at: Instant,
    accepting: AtomicBool,
    submitted: AtomicUsize,
    completed: AtomicUsize,
    task_counts: Vec<AtomicUsize>,
    cancellation: CancellationToken,
}

impl WorkerPoolState {
    fn new(num_workers: usize, cancellation: CancellationToken) -> Self {
        Self {
            started_at: Instant::now(),
            accepting: AtomicBool::new(true),
            submitted: AtomicUsize::new(0),
            completed: AtomicUsize::new(0),
            task_counts: (0..num_workers).map(|_| AtomicUsize::new(0)).collect(),
            cancellation,
        }
    }
}

/// Runtime metrics snapshot for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolRuntimeSnapshot {
    pub elapsed: Duration,
    pub submitted: usize,
    pub completed: usize,
    pub pending: usize,
    pub worker_task_counts: Vec<usize>,
}

/// Runtime handle for a spawned worker pool.
pub struct WorkerPoolHandle<T> {
    state: Arc<WorkerPoolState>,
    task_tx: Option<Sender<T>>,
    results_rx: Receiver<Result<()>>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl<T> WorkerPoolHandle<T> {
    /// Queues a task behind everything submitted before it.
    pub fn submit(&self, task: T) -> Result<()> {
        if !self.state.accepting.load(Ordering::Acquire) {
            return Err(NxError::InvalidFormat(
                "worker pool is shutting down; no new work accepted",
            ));
        }
        if self.worker_handles.is_empty() {
            return Err(NxError::InvalidFormat("worker pool has no running threads"));
        }

        let sender = self
            .task_tx
            .as_ref()
            .ok_or(NxError::InvalidFormat("worker pool task queue is closed"))?;
        self.state.submitted.fetch_add(1, Ordering::AcqRel);
        sender
            .send(task)
            .map_err(|_| NxError::InvalidFormat("worker pool task queue is closed"))
    }

    /// Stops accepting tasks; workers exit once the queue is drained.
    pub fn shutdown(&mut self) {
        self.state.accepting.store(false, Ordering::Release);
        self.task_tx = None;
    }

    /// Cancels queued and running work through the pool's token.
    pub fn cancel(&self) {
        self.state.cancellation.cancel();
    }

    /// Tasks accepted by [`Self::submit`] so far.
    pub fn submitted_count(&self) -> usize {
        self.state.submitted.load(Ordering::Acquire)
    }

    /// Tasks that finished, successfully or not.
    pub fn completed_count(&self) -> usize {
        self.state.completed.load(Ordering::Acquire)
    }

    pub fn pending_count(&self) -> usize {
        self.submitted_count()
            .saturating_sub(self.completed_count())
    }

    /// Per-worker processed task counts.
    pub fn worker_task_counts(&self) -> Vec<usize> {
        self.state
            .task_counts
            .iter()
            .map(|counter| counter.load(Ordering::Acquire))
            .collect()
    }

    /// Point-in-time view of the pool's counters.
    pub fn runtime_snapshot(&self) -> PoolRuntimeSnapshot {
        let submitted = self.submitted_count();
        let completed = self.completed_count();
        PoolRuntimeSnapshot {
            elapsed: self.state.started_at.elapsed(),
            submitted,
            completed,
            pending: submitted.saturating_sub(completed),
            worker_task_counts: self.worker_task_counts(),
        }
    }

    /// Drains every submitted task, joins the workers and returns the first
    /// failure. Cancellation errors caused by that failure are not reported
    /// in its place.
    pub fn finish(mut self) -> Result<()> {
        self.shutdown();
        let expected = self.submitted_count();

        let mut first_error: Option<NxError> = None;
        let mut cancelled = false;
        for _ in 0..expected {
            match self.results_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(error)) if error.is_cancellation() => cancelled = true,
                Ok(Err(error)) => {
                    if first_error.is_none() {
                        first_error = Some(error);
                    }
                }
                Err(_) => {
                    if first_error.is_none() {
                        first_error = Some(NxError::InvalidFormat(
                            "worker result channel closed before all tasks completed",
                        ));
                    }
                    break;
                }
            }
        }

        if let Err(join_error) = self.join_workers() {
            if first_error.is_none() {
                first_error = Some(join_error);
            }
        }

        match first_error {
            Some(error) => Err(error),
            None if cancelled => Err(NxError::Cancelled),
            None => Ok(()),
        }
    }

    /// Shuts down and joins workers without collecting results.
    pub fn join(mut self) -> Result<()> {
        self.shutdown();
        self.join_workers()
    }

    fn join_workers(&mut self) -> Result<()> {
        for handle in self.worker_handles.drain(..) {
            if let Err(payload) = handle.join() {
                return Err(NxError::InvalidFormat(panic_message(payload.as_ref())));
            }
        }
        Ok(())
    }
}

impl<T> Drop for WorkerPoolHandle<T> {
    fn drop(&mut self) {
        if self.worker_handles.is_empty() {
            return;
        }
        self.shutdown();
        let _ = self.join_workers();
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &'static str {
    if payload.is::<&str>() || payload.is::<String>() {
        "worker thread panicked"
    } else {
        "worker thread panicked with unknown payload"
    }
}

fn run_worker_loop<T, F>(
    worker_id: usize,
    tasks: Receiver<T>,
    state: Arc<WorkerPoolState>,
    processor: Arc<F>,
    results_tx: Sender<Result<()>>,
) where
    F: Fn(usize, T) -> Result<()> + Send + Sync,
{
    while let Ok(task) = tasks.recv() {
        let result = if state.cancellation.is_cancelled() {
            drop(task);
            Err(NxError::Cancelled)
        } else {
            let started_at = Instant::now();
            let result = match catch_unwind(AssertUnwindSafe(|| processor(worker_id, task))) {
                Ok(result) => result,
                Err(payload) => {
                    let details = if let Some(message) = payload.downcast_ref::<&str>() {
                        (*message).to_string()
                    } else if let Some(message) = payload.downcast_ref::<String>() {
                        message.clone()
                    } else {
                        "unknown panic payload".to_string()
                    };
                    Err(anyhow::anyhow!("worker task panicked: {details}").into())
                }
            };
            telemetry::record_histogram(
                tags::METRIC_WORKER_TASK_LATENCY_US,
                telemetry::elapsed_us(started_at),
            );
            result
        };

        if let Err(error) = &result {
            if !error.is_cancellation() {
                tracing::debug!(
                    target: tags::TARGET_POOL,
                    worker_id,
                    %error,
                    "task failed, cancelling remaining work"
                );
            }
            state.cancellation.cancel();
        }

        state.completed.fetch_add(1, Ordering::AcqRel);
        state.task_counts[worker_id].fetch_add(1, Ordering::AcqRel);
        if results_tx.send(result).is_err() {
            break;
        }
    }
}
