//! Built-in worker pool implementing [`JobScheduler`].
//!
//! A task only enters the shared crossbeam queue once its dependency has
//! completed: [`WorkerPool::schedule`] registers a continuation on the
//! dependency that sends the task, so a worker never parks on a pending
//! handle and independent jobs keep flowing past blocked ones. Worker `i`
//! always runs with `SlotId(i + 1)`; slot 0 stays reserved for the
//! orchestrating thread.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender};

use ripple_core::{completion, Completer, ConfigError, Job, JobHandle, JobScheduler, SlotId};

/// A job whose dependency has completed, ready for a worker.
struct Task {
    job: Job,
    done: Completer,
    /// The dependency completed as failed.
    upstream_failed: bool,
}

impl Task {
    fn run(self, slot: SlotId) {
        let panicked = catch_unwind(AssertUnwindSafe(|| (self.job)(slot))).is_err();
        if panicked {
            tracing::error!(%slot, "job panicked");
        }
        self.done.finish(panicked || self.upstream_failed);
    }
}

/// Sending half of the task queue, shared with pending continuations.
/// `None` once the pool is shutting down.
type TaskQueue = Arc<Mutex<Option<Sender<Task>>>>;

/// Send `task` to the workers, or run it on the calling thread if the
/// pool has shut down.
fn enqueue(queue: &TaskQueue, task: Task) {
    let unsent = match &*queue.lock().unwrap_or_else(PoisonError::into_inner) {
        Some(tx) => tx.send(task).err().map(|e| e.into_inner()),
        None => Some(task),
    };
    if let Some(task) = unsent {
        tracing::warn!("worker pool closed; running job on the calling thread");
        task.run(SlotId::MAIN);
    }
}

/// Fixed-size thread pool running jobs after their dependencies.
pub struct WorkerPool {
    queue: TaskQueue,
    threads: Vec<JoinHandle<()>>,
    worker_count: usize,
}

impl WorkerPool {
    /// Spawn `worker_count` workers (at least one).
    pub fn new(worker_count: usize) -> Result<Self, ConfigError> {
        let worker_count = worker_count.max(1);
        let (task_tx, task_rx) = crossbeam_channel::unbounded();
        let mut pool = Self {
            queue: Arc::new(Mutex::new(Some(task_tx))),
            threads: Vec::with_capacity(worker_count),
            worker_count,
        };
        for i in 0..worker_count {
            let task_rx = task_rx.clone();
            let slot = SlotId(i as u32 + 1);
            let handle = thread::Builder::new()
                .name(format!("ripple-worker-{i}"))
                .spawn(move || worker_loop(task_rx, slot))
                .map_err(|e| ConfigError::ThreadSpawnFailed {
                    reason: e.to_string(),
                })?;
            pool.threads.push(handle);
        }
        tracing::debug!(worker_count, "worker pool started");
        Ok(pool)
    }

    /// Tasks ready to run but not yet picked up by a worker. Tasks still
    /// waiting on a dependency are not counted.
    pub fn queued(&self) -> usize {
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map_or(0, Sender::len)
    }
}

fn worker_loop(task_rx: Receiver<Task>, slot: SlotId) {
    while let Ok(task) = task_rx.recv() {
        task.run(slot);
    }
}

impl JobScheduler for WorkerPool {
    fn schedule(&self, dependency: JobHandle, job: Job) -> JobHandle {
        let (done, handle) = completion();
        let queue = Arc::clone(&self.queue);
        dependency.on_complete(move |upstream_failed| {
            let task = Task {
                job,
                done,
                upstream_failed,
            };
            enqueue(&queue, task);
        });
        handle
    }

    fn worker_count(&self) -> usize {
        self.worker_count
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets workers drain the queue and exit. Tasks
        // released later run on the thread completing their dependency.
        self.queue
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let mut joined = 0;
        for handle in self.threads.drain(..) {
            if handle.join().is_ok() {
                joined += 1;
            }
        }
        tracing::debug!(joined, "worker pool stopped");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("worker_count", &self.worker_count)
            .field("queued", &self.queued())
            .finish()
    }
}
