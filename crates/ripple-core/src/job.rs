//! Completion handles and the job scheduling seam.
//!
//! A [`JobHandle`] is an opaque completion token. Handles combine with a
//! meet operation ([`JobHandle::combine`]): the combined handle completes
//! once every input has completed. Completion is signalled through the
//! [`Completer`] half returned by [`completion()`].
//!
//! Ripple never waits on a handle itself. It only combines handles and
//! passes them to a [`JobScheduler`] as dependencies; schedulers chain
//! work with [`JobHandle::on_complete`] instead of parking a thread.
//!
//! A handle can complete as *failed*: the job behind it panicked or its
//! [`Completer`] was dropped unfinished. Failure is sticky through
//! [`JobHandle::combine`], so a consumer depending on a failed producer
//! sees [`JobHandle::is_failed`] on its combined handle.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use crate::id::SlotId;

/// Callback run once a completion is signalled. Receives whether it failed.
type Continuation = Box<dyn FnOnce(bool) + Send + 'static>;

/// Shared completion state behind a [`JobHandle`].
struct Completion {
    done: AtomicBool,
    failed: AtomicBool,
    /// Continuations registered before completion.
    waiting: Mutex<Vec<Continuation>>,
    signal: Condvar,
}

impl Completion {
    fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            waiting: Mutex::new(Vec::new()),
            signal: Condvar::new(),
        }
    }

    fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    fn is_failed(&self) -> bool {
        self.is_done() && self.failed.load(Ordering::Acquire)
    }

    /// Signal completion and run every registered continuation on the
    /// calling thread, outside the lock. Idempotent.
    fn complete(&self, failed: bool) {
        let continuations = {
            let mut waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
            if self.is_done() {
                return;
            }
            if failed {
                self.failed.store(true, Ordering::Release);
            }
            self.done.store(true, Ordering::Release);
            self.signal.notify_all();
            std::mem::take(&mut *waiting)
        };
        for continuation in continuations {
            continuation(failed);
        }
    }

    /// Run `continuation` once complete: now if already done, otherwise
    /// on the thread that completes.
    fn on_complete(&self, continuation: Continuation) {
        let mut waiting = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_done() {
            waiting.push(continuation);
            return;
        }
        drop(waiting);
        continuation(self.is_failed());
    }

    /// Block until complete or `deadline` passes. Returns whether complete.
    fn wait_until(&self, deadline: Option<Instant>) -> bool {
        if self.is_done() {
            return true;
        }
        let mut guard = self.waiting.lock().unwrap_or_else(PoisonError::into_inner);
        while !self.is_done() {
            guard = match deadline {
                None => self
                    .signal
                    .wait(guard)
                    .unwrap_or_else(PoisonError::into_inner),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    self.signal
                        .wait_timeout(guard, deadline - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0)
                }
            };
        }
        true
    }
}

/// Opaque completion token for asynchronous work.
///
/// A default handle is already complete. Cloning a handle is cheap; all
/// clones observe the same completion.
#[derive(Clone, Default)]
#[must_use]
pub struct JobHandle {
    pending: SmallVec<[Arc<Completion>; 2]>,
}

impl JobHandle {
    /// A handle that is already complete.
    pub fn completed() -> Self {
        Self::default()
    }

    /// A handle that completes once both `a` and `b` have completed.
    pub fn combine(a: &JobHandle, b: &JobHandle) -> JobHandle {
        Self::combine_all([a, b])
    }

    /// A handle that completes once every handle in `handles` has completed.
    ///
    /// Successfully completed dependencies are pruned and duplicates are
    /// collapsed, so repeatedly folding handles into an aggregate does not
    /// grow it without bound. Failed dependencies are kept so the failure
    /// stays visible.
    pub fn combine_all<'a>(handles: impl IntoIterator<Item = &'a JobHandle>) -> JobHandle {
        let mut pending: SmallVec<[Arc<Completion>; 2]> = SmallVec::new();
        for handle in handles {
            for dep in &handle.pending {
                let succeeded = dep.is_done() && !dep.is_failed();
                if succeeded || pending.iter().any(|p| Arc::ptr_eq(p, dep)) {
                    continue;
                }
                pending.push(Arc::clone(dep));
            }
        }
        JobHandle { pending }
    }

    /// Whether every dependency of this handle has completed.
    pub fn is_complete(&self) -> bool {
        self.pending.iter().all(|dep| dep.is_done())
    }

    /// Whether any dependency has completed as failed.
    pub fn is_failed(&self) -> bool {
        self.pending.iter().any(|dep| dep.is_failed())
    }

    /// Block the calling thread until the handle completes.
    pub fn wait(&self) {
        for dep in &self.pending {
            dep.wait_until(None);
        }
    }

    /// Block for at most `timeout`. Returns whether the handle completed.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.pending.iter().all(|dep| dep.wait_until(Some(deadline)))
    }

    /// Run `f` once the handle completes, without blocking. `f` receives
    /// whether the handle failed.
    ///
    /// Runs immediately on the calling thread if already complete,
    /// otherwise on whichever thread completes the last dependency.
    pub fn on_complete(&self, f: impl FnOnce(bool) + Send + 'static) {
        let pending: SmallVec<[Arc<Completion>; 2]> = self
            .pending
            .iter()
            .filter(|dep| !dep.is_done())
            .cloned()
            .collect();
        if pending.is_empty() {
            f(self.is_failed());
            return;
        }
        let remaining = Arc::new(AtomicUsize::new(pending.len()));
        let failed = Arc::new(AtomicBool::new(self.is_failed()));
        let f: Arc<Mutex<Option<Continuation>>> = Arc::new(Mutex::new(Some(Box::new(f))));
        for dep in pending {
            let remaining = Arc::clone(&remaining);
            let failed = Arc::clone(&failed);
            let f = Arc::clone(&f);
            dep.on_complete(Box::new(move |dep_failed| {
                if dep_failed {
                    failed.store(true, Ordering::Release);
                }
                if remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
                    let f = f.lock().unwrap_or_else(PoisonError::into_inner).take();
                    if let Some(f) = f {
                        f(failed.load(Ordering::Acquire));
                    }
                }
            }));
        }
    }

    /// Number of distinct underlying jobs this handle still tracks.
    pub fn dependency_count(&self) -> usize {
        self.pending.len()
    }
}

impl fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobHandle")
            .field("dependencies", &self.pending.len())
            .field("complete", &self.is_complete())
            .field("failed", &self.is_failed())
            .finish()
    }
}

/// Signalling half of a completion pair.
///
/// Dropping a `Completer` without calling [`Completer::complete`] completes
/// the handle as failed, so an abandoned or panicking job never leaves
/// waiters hanging and never passes for a success.
pub struct Completer {
    inner: Option<Arc<Completion>>,
}

impl Completer {
    /// Mark the paired handle complete.
    pub fn complete(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.complete(false);
        }
    }

    /// Mark the paired handle complete and failed.
    pub fn fail(mut self) {
        if let Some(inner) = self.inner.take() {
            inner.complete(true);
        }
    }

    /// Complete as failed if `failed`, otherwise successfully.
    pub fn finish(self, failed: bool) {
        if failed {
            self.fail();
        } else {
            self.complete();
        }
    }
}

impl Drop for Completer {
    fn drop(&mut self) {
        if let Some(inner) = self.inner.take() {
            inner.complete(true);
        }
    }
}

impl fmt::Debug for Completer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Completer").finish_non_exhaustive()
    }
}

/// Create a pending handle together with the [`Completer`] that finishes it.
pub fn completion() -> (Completer, JobHandle) {
    let inner = Arc::new(Completion::new());
    let mut pending = SmallVec::new();
    pending.push(Arc::clone(&inner));
    (Completer { inner: Some(inner) }, JobHandle { pending })
}

/// A unit of scheduled work. Receives the slot of the worker running it.
pub type Job = Box<dyn FnOnce(SlotId) + Send + 'static>;

/// Host scheduler abstraction.
///
/// Implementations run `job` on some worker once `dependency` has
/// completed and return a handle that completes after `job` returns.
/// A pending dependency must not occupy a worker. The returned handle
/// fails if `dependency` failed or `job` panicked. Concurrently running
/// jobs must observe distinct slots.
pub trait JobScheduler: Send + Sync {
    /// Schedule `job` to run after `dependency`.
    fn schedule(&self, dependency: JobHandle, job: Job) -> JobHandle;

    /// Number of distinct worker slots this scheduler hands out,
    /// excluding [`SlotId::MAIN`].
    fn worker_count(&self) -> usize;
}

/// Output slot filled in by a scheduled job.
///
/// Clones share the same slot. The value is available once the handle
/// returned alongside it has completed.
pub struct JobOutput<T> {
    slot: Arc<Mutex<Option<T>>>,
}

impl<T> JobOutput<T> {
    /// An empty output slot.
    pub fn new() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }

    /// Store `value`, replacing any earlier value.
    pub fn set(&self, value: T) {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(value);
    }

    /// Remove and return the stored value, if any.
    pub fn take(&self) -> Option<T> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner).take()
    }

    /// Whether a value is currently stored.
    pub fn is_set(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

impl<T: Clone> JobOutput<T> {
    /// A copy of the stored value, if any.
    pub fn get(&self) -> Option<T> {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl<T> Clone for JobOutput<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Default for JobOutput<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JobOutput<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobOutput")
            .field("is_set", &self.is_set())
            .finish()
    }
}
