//! Background propagation of cache writes.
//!
//! Cache population and invalidation triggered by a request run on a small
//! worker pool fed by a bounded queue. Submitting never waits: when the queue
//! is full the task is dropped and counted. Tasks are owned by the pool, not
//! by the submitting request, so they run to completion even if the request
//! is cancelled. Failures and panics are logged and counted.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;

struct Job {
    label: String,
    task: BoxFuture<'static, Result<()>>,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    rejected: AtomicU64,
}

struct Inner {
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    counters: Counters,
    idle: Notify,
}

/// Snapshot of propagation counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PropagationStats {
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    /// Dropped because the queue was full or the pool was shut down.
    pub rejected: u64,
}

impl PropagationStats {
    /// Accepted tasks that have not finished yet.
    pub fn pending(&self) -> u64 {
        self.submitted
            .saturating_sub(self.completed)
            .saturating_sub(self.failed)
    }
}

/// Worker pool for fire-and-forget tasks.
///
/// Cloning is cheap; clones submit to the same pool.
#[derive(Clone)]
pub struct Propagator {
    inner: Arc<Inner>,
}

impl Propagator {
    /// Start `workers` workers draining a queue of `capacity` tasks.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let (sender, receiver) = mpsc::channel::<Job>(capacity.max(1));
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let inner = Arc::new(Inner {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(Vec::with_capacity(workers)),
            counters: Counters::default(),
            idle: Notify::new(),
        });

        let handles = (0..workers)
            .map(|id| tokio::spawn(worker_loop(id, Arc::clone(&receiver), Arc::clone(&inner))))
            .collect();
        *inner.workers.lock() = handles;

        info!("Propagation pool started ({} workers, queue {})", workers, capacity);
        Self { inner }
    }

    /// Queue `task` without waiting. Returns `false` if it was dropped.
    pub fn submit<F>(&self, label: impl Into<String>, task: F) -> bool
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let job = Job {
            label: label.into(),
            task: task.boxed(),
        };
        let counters = &self.inner.counters;

        let sender = self.inner.sender.lock();
        let Some(sender) = sender.as_ref() else {
            counters.rejected.fetch_add(1, Ordering::Relaxed);
            warn!("Propagation pool shut down, dropping '{}'", job.label);
            return false;
        };

        // Count before sending so a fast worker never finishes an uncounted job.
        counters.submitted.fetch_add(1, Ordering::Relaxed);
        match sender.try_send(job) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(job))
            | Err(mpsc::error::TrySendError::Closed(job)) => {
                counters.submitted.fetch_sub(1, Ordering::Relaxed);
                counters.rejected.fetch_add(1, Ordering::Relaxed);
                warn!("Propagation queue full, dropping '{}'", job.label);
                false
            }
        }
    }

    pub fn stats(&self) -> PropagationStats {
        let counters = &self.inner.counters;
        PropagationStats {
            submitted: counters.submitted.load(Ordering::Relaxed),
            completed: counters.completed.load(Ordering::Relaxed),
            failed: counters.failed.load(Ordering::Relaxed),
            rejected: counters.rejected.load(Ordering::Relaxed),
        }
    }

    /// Wait until every accepted task has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.stats().pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Stop accepting tasks, then wait for queued ones to drain.
    pub async fn shutdown(&self) {
        let sender = self.inner.sender.lock().take();
        if sender.is_none() {
            return;
        }
        drop(sender);

        let workers = std::mem::take(&mut *self.inner.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Propagation worker ended abnormally: {}", e);
            }
        }

        let stats = self.stats();
        info!(
            "Propagation pool stopped (completed {}, failed {}, rejected {})",
            stats.completed, stats.failed, stats.rejected
        );
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>,
    inner: Arc<Inner>,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            debug!("Propagation worker {} exiting", id);
            return;
        };

        match AssertUnwindSafe(job.task).catch_unwind().await {
            Ok(Ok(())) => {
                inner.counters.completed.fetch_add(1, Ordering::Relaxed);
                debug!("Propagated '{}'", job.label);
            }
            Ok(Err(e)) => {
                inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Background task '{}' failed: {}", job.label, e);
            }
            Err(_) => {
                inner.counters.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Background task '{}' panicked", job.label);
            }
        }
        inner.idle.notify_waiters();
    }
}

impl std::fmt::Debug for Propagator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Propagator")
            .field("stats", &self.stats())
            .field("open", &self.inner.sender.lock().is_some())
            .finish()
    }
}
