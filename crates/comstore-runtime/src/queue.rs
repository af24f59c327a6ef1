//! Execution queue for deferred repository jobs.
//!
//! Tasks enqueue per-repository work (mostly updates) and the
//! `process_queue` task drains it in batches sized by the remaining rate
//! budget. Jobs in one batch run concurrently; the rate gate caps how many
//! of them talk to the remote at once.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::join_all;
use tracing::debug;

type Job = Pin<Box<dyn Future<Output = ()> + Send>>;

#[derive(Default)]
struct Inner {
    jobs: Mutex<VecDeque<Job>>,
    running: AtomicBool,
}

/// FIFO queue of pending jobs. Clones share the same queue.
#[derive(Clone, Default)]
pub struct QueueManager {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for QueueManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueManager")
            .field("pending_tasks", &self.pending_tasks())
            .field("running", &self.running())
            .finish()
    }
}

impl QueueManager {
    pub fn new() -> Self {
        Self::default()
    }

    fn jobs(&self) -> MutexGuard<'_, VecDeque<Job>> {
        self.inner
            .jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Append a job. It does not run until [`Self::execute`] picks it up.
    pub fn add<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.jobs().push_back(Box::pin(job));
    }

    /// Jobs queued and not yet started.
    pub fn pending_tasks(&self) -> usize {
        self.jobs().len()
    }

    pub fn has_pending_tasks(&self) -> bool {
        self.pending_tasks() > 0
    }

    /// Whether a batch is executing right now.
    pub fn running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Run up to `limit` queued jobs, all of them when `None`, and wait for
    /// the batch to finish. Returns how many jobs ran.
    ///
    /// Only one batch runs at a time; a call made while another batch is
    /// executing returns `0` immediately.
    pub async fn execute(&self, limit: Option<usize>) -> usize {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("Queue is already running");
            return 0;
        }
        let _running = RunningFlag(&self.inner.running);

        let batch: Vec<Job> = {
            let mut jobs = self.jobs();
            let take = limit.map_or(jobs.len(), |n| n.min(jobs.len()));
            jobs.drain(..take).collect()
        };
        if batch.is_empty() {
            debug!("Queue is empty");
            return 0;
        }

        let count = batch.len();
        debug!(count, remaining = self.pending_tasks(), "Executing queued jobs");
        join_all(batch).await;
        debug!(count, "Queued jobs finished");
        count
    }

    /// Drop every queued job without running it.
    pub fn clear(&self) {
        let dropped = {
            let mut jobs = self.jobs();
            let dropped = jobs.len();
            jobs.clear();
            dropped
        };
        if dropped > 0 {
            debug!(dropped, "Queue cleared");
        }
    }
}

/// Resets the running flag on every exit path.
struct RunningFlag<'a>(&'a AtomicBool);

impl Drop for RunningFlag<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}
