use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, warn};
use crate::worker::{WorkerError, WorkerResult};

/// A reserved worker; the slot is released when the job holding it finishes.
#[derive(Debug)]
pub struct WorkerSlot {
    _permit: OwnedSemaphorePermit,
    active_workers: Arc<AtomicUsize>,
}

impl Drop for WorkerSlot {
    fn drop(&mut self) {
        self.active_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Fixed-size pool of concurrent jobs.
///
/// The dispatcher reserves a slot before spawning, so at most `worker_count`
/// jobs run at once and dispatch stalls while every worker is busy.
pub struct WorkerPool {
    semaphore: Arc<Semaphore>,
    active_workers: Arc<AtomicUsize>,
    worker_count: usize,
    tasks: JoinSet<()>,
    failures: Vec<WorkerError>,
}

impl WorkerPool {
    pub fn new(worker_count: usize) -> Self {
        let worker_count = worker_count.max(1);
        debug!("Creating worker pool with {} workers", worker_count);
        Self {
            semaphore: Arc::new(Semaphore::new(worker_count)),
            active_workers: Arc::new(AtomicUsize::new(0)),
            worker_count,
            tasks: JoinSet::new(),
            failures: Vec::new(),
        }
    }

    /// Wait until a worker is free.
    pub async fn reserve(&self) -> WorkerResult<WorkerSlot> {
        let permit = Arc::clone(&self.semaphore).acquire_owned().await?;
        let active = self.active_workers.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(
            "Worker reserved - Active: {}/{}, Available permits: {}",
            active, self.worker_count, self.semaphore.available_permits()
        );
        Ok(WorkerSlot {
            _permit: permit,
            active_workers: Arc::clone(&self.active_workers),
        })
    }

    /// Run `job` on the reserved slot.
    pub fn spawn<F>(&mut self, slot: WorkerSlot, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.reap_finished();
        self.tasks.spawn(async move {
            let _slot = slot;
            job.await;
        });
    }

    /// Collect already-finished jobs so the join set does not grow with the batch.
    fn reap_finished(&mut self) {
        while let Some(result) = self.tasks.try_join_next() {
            if let Err(e) = result {
                warn!("Worker task ended abnormally: {}", e);
                self.failures.push(WorkerError::from(e));
            }
        }
    }

    /// Wait for every spawned job; returns the jobs that panicked or were cancelled.
    pub async fn join(&mut self) -> Vec<WorkerError> {
        while let Some(result) = self.tasks.join_next().await {
            if let Err(e) = result {
                warn!("Worker task ended abnormally: {}", e);
                self.failures.push(WorkerError::from(e));
            }
        }
        std::mem::take(&mut self.failures)
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    pub fn worker_count(&self) -> usize {
        self.worker_count
    }
}
