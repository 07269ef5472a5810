//! Admission-controlled worker pool.
//!
//! Two semaphores: `admission` bounds units that are running or queued,
//! `workers` bounds units that are running. A unit holds its admission
//! permit from [`WorkerPool::admit`] until it finishes, so the permit is
//! released exactly once on every exit path, panics included.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use crate::config::PoolConfig;
use crate::error::PoolClosed;

pub struct WorkerPool {
    admission: Arc<Semaphore>,
    workers: Arc<Semaphore>,
    capacity: usize,
    worker_count: usize,
}

/// A reserved slot in the pool. Dropping it returns the slot.
#[derive(Debug)]
pub struct Admission {
    _permit: OwnedSemaphorePermit,
}

impl WorkerPool {
    /// Creates a pool running at most `workers` units, with at most
    /// `capacity` admitted at once. `capacity` is raised to `workers` if lower.
    pub fn new(workers: usize, capacity: usize) -> Self {
        let workers = workers.max(1);
        let capacity = capacity.max(workers);
        Self {
            admission: Arc::new(Semaphore::new(capacity)),
            workers: Arc::new(Semaphore::new(workers)),
            capacity,
            worker_count: workers,
        }
    }

    pub fn from_config(cfg: &PoolConfig) -> Self {
        Self::new(cfg.workers, cfg.capacity)
    }

    /// Waits for a free slot.
    ///
    /// This is the backpressure point: while the pool is saturated the
    /// caller (the accept loop) simply does not proceed.
    pub async fn admit(&self) -> Result<Admission, PoolClosed> {
        let permit = self
            .admission
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| PoolClosed)?;
        Ok(Admission { _permit: permit })
    }

    /// Runs `job` on the pool once a worker is free.
    pub fn submit<F>(&self, admission: Admission, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let workers = self.workers.clone();
        tokio::spawn(async move {
            let _admission = admission;
            let Ok(_worker) = workers.acquire_owned().await else {
                return;
            };
            job.await;
        });
    }

    /// Units admitted and not yet finished, running or queued.
    pub fn in_flight(&self) -> usize {
        self.capacity - self.admission.available_permits()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn workers(&self) -> usize {
        self.worker_count
    }

    /// Waits for every admitted unit to finish, then stops admitting.
    pub async fn shutdown(&self) {
        let all = u32::try_from(self.capacity).unwrap_or(u32::MAX);
        tracing::info!(in_flight = self.in_flight(), "Draining worker pool");

        if let Ok(permits) = self.admission.acquire_many(all).await {
            self.admission.close();
            drop(permits);
        }

        tracing::info!("Worker pool drained");
    }
}
