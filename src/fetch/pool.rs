//! Fetch Pool Module
//!
//! Bounded set of background tasks that run fetches and prefetches.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info};

use crate::error::{CacheError, Result};

// == Fetch Pool ==
/// Runs fetch work on a tokio runtime with at most `size` jobs active.
///
/// Work beyond the limit queues on a fair semaphore. Shutting down stops
/// new submissions; `shutdown_now` also drops queued and running jobs.
#[derive(Debug)]
pub struct FetchPool {
    handle: Handle,
    permits: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    shut_down: AtomicBool,
    size: usize,
}

impl FetchPool {
    // == Constructor ==
    /// Creates a pool on the current tokio runtime.
    pub fn new(size: usize) -> Result<Self> {
        let handle = Handle::try_current().map_err(|err| CacheError::Runtime(err.to_string()))?;
        Self::with_handle(size, handle)
    }

    /// Creates a pool that spawns onto `handle`.
    pub fn with_handle(size: usize, handle: Handle) -> Result<Self> {
        if size == 0 {
            return Err(CacheError::InvalidArgument(
                "pool size must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            handle,
            permits: Arc::new(Semaphore::new(size)),
            tasks: Mutex::new(JoinSet::new()),
            shut_down: AtomicBool::new(false),
            size,
        })
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn is_shutdown(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    // == Spawn ==
    /// Queues `job`. Returns false, dropping the job, once the pool is shut down.
    pub fn spawn<F>(&self, job: F) -> bool
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.is_shutdown() {
            return false;
        }

        let permits = Arc::clone(&self.permits);
        let mut tasks = self.tasks.lock();
        // Reap finished jobs so the set does not grow without bound.
        while tasks.try_join_next().is_some() {}
        tasks.spawn_on(
            async move {
                // The semaphore closes on shutdown_now; the job is dropped unrun.
                let Ok(_permit) = permits.acquire_owned().await else {
                    return;
                };
                job.await;
            },
            &self.handle,
        );
        true
    }

    /// Number of jobs queued or running.
    pub fn pending(&self) -> usize {
        let mut tasks = self.tasks.lock();
        while tasks.try_join_next().is_some() {}
        tasks.len()
    }

    // == Shutdown ==
    /// Stops accepting new jobs. Queued and running jobs still complete.
    pub fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            info!(size = self.size, "Fetch pool shut down");
        }
    }

    /// Stops accepting jobs and aborts everything queued or running.
    ///
    /// Blocking fetches already executing run to completion on their
    /// thread, but their results are discarded.
    pub fn shutdown_now(&self) {
        self.shutdown();
        self.permits.close();
        let mut tasks = self.tasks.lock();
        debug!(aborted = tasks.len(), "Aborting fetch jobs");
        tasks.abort_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    #[tokio::test]
    async fn test_pool_runs_jobs() {
        let pool = FetchPool::new(2).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..5 {
            let counter = Arc::clone(&counter);
            assert!(pool.spawn(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }));
        }

        while pool.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(counter.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn test_zero_size_rejected() {
        assert!(matches!(
            FetchPool::new(0),
            Err(CacheError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_requires_runtime() {
        assert!(matches!(FetchPool::new(1), Err(CacheError::Runtime(_))));
    }

    #[tokio::test]
    async fn test_shutdown_refuses_new_jobs() {
        let pool = FetchPool::new(1).unwrap();
        pool.shutdown();

        assert!(pool.is_shutdown());
        assert!(!pool.spawn(async {}));
    }

    #[tokio::test]
    async fn test_shutdown_now_drops_queued_jobs() {
        let pool = FetchPool::new(1).unwrap();
        let ran = Arc::new(AtomicUsize::new(0));

        // Occupies the only permit until aborted
        pool.spawn(std::future::pending::<()>());
        let counter = Arc::clone(&ran);
        pool.spawn(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        pool.shutdown_now();
        while pool.pending() > 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(ran.load(Ordering::SeqCst), 0);
    }
}
