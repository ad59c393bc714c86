//! # Worker Pool
//!
//! A fixed number of worker coroutines share one `may` MPSC queue. Each
//! worker takes one job at a time, so the pool size caps how many jobs run
//! concurrently; the rest wait in the queue.
//!
//! Dropping every clone of the pool closes the queue. Workers finish the
//! job they hold and then exit.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc::SendError;
use std::sync::Arc;

use may::sync::{mpsc, Mutex};
use tracing::{debug, error, info};

use crate::config::ServerConfig;

/// Configuration for a worker pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerPoolConfig {
    /// Number of worker coroutines
    pub num_workers: usize,
    /// Stack size for worker coroutines
    pub stack_size: usize,
}

impl WorkerPoolConfig {
    pub fn new(num_workers: usize, stack_size: usize) -> Self {
        Self {
            num_workers,
            stack_size,
        }
    }

    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self::new(config.worker_threads, config.stack_size)
    }
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            num_workers: 4,
            stack_size: 0x10000, // 64KB
        }
    }
}

/// Counters for a worker pool
#[derive(Debug, Default)]
pub struct WorkerPoolMetrics {
    /// Jobs queued or running
    pub queue_depth: AtomicUsize,
    pub dispatched_count: AtomicU64,
    pub completed_count: AtomicU64,
    /// Jobs whose handler panicked
    pub panic_count: AtomicU64,
}

impl WorkerPoolMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_dispatch(&self) {
        self.dispatched_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_completion(&self) {
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        self.queue_depth.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn record_panic(&self) {
        self.panic_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_queue_depth(&self) -> usize {
        self.queue_depth.load(Ordering::Relaxed)
    }

    pub fn get_dispatched_count(&self) -> u64 {
        self.dispatched_count.load(Ordering::Relaxed)
    }

    pub fn get_completed_count(&self) -> u64 {
        self.completed_count.load(Ordering::Relaxed)
    }

    pub fn get_panic_count(&self) -> u64 {
        self.panic_count.load(Ordering::Relaxed)
    }
}

/// A pool of coroutines processing jobs of type `T`.
pub struct WorkerPool<T> {
    config: WorkerPoolConfig,
    sender: mpsc::Sender<T>,
    metrics: Arc<WorkerPoolMetrics>,
    name: Arc<str>,
}

impl<T> Clone for WorkerPool<T> {
    fn clone(&self) -> Self {
        Self {
            config: self.config,
            sender: self.sender.clone(),
            metrics: Arc::clone(&self.metrics),
            name: Arc::clone(&self.name),
        }
    }
}

impl<T: Send + 'static> WorkerPool<T> {
    /// Create a new worker pool and spawn its workers.
    ///
    /// # Safety
    ///
    /// Spawns coroutines with `may::coroutine::Builder::spawn()`, which is
    /// unsafe in the `may` runtime. The handler must not block the worker
    /// thread with non-`may` primitives or access thread-local storage that
    /// assumes a fixed OS thread.
    pub unsafe fn new<F>(name: &str, config: WorkerPoolConfig, handler_fn: F) -> Self
    where
        F: Fn(T) + Send + Clone + 'static,
    {
        let (tx, rx) = mpsc::channel::<T>();
        let rx = Arc::new(Mutex::new(rx));
        let metrics = Arc::new(WorkerPoolMetrics::new());
        let name: Arc<str> = Arc::from(name);

        info!(
            pool = %name,
            num_workers = config.num_workers,
            stack_size = config.stack_size,
            "Creating worker pool"
        );

        for worker_id in 0..config.num_workers {
            let rx = Arc::clone(&rx);
            let handler_fn = handler_fn.clone();
            let pool_name = Arc::clone(&name);
            let metrics = Arc::clone(&metrics);

            let spawn_result = may::coroutine::Builder::new()
                .name(format!("{name}-worker-{worker_id}"))
                .stack_size(config.stack_size)
                .spawn(move || {
                    debug!(pool = %pool_name, worker_id, "Worker coroutine started");

                    loop {
                        // The lock is held only while waiting for the next job.
                        let job = match rx.lock() {
                            Ok(receiver) => receiver.recv(),
                            Err(_) => {
                                error!(pool = %pool_name, worker_id, "Job queue lock poisoned");
                                break;
                            }
                        };
                        let Ok(job) = job else { break };

                        if let Err(panic) =
                            std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| handler_fn(job)))
                        {
                            metrics.record_panic();
                            error!(
                                pool = %pool_name,
                                worker_id,
                                panic_message = ?panic,
                                "Job handler panicked"
                            );
                        }
                        metrics.record_completion();
                    }

                    debug!(pool = %pool_name, worker_id, "Worker coroutine exiting");
                });

            if let Err(e) = spawn_result {
                error!(
                    pool = %name,
                    worker_id,
                    error = %e,
                    "Failed to spawn worker coroutine"
                );
            }
        }

        Self {
            config,
            sender: tx,
            metrics,
            name,
        }
    }
}

impl<T> WorkerPool<T> {
    /// Queue a job. The job is handed back if every worker has exited.
    pub fn dispatch(&self, job: T) -> Result<(), T> {
        self.metrics.record_dispatch();
        if let Err(SendError(job)) = self.sender.send(job) {
            self.metrics.queue_depth.fetch_sub(1, Ordering::Relaxed);
            error!(pool = %self.name, "Worker pool channel disconnected");
            return Err(job);
        }
        Ok(())
    }

    pub fn metrics(&self) -> &Arc<WorkerPoolMetrics> {
        &self.metrics
    }

    pub fn config(&self) -> &WorkerPoolConfig {
        &self.config
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_worker_pool_config_default() {
        let config = WorkerPoolConfig::default();
        assert_eq!(config.num_workers, 4);
        assert_eq!(config.stack_size, 0x10000);
    }

    #[test]
    fn config_follows_server_config() {
        let mut server = ServerConfig::new("/srv/www");
        server.worker_threads = 7;
        server.stack_size = 0x4000;
        assert_eq!(
            WorkerPoolConfig::from_server_config(&server),
            WorkerPoolConfig::new(7, 0x4000)
        );
    }

    #[test]
    fn test_worker_pool_metrics() {
        let metrics = WorkerPoolMetrics::new();
        metrics.record_dispatch();
        metrics.record_dispatch();
        assert_eq!(metrics.get_queue_depth(), 2);
        metrics.record_completion();
        metrics.record_panic();
        assert_eq!(metrics.get_dispatched_count(), 2);
        assert_eq!(metrics.get_completed_count(), 1);
        assert_eq!(metrics.get_queue_depth(), 1);
        assert_eq!(metrics.get_panic_count(), 1);
    }

    #[test]
    fn dispatch_hands_job_back_without_workers() {
        // No worker holds the receiver, so the queue is already closed.
        let pool = unsafe { WorkerPool::new("empty", WorkerPoolConfig::new(0, 0x8000), |_: u8| {}) };
        assert_eq!(pool.dispatch(7), Err(7));
        assert_eq!(pool.metrics().get_dispatched_count(), 1);
        assert_eq!(pool.metrics().get_queue_depth(), 0);
    }
}
