//! Worker Pool
//!
//! A fixed set of I/O worker threads owned by one transport strategy. Every
//! connection the strategy opens is driven by this pool, never by the
//! caller's own runtime, so the whole transport can be stopped by releasing
//! the pool. The pool is never shared across strategies.

use std::future::Future;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Runtime;
use tokio::task::JoinHandle;

use crate::error::TransportError;

/// Fixed-size I/O worker pool backing one transport strategy
pub(crate) struct WorkerPool {
    runtime: Mutex<Option<Runtime>>,
    name: &'static str,
}

impl WorkerPool {
    /// Allocate a pool with the given number of worker threads
    /// (0 = one per available core)
    pub(crate) fn new(name: &'static str, workers: usize) -> Result<Self, TransportError> {
        let workers = if workers == 0 {
            std::thread::available_parallelism()
                .map(std::num::NonZeroUsize::get)
                .unwrap_or(2)
        } else {
            workers
        };

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(workers)
            .thread_name(format!("{name}-io"))
            .enable_all()
            .build()?;

        tracing::debug!(pool = name, workers, "worker pool started");
        Ok(Self {
            runtime: Mutex::new(Some(runtime)),
            name,
        })
    }

    /// Submit a task to the pool
    ///
    /// The returned handle is awaited from the caller's context; the task
    /// itself runs on the pool's threads.
    pub(crate) fn spawn<F>(&self, future: F) -> Result<JoinHandle<F::Output>, TransportError>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        let guard = self.runtime.lock();
        let runtime = guard.as_ref().ok_or(TransportError::NotInitialized)?;
        Ok(runtime.handle().spawn(future))
    }

    /// Whether the pool has not been shut down yet
    pub(crate) fn is_active(&self) -> bool {
        self.runtime.lock().is_some()
    }

    /// Release the pool: stop accepting work, give in-flight tasks the
    /// grace period, then stop the worker threads
    ///
    /// Idempotent; repeated calls are no-ops.
    pub(crate) fn shutdown(&self, grace: Duration) {
        if let Some(runtime) = self.runtime.lock().take() {
            tracing::info!(pool = self.name, "shutting down worker pool");
            if tokio::runtime::Handle::try_current().is_ok() {
                // joining runtime threads would block the caller's own
                // runtime, which tokio forbids
                runtime.shutdown_background();
            } else {
                runtime.shutdown_timeout(grace);
            }
        }
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown(Duration::from_millis(0));
    }
}
