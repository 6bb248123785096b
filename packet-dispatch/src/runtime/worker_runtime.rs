//! Execution contexts listener workers are launched on.

use crate::error::DispatchError;
use std::thread;
use tokio::runtime::Handle;

pub type WorkerJob = Box<dyn FnOnce() + Send + 'static>;

/// A caller-supplied place to run long-lived worker loops.
///
/// Implementations must not run the job on the privileged context; a worker loop that
/// finds itself there refuses to start.
pub trait WorkerExecutor: Send + Sync {
    fn execute(&self, worker_name: String, job: WorkerJob) -> Result<(), DispatchError>;
}

/// Runs every worker on its own named OS thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadExecutor;

impl WorkerExecutor for ThreadExecutor {
    fn execute(&self, worker_name: String, job: WorkerJob) -> Result<(), DispatchError> {
        thread::Builder::new()
            .name(worker_name)
            .spawn(job)
            .map(|_| ())
            .map_err(|error| DispatchError::Executor(error.to_string()))
    }
}

/// Runs workers on the blocking pool of a tokio runtime.
#[derive(Clone, Debug)]
pub struct TokioBlockingExecutor {
    handle: Handle,
}

impl TokioBlockingExecutor {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime the caller is currently inside of.
    pub fn current() -> Result<Self, DispatchError> {
        Handle::try_current()
            .map(Self::new)
            .map_err(|error| DispatchError::Executor(error.to_string()))
    }
}

impl WorkerExecutor for TokioBlockingExecutor {
    fn execute(&self, _worker_name: String, job: WorkerJob) -> Result<(), DispatchError> {
        // Blocking-pool threads are anonymous; the loop logs its own worker name.
        drop(self.handle.spawn_blocking(job));
        Ok(())
    }
}
