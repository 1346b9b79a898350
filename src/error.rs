//! Errors a simulation run can fail with.

use std::any::Any;
use std::io;

use thiserror::Error;

use crate::memory_cache::MemoryCacheId;

/// Result alias used across the crate.
pub type SimResult<T> = Result<T, SimError>;

/// Everything that can stop a trial from producing a report.
#[derive(Debug, Error)]
pub enum SimError {
    /// The configuration was rejected before any thread started.
    #[error("invalid simulation configuration: {0}")]
    InvalidConfig(&'static str),

    /// A worker thread panicked, so the trial's totals cannot be trusted.
    #[error("worker for core {core} panicked: {message}")]
    WorkerPanicked {
        /// The core whose worker panicked first.
        core: MemoryCacheId,
        /// The panic message, when it was a string.
        message: String,
    },

    /// The OS refused to start a worker thread.
    #[error("could not spawn worker thread: {0}")]
    Spawn(#[source] io::Error),

    /// A report sink failed to write.
    #[error("could not write report: {0}")]
    Report(#[from] io::Error),
}

impl SimError {
    /// Build a `WorkerPanicked` from the payload `JoinHandle::join` hands back.
    pub fn worker_panicked(core: MemoryCacheId, payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        SimError::WorkerPanicked { core, message }
    }
}
