//! Errors of the remote-dispatch and orchestration layer.

use std::path::PathBuf;

use perfci_core::PerfCiError;
use thiserror::Error;

/// Errors produced while dispatching tasks or running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The remote side raised an error while running the task.
    #[error("remote task '{task}' failed: {cause}")]
    Dispatch { task: String, cause: String },

    /// The task did not finish within its wall-clock budget.
    #[error("remote task '{task}' timed out after {secs} seconds")]
    Timeout { task: String, secs: u64 },

    /// The run was interrupted while a stage was in flight.
    #[error("pipeline cancelled during stage '{stage}'")]
    Cancelled { stage: String },

    /// The worker answered with something that is not a task outcome.
    #[error("protocol error talking to worker: {0}")]
    Protocol(String),

    /// The worker process could not be started.
    #[error("failed to spawn worker '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    /// Copying results back from the remote workspace failed.
    #[error("artifact sync failed at {path:?}: {source}")]
    Sync {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The remote or local workspace is unusable.
    #[error("workspace error: {0}")]
    Workspace(String),

    /// Bubbled-up core error (configuration, artifacts, host).
    #[error(transparent)]
    Core(#[from] PerfCiError),
}
