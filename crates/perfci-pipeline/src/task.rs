//! Remote tasks and the executor boundary.
//!
//! A task is a self-contained, serializable request. It carries the full
//! configuration and, for the root-cause search, the detected changes, so
//! the worker needs nothing from the controller besides the request.

use async_trait::async_trait;
use perfci_core::{CauseSearcherConfig, ProcessConfig, ProjectChanges};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::error::PipelineError;

/// A unit of work executed on the measurement worker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum TaskRequest {
    /// Regression test selection followed by measurement of the selected
    /// tests on the configured revision pair.
    Measure { config: ProcessConfig },
    /// Root-cause search over the call trees of the changed tests.
    RootCauseSearch {
        config: ProcessConfig,
        cause_searcher: CauseSearcherConfig,
        changes: ProjectChanges,
    },
}

impl TaskRequest {
    pub fn measure(config: ProcessConfig) -> Self {
        Self::Measure { config }
    }

    /// Root-cause search request using the configured strategy.
    pub fn root_cause_search(config: ProcessConfig, changes: ProjectChanges) -> Self {
        let cause_searcher = config.cause_searcher_config();
        Self::RootCauseSearch {
            config,
            cause_searcher,
            changes,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Measure { .. } => "measure",
            Self::RootCauseSearch { .. } => "root_cause_search",
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        match self {
            Self::Measure { config } | Self::RootCauseSearch { config, .. } => config,
        }
    }
}

/// Where the task runs and where it leaves its results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEnvironment {
    /// Project checkout on the worker.
    pub workspace: PathBuf,
    /// Folder the worker writes results into.
    pub results_folder: PathBuf,
}

impl RemoteEnvironment {
    /// Environment for `workspace` with the conventional results folder.
    pub fn for_workspace(workspace: impl Into<PathBuf>) -> Self {
        let workspace = workspace.into();
        let results_folder = perfci_core::remote_results_folder(&workspace);
        Self {
            workspace,
            results_folder,
        }
    }

    pub fn workspace(&self) -> &Path {
        &self.workspace
    }
}

/// Message written to a worker process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    pub task_id: Uuid,
    pub environment: RemoteEnvironment,
    pub request: TaskRequest,
}

/// Message a worker answers with.
///
/// `success == false` with no `error` is a regular failure result; an
/// `error` means the task raised and is surfaced to the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskOutcome {
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl TaskOutcome {
    pub fn succeeded() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    pub fn failed() -> Self {
        Self {
            success: false,
            error: None,
        }
    }

    pub fn raised(cause: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(cause.into()),
        }
    }

    /// Convert into the executor result for `task`.
    pub fn into_result(self, task: &str) -> Result<bool, PipelineError> {
        match self.error {
            Some(cause) => Err(PipelineError::Dispatch {
                task: task.to_string(),
                cause,
            }),
            None => Ok(self.success),
        }
    }
}

/// Runs tasks on the measurement worker and blocks until they finish.
///
/// Returns the task's boolean result, or an error when the task raised or
/// could not be dispatched. Implementations must stop the remote work when
/// the returned future is dropped.
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn execute(
        &self,
        request: &TaskRequest,
        environment: &RemoteEnvironment,
    ) -> Result<bool, PipelineError>;
}
