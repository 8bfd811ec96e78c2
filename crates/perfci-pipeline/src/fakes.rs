//! Scripted executor for tests.
//!
//! `ScriptedExecutor` answers each task kind with a fixed step and, when the
//! step succeeds, writes its configured artifacts into the remote results
//! folder the way a real worker would.

use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::task::{RemoteEnvironment, RemoteExecutor, TaskRequest};

/// How a scripted task behaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptedStep {
    /// Write the artifacts and return `true`.
    Succeed,
    /// Return `false`.
    Fail,
    /// Raise a remote error with this cause.
    Raise(String),
    /// Never return.
    Hang,
}

#[derive(Debug)]
pub struct ScriptedExecutor {
    measure: ScriptedStep,
    root_cause: ScriptedStep,
    measure_artifacts: Vec<(PathBuf, String)>,
    rca_artifacts: Vec<(PathBuf, String)>,
    calls: Mutex<Vec<TaskRequest>>,
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self {
            measure: ScriptedStep::Succeed,
            root_cause: ScriptedStep::Succeed,
            measure_artifacts: Vec::new(),
            rca_artifacts: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl ScriptedExecutor {
    /// Executor on which every task succeeds without artifacts.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn measure(mut self, step: ScriptedStep) -> Self {
        self.measure = step;
        self
    }

    pub fn root_cause(mut self, step: ScriptedStep) -> Self {
        self.root_cause = step;
        self
    }

    /// File (relative to the results folder) written by a successful
    /// measure task.
    pub fn with_measure_artifact(
        mut self,
        relative: impl Into<PathBuf>,
        content: impl Into<String>,
    ) -> Self {
        self.measure_artifacts
            .push((relative.into(), content.into()));
        self
    }

    /// File written by a successful root-cause search.
    pub fn with_rca_artifact(
        mut self,
        relative: impl Into<PathBuf>,
        content: impl Into<String>,
    ) -> Self {
        self.rca_artifacts.push((relative.into(), content.into()));
        self
    }

    /// Requests received so far, in order.
    pub fn calls(&self) -> Vec<TaskRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_names(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().iter().map(|r| r.name()).collect()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn execute(
        &self,
        request: &TaskRequest,
        environment: &RemoteEnvironment,
    ) -> Result<bool, PipelineError> {
        self.calls.lock().unwrap().push(request.clone());

        let (step, artifacts) = match request {
            TaskRequest::Measure { .. } => (&self.measure, &self.measure_artifacts),
            TaskRequest::RootCauseSearch { .. } => (&self.root_cause, &self.rca_artifacts),
        };

        match step {
            ScriptedStep::Succeed => {
                for (relative, content) in artifacts {
                    let path = environment.results_folder.join(relative);
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent).map_err(|source| {
                            PipelineError::Sync {
                                path: parent.to_path_buf(),
                                source,
                            }
                        })?;
                    }
                    std::fs::write(&path, content)
                        .map_err(|source| PipelineError::Sync { path, source })?;
                }
                // A real worker always leaves its results folder behind.
                std::fs::create_dir_all(&environment.results_folder).map_err(|source| {
                    PipelineError::Sync {
                        path: environment.results_folder.clone(),
                        source,
                    }
                })?;
                Ok(true)
            }
            ScriptedStep::Fail => Ok(false),
            ScriptedStep::Raise(cause) => Err(PipelineError::Dispatch {
                task: request.name().to_string(),
                cause: cause.clone(),
            }),
            ScriptedStep::Hang => futures::future::pending().await,
        }
    }
}
