//! Executor implementations.
//!
//! - [`ProcessExecutor`] runs each task in a worker process: the task
//!   envelope is written as JSON to its stdin and the last stdout line is
//!   read back as a [`TaskOutcome`].
//! - [`LocalExecutor`] runs tasks in-process through a [`TaskHandler`].

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::task::{RemoteEnvironment, RemoteExecutor, TaskEnvelope, TaskOutcome, TaskRequest};

/// Runs tasks by spawning a worker command per task.
///
/// The child is spawned with `kill_on_drop`, so dropping the pending
/// `execute` future (cancellation, timeout) stops the remote work.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    command: Vec<String>,
    forward_output: bool,
}

impl ProcessExecutor {
    /// `command[0]` is the executable, the rest are its arguments.
    pub fn new(command: Vec<String>) -> Self {
        Self {
            command,
            forward_output: false,
        }
    }

    /// Log the worker's stderr at info level instead of debug.
    pub fn forward_output(mut self, forward: bool) -> Self {
        self.forward_output = forward;
        self
    }

    fn command_line(&self) -> String {
        self.command.join(" ")
    }
}

#[async_trait]
impl RemoteExecutor for ProcessExecutor {
    async fn execute(
        &self,
        request: &TaskRequest,
        environment: &RemoteEnvironment,
    ) -> Result<bool, PipelineError> {
        let start = Instant::now();
        let Some((exe, args)) = self.command.split_first() else {
            return Err(PipelineError::Workspace(
                "worker command is empty".to_string(),
            ));
        };

        let envelope = TaskEnvelope {
            task_id: Uuid::new_v4(),
            environment: environment.clone(),
            request: request.clone(),
        };
        let payload = serde_json::to_vec(&envelope)
            .map_err(|e| PipelineError::Protocol(format!("cannot encode task: {}", e)))?;

        let mut child = Command::new(exe)
            .args(args)
            .current_dir(&environment.workspace)
            .envs(request.config().env_vars().iter())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| PipelineError::Spawn {
                command: self.command_line(),
                source,
            })?;

        info!(
            task = request.name(),
            task_id = %envelope.task_id,
            worker = %self.command_line(),
            "Dispatched task"
        );

        // The task is written while the output is drained; a worker that
        // logs before reading its input must not stall on a full pipe.
        let stdin = child.stdin.take();
        let send_task = async move {
            if let Some(mut stdin) = stdin {
                stdin.write_all(&payload).await?;
                stdin.shutdown().await?;
            }
            Ok::<(), std::io::Error>(())
        };
        let (sent, output) = tokio::join!(send_task, child.wait_with_output());

        let output =
            output.map_err(|e| PipelineError::Protocol(format!("worker did not finish: {}", e)))?;
        match sent {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                debug!(task = request.name(), "Worker closed its input before reading the task");
            }
            Err(e) => {
                return Err(PipelineError::Protocol(format!("cannot write task: {}", e)));
            }
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        for line in stderr.lines().filter(|l| !l.trim().is_empty()) {
            if self.forward_output {
                info!(task = request.name(), "{}", line);
            } else {
                debug!(task = request.name(), "{}", line);
            }
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let last_line = stdout.lines().rev().find(|l| !l.trim().is_empty());
        let outcome = match last_line.map(serde_json::from_str::<TaskOutcome>) {
            Some(Ok(outcome)) => outcome,
            Some(Err(_)) | None if !output.status.success() => {
                warn!(
                    task = request.name(),
                    exit_code = output.status.code().unwrap_or(-1),
                    "Worker exited without an outcome"
                );
                TaskOutcome::failed()
            }
            Some(Err(e)) => {
                return Err(PipelineError::Protocol(format!(
                    "unreadable outcome from worker: {}",
                    e
                )))
            }
            None => {
                return Err(PipelineError::Protocol(
                    "worker produced no outcome".to_string(),
                ))
            }
        };

        info!(
            task = request.name(),
            success = outcome.success,
            duration_ms = start.elapsed().as_millis() as u64,
            "Task finished"
        );
        let success = outcome.success && output.status.success();
        outcome.into_result(request.name()).map(|ok| ok && success)
    }
}

/// In-process task implementation.
#[async_trait]
pub trait TaskHandler: Send + Sync {
    async fn handle(
        &self,
        request: &TaskRequest,
        environment: &RemoteEnvironment,
    ) -> anyhow::Result<bool>;
}

/// Executor running tasks through a [`TaskHandler`] in the current process.
pub struct LocalExecutor<H> {
    handler: H,
}

impl<H: TaskHandler> LocalExecutor<H> {
    pub fn new(handler: H) -> Self {
        Self { handler }
    }
}

#[async_trait]
impl<H: TaskHandler> RemoteExecutor for LocalExecutor<H> {
    async fn execute(
        &self,
        request: &TaskRequest,
        environment: &RemoteEnvironment,
    ) -> Result<bool, PipelineError> {
        self.handler
            .handle(request, environment)
            .await
            .map_err(|e| PipelineError::Dispatch {
                task: request.name().to_string(),
                cause: format!("{:#}", e),
            })
    }
}
