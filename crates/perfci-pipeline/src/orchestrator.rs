//! Pipeline orchestration.
//!
//! One run walks the state machine in [`crate::stage`] strictly in order:
//! measure remotely, sync, report, and optionally search root causes,
//! sync and report again. The first failing stage ends the run in
//! `Done { success: false }` and marks the host run failed; later stages
//! never execute and already copied artifacts stay in place.

use perfci_core::obs;
use perfci_core::{
    ArtifactCodec, MeasurementAggregator, MeasurementOutcome, MeasurementReport, PerfCiError,
    ProcessConfig, RcaReport, RcaReportBuilder, ResultsFolders, RunHost, SelectionAggregator,
    SelectionReport,
};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::stage::{PipelineStage, PipelineState};
use crate::sync::ArtifactSync;
use crate::task::{RemoteEnvironment, RemoteExecutor, TaskRequest};

/// Locations a run works with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelinePaths {
    /// Project checkout the worker measures.
    pub remote_workspace: PathBuf,
    /// Local result workspace, exclusively owned by this run.
    pub local_results: PathBuf,
}

/// Result of a complete pipeline execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineResult {
    pub run_id: String,

    /// Whether every configured stage succeeded.
    pub success: bool,

    /// Whether the run was interrupted.
    pub cancelled: bool,

    pub final_state: PipelineState,

    /// Every state entered, in order, including `Idle` and the final state.
    pub visited: Vec<PipelineState>,

    /// Stage the run failed or was interrupted in.
    pub failed_stage: Option<PipelineStage>,

    /// Error text of the failing stage, if it raised one.
    pub error: Option<String>,

    pub measurement: Option<MeasurementReport>,
    pub selection: Option<SelectionReport>,
    pub rca: Option<RcaReport>,

    /// Files copied by all sync stages.
    pub files_synced: usize,

    pub duration_ms: u64,
}

impl PipelineResult {
    /// Whether the run entered `state`.
    pub fn reached(&self, state: PipelineState) -> bool {
        self.visited.contains(&state)
    }

    /// Whether `stage` was started.
    pub fn executed(&self, stage: PipelineStage) -> bool {
        self.reached(stage.state())
    }
}

/// Reason a stage did not succeed.
enum StageError {
    /// The task returned a failure result (or timed out).
    Rejected(Option<String>),
    /// The stage raised.
    Failed(PipelineError),
}

impl From<PipelineError> for StageError {
    fn from(err: PipelineError) -> Self {
        StageError::Failed(err)
    }
}

impl From<PerfCiError> for StageError {
    fn from(err: PerfCiError) -> Self {
        StageError::Failed(err.into())
    }
}

struct StageFailure {
    stage: PipelineStage,
    error: Option<String>,
}

#[derive(Default)]
struct Progress {
    visited: Vec<PipelineState>,
    current: Option<PipelineStage>,
    files_synced: usize,
    measurement: Option<MeasurementReport>,
    selection: Option<SelectionReport>,
    rca: Option<RcaReport>,
}

/// Run progress shared between the driving future and the cancellation
/// branch. Never locked across an `.await`.
#[derive(Default)]
struct Tracker(Mutex<Progress>);

impl Tracker {
    fn with<R>(&self, f: impl FnOnce(&mut Progress) -> R) -> R {
        let mut progress = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut progress)
    }

    fn visit(&self, state: PipelineState) {
        self.with(|p| p.visited.push(state));
    }

    fn enter(&self, stage: PipelineStage) {
        self.with(|p| {
            p.visited.push(stage.state());
            p.current = Some(stage);
        });
    }

    fn current(&self) -> Option<PipelineStage> {
        self.with(|p| p.current)
    }

    fn into_progress(self) -> Progress {
        self.0.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Drives one pipeline run.
pub struct PipelineOrchestrator {
    config: ProcessConfig,
    codec: ArtifactCodec,
    executor: Arc<dyn RemoteExecutor>,
    host: Arc<dyn RunHost>,
    environment: RemoteEnvironment,
    folders: ResultsFolders,
}

impl PipelineOrchestrator {
    pub fn new(
        config: ProcessConfig,
        codec: ArtifactCodec,
        executor: Arc<dyn RemoteExecutor>,
        host: Arc<dyn RunHost>,
        paths: PipelinePaths,
    ) -> Self {
        let folders = ResultsFolders::new(paths.local_results, config.job_name());
        Self {
            environment: RemoteEnvironment::for_workspace(paths.remote_workspace),
            config,
            codec,
            executor,
            host,
            folders,
        }
    }

    pub fn config(&self) -> &ProcessConfig {
        &self.config
    }

    pub fn folders(&self) -> &ResultsFolders {
        &self.folders
    }

    pub fn environment(&self) -> &RemoteEnvironment {
        &self.environment
    }

    /// Execute the pipeline to completion.
    ///
    /// Stage failures end in a failed [`PipelineResult`]; `Err` is returned
    /// only when the run cannot start.
    pub async fn run(&self) -> Result<PipelineResult, PipelineError> {
        self.run_until(std::future::pending::<()>()).await
    }

    /// Execute the pipeline until it finishes or `shutdown` resolves.
    ///
    /// On shutdown the in-flight stage is dropped, which abandons a pending
    /// remote task, and the run ends failed with `cancelled` set.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<PipelineResult, PipelineError>
    where
        F: Future<Output = ()>,
    {
        let start = Instant::now();
        self.prepare_workspace()?;
        let digest = self.config.digest()?;

        let run_id = Uuid::new_v4().to_string();
        let job = self.config.job_name();
        self.log_run_metadata(&run_id);
        obs::emit_pipeline_started(&run_id, job, &self.config.revisions().to_string());

        let tracker = Tracker::default();
        tracker.visit(PipelineState::Idle);

        let drive = self
            .drive(&run_id, &digest, &tracker)
            .instrument(obs::pipeline_span(&run_id, job));

        let (success, cancelled, failed_stage, error) = tokio::select! {
            result = drive => match result {
                Ok(()) => (true, false, None, None),
                Err(failure) => (false, false, Some(failure.stage), failure.error),
            },
            _ = shutdown => {
                let stage = tracker.current();
                let err = PipelineError::Cancelled {
                    stage: stage.map(|s| s.name()).unwrap_or("idle").to_string(),
                };
                warn!(run_id = %run_id, "{}", err);
                (false, true, stage, Some(err.to_string()))
            }
        };

        let final_state = PipelineState::Done { success };
        tracker.visit(final_state);
        if !success {
            if let Err(e) = self.host.mark_failed() {
                error!(run_id = %run_id, error = %e, "Could not mark run failed");
            }
        }

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_pipeline_finished(&run_id, final_state.name(), success, duration_ms);

        let progress = tracker.into_progress();
        Ok(PipelineResult {
            run_id,
            success,
            cancelled,
            final_state,
            visited: progress.visited,
            failed_stage,
            error,
            measurement: progress.measurement,
            selection: progress.selection,
            rca: progress.rca,
            files_synced: progress.files_synced,
            duration_ms,
        })
    }

    fn prepare_workspace(&self) -> Result<(), PipelineError> {
        if !self.environment.workspace.is_dir() {
            return Err(PipelineError::Workspace(format!(
                "remote workspace {} does not exist",
                self.environment.workspace.display()
            )));
        }
        std::fs::create_dir_all(self.folders.root()).map_err(|e| {
            PipelineError::Workspace(format!(
                "cannot create local workspace {}: {}",
                self.folders.root().display(),
                e
            ))
        })
    }

    fn log_run_metadata(&self, run_id: &str) {
        let measurement = self.config.measurement();
        info!(
            run_id = %run_id,
            job = %self.config.job_name(),
            workspace = %self.environment.workspace.display(),
            remote_results = %self.environment.results_folder.display(),
            local_results = %self.folders.root().display(),
            "Run metadata"
        );
        info!(
            revisions = %self.config.revisions(),
            vms = measurement.vms,
            iterations = measurement.iterations,
            warmup = measurement.warmup,
            repetitions = measurement.repetitions,
            timeout_ms = measurement.timeout_ms,
            significance_level = measurement.significance_level,
            strategy = ?measurement.strategy,
            source_instrumentation = measurement.use_source_instrumentation,
            sampling = measurement.use_sampling,
            includes = ?measurement.includes,
            execute_rca = self.config.execute_rca(),
            rca_strategy = %self.config.rca_strategy(),
            "Measurement configuration"
        );
    }

    async fn drive(
        &self,
        run_id: &str,
        digest: &str,
        tracker: &Tracker,
    ) -> Result<(), StageFailure> {
        let measure = TaskRequest::measure(self.config.clone());
        self.stage(
            run_id,
            tracker,
            PipelineStage::Measure,
            self.dispatch(measure, self.config.measure_timeout()),
        )
        .await?;

        self.stage(run_id, tracker, PipelineStage::Sync, self.sync(tracker))
            .await?;

        let measured = self
            .stage(run_id, tracker, PipelineStage::Report, async {
                self.report(run_id, digest, tracker)
            })
            .await?;

        if !self.config.execute_rca() {
            info!(run_id = %run_id, "Root-cause analysis not requested");
            return Ok(());
        }

        let search = TaskRequest::root_cause_search(self.config.clone(), measured.project_changes);
        self.stage(
            run_id,
            tracker,
            PipelineStage::RcaRun,
            self.dispatch(search, self.config.measure_timeout()),
        )
        .await?;

        self.stage(run_id, tracker, PipelineStage::RcaSync, self.sync(tracker))
            .await?;

        self.stage(run_id, tracker, PipelineStage::RcaReport, async {
            self.report_rca(&measured.report, tracker)
        })
        .await
    }

    async fn stage<T, F>(
        &self,
        run_id: &str,
        tracker: &Tracker,
        stage: PipelineStage,
        work: F,
    ) -> Result<T, StageFailure>
    where
        F: Future<Output = Result<T, StageError>>,
    {
        tracker.enter(stage);
        obs::emit_stage_started(run_id, stage.name());
        let start = Instant::now();

        let result = work.await;

        let duration_ms = start.elapsed().as_millis() as u64;
        obs::emit_stage_finished(run_id, stage.name(), result.is_ok(), duration_ms);
        result.map_err(|err| match err {
            StageError::Rejected(reason) => {
                warn!(run_id = %run_id, stage = stage.name(), "Stage reported failure");
                StageFailure {
                    stage,
                    error: reason,
                }
            }
            StageError::Failed(e) => {
                obs::emit_stage_failed(run_id, stage.name(), &e);
                StageFailure {
                    stage,
                    error: Some(e.to_string()),
                }
            }
        })
    }

    async fn dispatch(
        &self,
        request: TaskRequest,
        limit: Option<Duration>,
    ) -> Result<(), StageError> {
        let execution = self.executor.execute(&request, &self.environment);
        let completed = match limit {
            Some(limit) => match tokio::time::timeout(limit, execution).await {
                Ok(result) => result?,
                Err(_) => {
                    let err = PipelineError::Timeout {
                        task: request.name().to_string(),
                        secs: limit.as_secs(),
                    };
                    warn!("{}", err);
                    return Err(StageError::Rejected(Some(err.to_string())));
                }
            },
            None => execution.await?,
        };
        if completed {
            Ok(())
        } else {
            Err(StageError::Rejected(None))
        }
    }

    async fn sync(&self, tracker: &Tracker) -> Result<(), StageError> {
        let remote = self.environment.results_folder.clone();
        let local = self.folders.root().to_path_buf();
        let copied = tokio::task::spawn_blocking(move || ArtifactSync::copy(&remote, &local))
            .await
            .map_err(|e| PipelineError::Workspace(format!("artifact copy did not finish: {}", e)))??;
        tracker.with(|p| p.files_synced += copied);
        Ok(())
    }

    fn report(
        &self,
        run_id: &str,
        digest: &str,
        tracker: &Tracker,
    ) -> Result<MeasurementOutcome, StageError> {
        let revisions = self.config.revisions();
        let aggregator = MeasurementAggregator::new(&self.folders, &self.codec);
        let data = aggregator.collect(revisions)?;
        let selection =
            SelectionAggregator::new(&self.folders, &self.codec).aggregate(&revisions.new)?;

        self.host.attach(
            "measurement",
            serde_json::to_value(&data.report).map_err(PerfCiError::from)?,
        )?;
        self.host.attach(
            "rts",
            serde_json::to_value(&selection).map_err(PerfCiError::from)?,
        )?;

        // Last step: a failed report leaves no trend entry behind.
        let measured = aggregator.record(data, run_id, digest)?;

        tracker.with(|p| {
            p.measurement = Some(measured.report.clone());
            p.selection = Some(selection);
        });
        Ok(measured)
    }

    fn report_rca(&self, measured: &MeasurementReport, tracker: &Tracker) -> Result<(), StageError> {
        let report = RcaReportBuilder::new(&self.folders, &self.codec)
            .build(&measured.revisions.new, &measured.changes)?;
        self.host.attach(
            "rca",
            serde_json::to_value(&report).map_err(PerfCiError::from)?,
        )?;
        tracker.with(|p| p.rca = Some(report));
        Ok(())
    }
}
