//! Structured observability hooks for pipeline lifecycle events.
//!
//! This module provides:
//! - Run-scoped tracing spans via the `PipelineSpan` RAII guard
//! - Emission functions for pipeline start/finish, stage transitions and
//!   missing artifacts
//!
//! Events are emitted at `info!` level (configurable via `RUST_LOG`).

use std::path::Path;

use tracing::{info, warn};

/// RAII guard that enters a run-scoped tracing span for the duration of a
/// pipeline run.
///
/// # Example
///
/// ```ignore
/// let _span = PipelineSpan::enter("run-12345", "nightly-perf");
/// // every tracing call is now tagged with run_id and job
/// ```
pub struct PipelineSpan {
    _span: tracing::span::EnteredSpan,
}

impl PipelineSpan {
    pub fn enter(run_id: &str, job_name: &str) -> Self {
        Self {
            _span: pipeline_span(run_id, job_name).entered(),
        }
    }
}

/// The run-scoped span, for instrumenting futures (an entered span must not
/// be held across `.await`).
pub fn pipeline_span(run_id: &str, job_name: &str) -> tracing::Span {
    tracing::info_span!("perfci.pipeline", run_id = %run_id, job = %job_name)
}

/// Emit event: pipeline started.
pub fn emit_pipeline_started(run_id: &str, job_name: &str, revisions: &str) {
    info!(event = "pipeline.started", run_id = %run_id, job = %job_name, revisions = %revisions);
}

/// Emit event: a stage was entered.
pub fn emit_stage_started(run_id: &str, stage: &str) {
    info!(event = "stage.started", run_id = %run_id, stage = %stage);
}

/// Emit event: a stage completed, successfully or not.
pub fn emit_stage_finished(run_id: &str, stage: &str, success: bool, duration_ms: u64) {
    info!(
        event = "stage.finished",
        run_id = %run_id,
        stage = %stage,
        success = success,
        duration_ms = duration_ms,
    );
}

/// Emit event: pipeline reached its terminal state.
pub fn emit_pipeline_finished(run_id: &str, final_state: &str, success: bool, duration_ms: u64) {
    info!(
        event = "pipeline.finished",
        run_id = %run_id,
        state = %final_state,
        success = success,
        duration_ms = duration_ms,
    );
}

/// Emit event: an optional artifact had no data for the revision.
pub fn emit_artifact_missing(kind: &str, path: &Path, revision: &str) {
    info!(
        event = "artifact.missing",
        kind = %kind,
        path = %path.display(),
        revision = %revision,
    );
}

/// Emit event: a stage failed (warning level).
pub fn emit_stage_failed(run_id: &str, stage: &str, error: &dyn std::fmt::Display) {
    warn!(event = "stage.failed", run_id = %run_id, stage = %stage, error = %error);
}
