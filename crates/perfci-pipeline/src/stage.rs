//! Pipeline stages and states.

use serde::{Deserialize, Serialize};

/// Units of work of a pipeline run, in execution order.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Remote selection and measurement.
    Measure,

    /// Copy measurement results into the local workspace.
    Sync,

    /// Aggregate selection and measurement results and attach them.
    Report,

    /// Remote root-cause search.
    RcaRun,

    /// Copy root-cause results into the local workspace.
    RcaSync,

    /// Build and attach the root-cause report.
    RcaReport,
}

impl PipelineStage {
    /// Get the stage name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            PipelineStage::Measure => "measure",
            PipelineStage::Sync => "sync",
            PipelineStage::Report => "report",
            PipelineStage::RcaRun => "rca_run",
            PipelineStage::RcaSync => "rca_sync",
            PipelineStage::RcaReport => "rca_report",
        }
    }

    /// State the pipeline is in while this stage runs.
    pub fn state(&self) -> PipelineState {
        match self {
            PipelineStage::Measure => PipelineState::Measuring,
            PipelineStage::Sync => PipelineState::Syncing,
            PipelineStage::Report => PipelineState::Reporting,
            PipelineStage::RcaRun => PipelineState::RcaRunning,
            PipelineStage::RcaSync => PipelineState::RcaSyncing,
            PipelineStage::RcaReport => PipelineState::RcaReporting,
        }
    }

    /// Whether this stage belongs to the root-cause part of the run.
    pub fn is_rca(&self) -> bool {
        matches!(
            self,
            PipelineStage::RcaRun | PipelineStage::RcaSync | PipelineStage::RcaReport
        )
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// State machine of one run.
///
/// ```text
/// Idle -> Measuring -> Syncing -> Reporting -> Done
///                                      \-> RcaRunning -> RcaSyncing -> RcaReporting -> Done
/// ```
///
/// Any failing state moves straight to `Done { success: false }`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Measuring,
    Syncing,
    Reporting,
    RcaRunning,
    RcaSyncing,
    RcaReporting,
    Done { success: bool },
}

impl PipelineState {
    pub fn name(&self) -> &'static str {
        match self {
            PipelineState::Idle => "idle",
            PipelineState::Measuring => "measuring",
            PipelineState::Syncing => "syncing",
            PipelineState::Reporting => "reporting",
            PipelineState::RcaRunning => "rca_running",
            PipelineState::RcaSyncing => "rca_syncing",
            PipelineState::RcaReporting => "rca_reporting",
            PipelineState::Done { success: true } => "done",
            PipelineState::Done { success: false } => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, PipelineState::Done { .. })
    }
}

impl std::fmt::Display for PipelineState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}
