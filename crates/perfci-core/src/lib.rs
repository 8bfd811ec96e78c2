//! perfci core library
//!
//! Data model, configuration and artifact aggregation for performance
//! regression testing in CI:
//! - Merges static, trace-based and coverage-based test selections per revision
//! - Builds measurement reports and keeps the append-only trend ledger
//! - Reads root-cause analysis call trees

pub mod codec;
pub mod config;
pub mod domain;
pub mod error;
pub mod histogram;
pub mod host;
pub mod measurement;
pub mod obs;
pub mod rca;
pub mod reporting;
pub mod selection;
pub mod telemetry;
pub mod trend;
pub mod workspace;

pub use codec::ArtifactCodec;
pub use config::{
    CauseSearcherConfig, DependencyConfig, EnvironmentVariables, MeasurementConfig,
    MeasurementStrategy, ProcessConfig, ProcessConfigBuilder, ProcessConfigFile, RcaStrategy,
    RecordType,
};
pub use domain::{
    Change, ChangedEntity, Changes, CoverageSelectionInfo, CoverageSelectionVersion,
    Dependencies, ExecutionData, HistogramValues, MeasurementFile, ProjectChanges,
    ProjectStatistics, Revision, RevisionDependencies, RevisionPair, TestCase, TestSet,
    TestStatistic, TraceCallSummary,
};
pub use error::{PerfCiError, Result};
pub use histogram::HistogramReader;
pub use host::{FsRunHost, MemoryRunHost, RunHost, RunStatus};
pub use measurement::{
    MeasurementAggregator, MeasurementData, MeasurementOutcome, MeasurementReport,
};
pub use obs::PipelineSpan;
pub use rca::{CallTreeNode, RcaReport, RcaReportBuilder, RcaTestResult};
pub use reporting::{
    render_measurement_summary_md, render_rca_summary_md, render_selection_summary_md,
    write_summary_md,
};
pub use selection::{SelectionAggregator, SelectionReport, StaticSelectionEntry, TraceView};
pub use telemetry::{init_tracing, LogFormat};
pub use trend::{TrendEntry, TrendRecord, TrendStore};
pub use workspace::{remote_results_folder, ResultsFolders};

/// perfci version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
