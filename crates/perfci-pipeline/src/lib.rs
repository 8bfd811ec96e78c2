//! perfci pipeline
//!
//! Runs the regression pipeline of one CI job:
//! - Dispatches measurement and root-cause tasks to a worker
//! - Copies worker results into the local workspace
//! - Aggregates reports and attaches them to the CI run

pub mod error;
pub mod executor;
pub mod fakes;
pub mod orchestrator;
pub mod stage;
pub mod sync;
pub mod task;

// Re-export key types
pub use error::PipelineError;
pub use executor::{LocalExecutor, ProcessExecutor, TaskHandler};
pub use orchestrator::{PipelineOrchestrator, PipelinePaths, PipelineResult};
pub use stage::{PipelineStage, PipelineState};
pub use sync::ArtifactSync;
pub use task::{RemoteEnvironment, RemoteExecutor, TaskEnvelope, TaskOutcome, TaskRequest};
