//! perfci domain model.
//!
//! Every artifact is keyed by [`Revision`]; tests and changed entities share
//! one textual identifier format so the selection views can be
//! cross-referenced.

pub mod measurement;
pub mod revision;
pub mod selection;
pub mod test_case;

pub use measurement::{
    Change, Changes, HistogramValues, MeasurementFile, ProjectChanges, ProjectStatistics,
    TestStatistic,
};
pub use revision::{Revision, RevisionPair};
pub use selection::{
    CoverageSelectionInfo, CoverageSelectionVersion, Dependencies, ExecutionData,
    RevisionDependencies, TraceCallSummary,
};
pub use test_case::{ChangedEntity, TestCase, TestSet};
