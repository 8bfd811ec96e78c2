//! Multi-strategy test-selection aggregation.
//!
//! Reads the static, dynamic and coverage selection artifacts independently
//! and merges them into one [`SelectionReport`] for a revision. A missing
//! file and a file without an entry for the revision are both "no data" and
//! never fail; only malformed files do.

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::codec::ArtifactCodec;
use crate::domain::{
    CoverageSelectionInfo, CoverageSelectionVersion, Dependencies, ExecutionData, Revision,
    TestCase,
};
use crate::error::Result;
use crate::obs::emit_artifact_missing;
use crate::workspace::ResultsFolders;

/// Tests depending on one changed entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticSelectionEntry {
    /// Display form of the changed entity.
    pub changed_entity: String,
    /// Test identifiers, in selection order. May be empty.
    pub tests: Vec<String>,
}

/// Trace recorded for a dynamically selected test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceView {
    pub test: String,
    /// Trace text; empty when no trace file exists.
    pub source: String,
}

/// Unified selection view for one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionReport {
    pub revision: Revision,

    /// Static selection in changed-entity order.
    pub static_selection: Vec<StaticSelectionEntry>,

    /// Trace-based selection.
    pub dynamic_selection: Vec<String>,

    /// Coverage record; `None` means coverage selection was not computed,
    /// which is different from selecting zero tests.
    pub coverage_selection: Option<CoverageSelectionVersion>,

    /// Traces of the dynamically selected tests.
    #[serde(default)]
    pub traces: Vec<TraceView>,
}

impl SelectionReport {
    /// Report with no data from any strategy.
    pub fn empty(revision: Revision) -> Self {
        Self {
            revision,
            static_selection: Vec::new(),
            dynamic_selection: Vec::new(),
            coverage_selection: None,
            traces: Vec::new(),
        }
    }

    /// Changed entities known to the static selection.
    pub fn changed_entities(&self) -> Vec<&str> {
        self.static_selection
            .iter()
            .map(|entry| entry.changed_entity.as_str())
            .collect()
    }

    /// Tests of the static view for `changed_entity`.
    pub fn static_tests(&self, changed_entity: &str) -> Option<&[String]> {
        self.static_selection
            .iter()
            .find(|entry| entry.changed_entity == changed_entity)
            .map(|entry| entry.tests.as_slice())
    }

    /// Tests the coverage strategy selected, if it ran.
    pub fn coverage_selected(&self) -> Option<Vec<String>> {
        self.coverage_selection
            .as_ref()
            .map(CoverageSelectionVersion::selected_tests)
    }

    pub fn is_empty(&self) -> bool {
        self.static_selection.is_empty()
            && self.dynamic_selection.is_empty()
            && self.coverage_selection.is_none()
    }
}

/// Builds [`SelectionReport`]s from a job's result workspace.
pub struct SelectionAggregator<'a> {
    folders: &'a ResultsFolders,
    codec: &'a ArtifactCodec,
}

impl<'a> SelectionAggregator<'a> {
    pub fn new(folders: &'a ResultsFolders, codec: &'a ArtifactCodec) -> Self {
        Self { folders, codec }
    }

    /// Build the selection report for `revision`.
    ///
    /// Never fails because data is missing; an all-empty report is valid
    /// (e.g. the first revision of a job's history).
    pub fn aggregate(&self, revision: &Revision) -> Result<SelectionReport> {
        let static_selection = self.read_static_selection(revision)?;
        let dynamic_tests = self.read_dynamic_selection(revision)?;
        let coverage_selection = self.read_coverage_selection(revision)?;
        let traces = self.read_traces(revision, &dynamic_tests)?;

        debug!(
            revision = %revision,
            changed = static_selection.len(),
            dynamic = dynamic_tests.len(),
            coverage = coverage_selection.is_some(),
            "Aggregated test selection"
        );

        Ok(SelectionReport {
            revision: revision.clone(),
            static_selection,
            dynamic_selection: dynamic_tests.iter().map(TestCase::executable).collect(),
            coverage_selection,
            traces,
        })
    }

    /// Static selection: every changed entity with its (possibly empty) test
    /// list.
    pub fn read_static_selection(&self, revision: &Revision) -> Result<Vec<StaticSelectionEntry>> {
        let path = self.folders.dependency_file();
        let Some(dependencies) = self.codec.read_optional::<Dependencies>(&path)? else {
            warn!(path = %path.display(), "Static selection file not found, selection seems to not have run");
            emit_artifact_missing("static", &path, revision.as_str());
            return Ok(Vec::new());
        };
        let Some(version) = dependencies.version(revision) else {
            emit_artifact_missing("static", &path, revision.as_str());
            return Ok(Vec::new());
        };

        Ok(version
            .changed_clazzes
            .iter()
            .map(|(entity, tests)| StaticSelectionEntry {
                changed_entity: entity.to_string(),
                tests: tests.executables(),
            })
            .collect())
    }

    /// Dynamic selection in test-set order.
    pub fn read_dynamic_selection(&self, revision: &Revision) -> Result<Vec<TestCase>> {
        let path = self.folders.execution_file();
        let Some(executions) = self.codec.read_optional::<ExecutionData>(&path)? else {
            info!(path = %path.display(), "Trace selection file not found, selection info might be incomplete");
            emit_artifact_missing("dynamic", &path, revision.as_str());
            return Ok(Vec::new());
        };
        match executions.version(revision) {
            Some(tests) => Ok(tests.tests().to_vec()),
            None => {
                emit_artifact_missing("dynamic", &path, revision.as_str());
                Ok(Vec::new())
            }
        }
    }

    /// Coverage record; `None` when coverage selection did not run for the
    /// revision.
    pub fn read_coverage_selection(
        &self,
        revision: &Revision,
    ) -> Result<Option<CoverageSelectionVersion>> {
        let path = self.folders.coverage_info_file();
        let Some(info) = self.codec.read_optional::<CoverageSelectionInfo>(&path)? else {
            info!(path = %path.display(), "Coverage selection file not found, selection info might be incomplete");
            emit_artifact_missing("coverage", &path, revision.as_str());
            return Ok(None);
        };
        let version = info.version(revision).cloned();
        if version.is_none() {
            emit_artifact_missing("coverage", &path, revision.as_str());
        }
        Ok(version)
    }

    fn read_traces(&self, revision: &Revision, tests: &[TestCase]) -> Result<Vec<TraceView>> {
        let mut traces = Vec::with_capacity(tests.len());
        for test in tests {
            let path = self.folders.trace_file(revision, test)?;
            let source = match std::fs::read_to_string(&path) {
                Ok(source) => source,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!(path = %path.display(), "No trace file");
                    String::new()
                }
                Err(e) => return Err(e.into()),
            };
            traces.push(TraceView {
                test: test.executable(),
                source,
            });
        }
        Ok(traces)
    }
}
