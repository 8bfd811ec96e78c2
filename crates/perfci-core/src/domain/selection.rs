//! Test-selection artifacts produced by the static, dynamic and coverage
//! selection collaborators. All of them are read-only inputs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::revision::Revision;
use super::test_case::{ChangedEntity, TestCase, TestSet};

/// Static selection: changed entity to the tests depending on it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionDependencies {
    pub changed_clazzes: BTreeMap<ChangedEntity, TestSet>,
}

/// Static-analysis output, keyed by revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Dependencies {
    pub versions: BTreeMap<Revision, RevisionDependencies>,
}

impl Dependencies {
    pub fn version(&self, revision: &Revision) -> Option<&RevisionDependencies> {
        self.versions.get(revision)
    }
}

/// Trace-based selection, keyed by revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionData {
    pub versions: BTreeMap<Revision, TestSet>,
}

impl ExecutionData {
    pub fn version(&self, revision: &Revision) -> Option<&TestSet> {
        self.versions.get(revision)
    }
}

/// Per-test coverage summary.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TraceCallSummary {
    /// Number of calls into changed code.
    #[serde(default)]
    pub overall_score: u64,

    /// Whether the coverage strategy selected this test.
    #[serde(default)]
    pub selected: bool,

    /// Calls per covered method.
    #[serde(default)]
    pub call_counts: BTreeMap<String, u64>,
}

/// Coverage-based selection record for one revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CoverageSelectionVersion {
    #[serde(default)]
    pub testcases: BTreeMap<TestCase, TraceCallSummary>,
}

impl CoverageSelectionVersion {
    /// Identifiers of the tests the coverage strategy selected.
    pub fn selected_tests(&self) -> Vec<String> {
        self.testcases
            .iter()
            .filter(|(_, summary)| summary.selected)
            .map(|(test, _)| test.executable())
            .collect()
    }
}

/// Coverage-based selection, keyed by revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CoverageSelectionInfo {
    pub versions: BTreeMap<Revision, CoverageSelectionVersion>,
}

impl CoverageSelectionInfo {
    pub fn version(&self, revision: &Revision) -> Option<&CoverageSelectionVersion> {
        self.versions.get(revision)
    }
}
