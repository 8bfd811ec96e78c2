//! Layout of the local result workspace.
//!
//! One workspace belongs to exactly one job; concurrent jobs must use
//! distinct roots. There is no locking.

use std::path::{Path, PathBuf};

use crate::domain::{Revision, RevisionPair, TestCase};
use crate::error::{PerfCiError, Result};

/// Suffix of the remote results folder next to the remote workspace.
pub const REMOTE_RESULTS_SUFFIX: &str = "_fullPeass";

/// Paths of every artifact inside a job's result workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultsFolders {
    root: PathBuf,
    job_name: String,
}

impl ResultsFolders {
    pub fn new(root: impl Into<PathBuf>, job_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            job_name: job_name.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    /// Static selection (`Dependencies`).
    pub fn dependency_file(&self) -> PathBuf {
        self.root.join(format!("deps_{}.json", self.job_name))
    }

    /// Trace-based selection (`ExecutionData`).
    pub fn execution_file(&self) -> PathBuf {
        self.root.join(format!("execute_{}.json", self.job_name))
    }

    /// Coverage-based selection (`CoverageSelectionInfo`).
    pub fn coverage_info_file(&self) -> PathBuf {
        self.root.join(format!("coverageSelection_{}.json", self.job_name))
    }

    pub fn changes_file(&self) -> PathBuf {
        self.root.join("changes.json")
    }

    pub fn statistics_file(&self) -> PathBuf {
        self.root.join("statistics.json")
    }

    pub fn trend_file(&self) -> PathBuf {
        self.root.join("trend.json")
    }

    /// Raw measurement data of one revision pair.
    pub fn data_folder(&self, revisions: &RevisionPair) -> PathBuf {
        self.root.join(revisions.folder_name())
    }

    /// Trace views of one revision.
    pub fn view_folder(&self, revision: &Revision) -> PathBuf {
        self.root
            .join(format!("views_{}", self.job_name))
            .join(format!("view_{}", revision))
    }

    /// Trace file of `test` for `revision`.
    ///
    /// Test names come from worker artifacts and must stay inside the
    /// workspace.
    pub fn trace_file(&self, revision: &Revision, test: &TestCase) -> Result<PathBuf> {
        let method = test.method.as_deref().unwrap_or("");
        path_segment(revision.as_str())?;
        path_segment(test.short_clazz())?;
        path_segment(method)?;
        Ok(self
            .view_folder(revision)
            .join(format!("{}#{}.txt", test.short_clazz(), method)))
    }

    /// Root-cause analysis results of one revision.
    pub fn rca_folder(&self, revision: &Revision) -> PathBuf {
        self.root.join("rca").join(revision.as_str())
    }

    /// Call tree of `test` for `revision`.
    pub fn rca_tree_file(&self, revision: &Revision, test: &TestCase) -> Result<PathBuf> {
        let method = test.method.as_deref().unwrap_or("");
        path_segment(revision.as_str())?;
        path_segment(&test.clazz)?;
        path_segment(method)?;
        Ok(self
            .rca_folder(revision)
            .join(&test.clazz)
            .join(format!("{}.json", method)))
    }
}

/// Reject names that would leave the directory they are joined onto.
fn path_segment(name: &str) -> Result<()> {
    let escapes = name.contains(['/', '\\', '\0']) || name == "." || name.contains("..");
    if escapes {
        return Err(PerfCiError::UnsafePathSegment(name.to_string()));
    }
    Ok(())
}

/// Results folder the remote worker writes for the project in `workspace`:
/// the sibling `<workspace name>_fullPeass`.
pub fn remote_results_folder(workspace: &Path) -> PathBuf {
    let name = workspace
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "workspace".to_string());
    let parent = workspace.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{}{}", name, REMOTE_RESULTS_SUFFIX))
}
