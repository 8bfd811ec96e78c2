//! Root-cause analysis report.
//!
//! After the root-cause search has been synced, the call tree of every
//! changed test is read from the RCA folder of the measured revision.

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::codec::ArtifactCodec;
use crate::domain::{Changes, Revision};
use crate::error::Result;
use crate::workspace::ResultsFolders;

/// One node of a measured call tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallTreeNode {
    /// Called operation, e.g. `com.foo.Bar#run`.
    pub call: String,
    #[serde(default)]
    pub mean_old: f64,
    #[serde(default)]
    pub mean_current: f64,
    /// Whether the node's duration changed significantly.
    #[serde(default)]
    pub is_change: bool,
    #[serde(default)]
    pub children: Vec<CallTreeNode>,
}

impl CallTreeNode {
    /// Total number of nodes in this subtree.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(CallTreeNode::node_count).sum::<usize>()
    }

    /// Calls of changed nodes whose children did not change: the most
    /// specific root-cause candidates.
    pub fn root_causes(&self) -> Vec<&str> {
        let mut causes = Vec::new();
        self.collect_root_causes(&mut causes);
        causes
    }

    fn collect_root_causes<'a>(&'a self, causes: &mut Vec<&'a str>) {
        if !self.is_change {
            return;
        }
        let changed_children: Vec<&CallTreeNode> =
            self.children.iter().filter(|c| c.is_change).collect();
        if changed_children.is_empty() {
            causes.push(&self.call);
        } else {
            for child in changed_children {
                child.collect_root_causes(causes);
            }
        }
    }
}

/// Root-cause result of one changed test.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcaTestResult {
    pub test: String,
    /// `None` when the search produced no tree for the test.
    pub tree: Option<CallTreeNode>,
}

/// Root-cause results of one revision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RcaReport {
    pub revision: Revision,
    pub results: Vec<RcaTestResult>,
}

impl RcaReport {
    pub fn analysed_count(&self) -> usize {
        self.results.iter().filter(|r| r.tree.is_some()).count()
    }
}

/// Reads call trees for the changed tests of a revision.
pub struct RcaReportBuilder<'a> {
    folders: &'a ResultsFolders,
    codec: &'a ArtifactCodec,
}

impl<'a> RcaReportBuilder<'a> {
    pub fn new(folders: &'a ResultsFolders, codec: &'a ArtifactCodec) -> Self {
        Self { folders, codec }
    }

    pub fn build(&self, revision: &Revision, changes: &Changes) -> Result<RcaReport> {
        let mut results = Vec::new();
        for test in changes.changed_tests() {
            let path = self.folders.rca_tree_file(revision, &test)?;
            let tree: Option<CallTreeNode> = self.codec.read_optional(&path)?;
            if tree.is_none() {
                warn!(test = %test, path = %path.display(), "No call tree for changed test");
            }
            results.push(RcaTestResult {
                test: test.executable(),
                tree,
            });
        }

        let report = RcaReport {
            revision: revision.clone(),
            results,
        };
        info!(
            revision = %revision,
            tests = report.results.len(),
            analysed = report.analysed_count(),
            "Built root-cause report"
        );
        Ok(report)
    }
}
