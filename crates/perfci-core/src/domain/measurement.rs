//! Measurement artifacts: detected changes, per-test statistics and raw
//! execution-time samples.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::revision::Revision;
use super::test_case::TestCase;

/// One detected performance change of a test method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Change {
    pub method: String,

    /// Mean execution time on the baseline revision.
    #[serde(default)]
    pub old_time: f64,

    /// Relative difference, in percent, of the new revision to the baseline.
    #[serde(default)]
    pub change_percent: f64,

    #[serde(default)]
    pub t_value: f64,

    /// Optional manual classification ("CORRECT", "WRONG", ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correctness: Option<String>,
}

/// Changes detected for one revision, grouped by test class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Changes {
    #[serde(default)]
    pub testcase_changes: BTreeMap<String, Vec<Change>>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.testcase_changes.values().all(Vec::is_empty)
    }

    /// Every changed test, in class then method order.
    pub fn changed_tests(&self) -> Vec<TestCase> {
        self.testcase_changes
            .iter()
            .flat_map(|(clazz, changes)| {
                changes
                    .iter()
                    .map(move |change| TestCase::new(clazz.clone(), change.method.clone()))
            })
            .collect()
    }
}

/// Detected changes for every analysed revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectChanges {
    #[serde(default)]
    pub versions: BTreeMap<Revision, Changes>,
}

impl ProjectChanges {
    /// Changes for `revision`, or an empty set when none were recorded.
    pub fn version(&self, revision: &Revision) -> Changes {
        self.versions.get(revision).cloned().unwrap_or_default()
    }
}

/// Statistical summary for one test of the current comparison.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TestStatistic {
    pub mean_old: f64,
    pub mean_current: f64,
    #[serde(default)]
    pub deviation_old: f64,
    #[serde(default)]
    pub deviation_current: f64,
    /// Number of VM runs the summary is based on.
    #[serde(default)]
    pub vms: u32,
    #[serde(default)]
    pub t_value: f64,
    #[serde(default)]
    pub is_change: bool,
}

impl TestStatistic {
    /// Relative difference of the current mean to the baseline, in percent.
    pub fn change_percent(&self) -> Option<f64> {
        if self.mean_old == 0.0 {
            return None;
        }
        Some((self.mean_current - self.mean_old) / self.mean_old * 100.0)
    }
}

/// Per-test statistics of the current comparison, keyed by test id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectStatistics {
    #[serde(default)]
    pub statistics: BTreeMap<String, TestStatistic>,
}

impl ProjectStatistics {
    pub fn len(&self) -> usize {
        self.statistics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.statistics.is_empty()
    }

    pub fn change_count(&self) -> usize {
        self.statistics.values().filter(|s| s.is_change).count()
    }
}

/// Distribution of execution times for the baseline and changed revision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HistogramValues {
    pub baseline: Vec<f64>,
    pub current: Vec<f64>,
}

/// One raw measurement file inside a revision-pair data folder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementFile {
    pub test_case: TestCase,

    /// Execution times (one per VM run) keyed by revision.
    pub values: BTreeMap<Revision, Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_project_changes_version_defaults_to_empty() {
        let changes = ProjectChanges::default();
        assert!(changes.version(&Revision::head()).is_empty());
    }

    #[test]
    fn test_changed_tests() {
        let mut changes = Changes::default();
        changes.testcase_changes.insert(
            "a.ATest".to_string(),
            vec![Change {
                method: "testX".to_string(),
                old_time: 10.0,
                change_percent: 12.5,
                t_value: 3.1,
                correctness: None,
            }],
        );
        assert_eq!(changes.changed_tests(), vec![TestCase::new("a.ATest", "testX")]);
        assert!(!changes.is_empty());
    }

    #[test]
    fn test_change_percent() {
        let stat = TestStatistic {
            mean_old: 100.0,
            mean_current: 110.0,
            ..Default::default()
        };
        let pct = stat.change_percent().unwrap();
        assert!((pct - 10.0).abs() < 1e-9);
        assert!(TestStatistic::default().change_percent().is_none());
    }
}
