//! Markdown summaries of the pipeline reports for CI job pages and PR
//! comments.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::Result;
use crate::measurement::MeasurementReport;
use crate::rca::RcaReport;
use crate::selection::SelectionReport;

/// Render the measurement summary.
pub fn render_measurement_summary_md(report: &MeasurementReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Performance Measurement {}\n", report.revisions);
    let _ = writeln!(
        out,
        "- measured tests: {}\n- tests with statistics: {}\n- significant changes: {}\n",
        report.histograms.len(),
        report.statistics.len(),
        report.statistics.change_count()
    );

    let changed = report.changes.changed_tests();
    if !changed.is_empty() {
        out.push_str("## Changes\n");
        for (clazz, changes) in &report.changes.testcase_changes {
            for change in changes {
                let _ = writeln!(
                    out,
                    "- `{}#{}`: {:+.2}%",
                    clazz, change.method, change.change_percent
                );
            }
        }
        out.push('\n');
    }

    if !report.statistics.is_empty() {
        out.push_str("## Statistics\n");
        out.push_str("| test | mean old | mean current | change |\n|---|---|---|---|\n");
        for (test, stat) in &report.statistics.statistics {
            let change = stat
                .change_percent()
                .map(|p| format!("{:+.2}%", p))
                .unwrap_or_else(|| "n/a".to_string());
            let _ = writeln!(
                out,
                "| `{}` | {:.3} | {:.3} | {} |",
                test, stat.mean_old, stat.mean_current, change
            );
        }
    }
    out
}

/// Render the test-selection summary.
pub fn render_selection_summary_md(report: &SelectionReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Regression Test Selection {}\n", report.revision);

    out.push_str("## Static Selection\n");
    if report.static_selection.is_empty() {
        out.push_str("_no data_\n");
    }
    for entry in &report.static_selection {
        let _ = writeln!(out, "- `{}`: {} test(s)", entry.changed_entity, entry.tests.len());
        for test in &entry.tests {
            let _ = writeln!(out, "  - `{}`", test);
        }
    }

    out.push_str("\n## Dynamic Selection\n");
    if report.dynamic_selection.is_empty() {
        out.push_str("_no data_\n");
    }
    for test in &report.dynamic_selection {
        let _ = writeln!(out, "- `{}`", test);
    }

    out.push_str("\n## Coverage Selection\n");
    match &report.coverage_selection {
        None => out.push_str("_not computed_\n"),
        Some(coverage) => {
            for (test, summary) in coverage.testcases.iter().filter(|(_, s)| s.selected) {
                let _ = writeln!(
                    out,
                    "- `{}` ({} calls)",
                    test.executable(),
                    summary.overall_score
                );
            }
        }
    }
    out
}

/// Render the root-cause summary.
pub fn render_rca_summary_md(report: &RcaReport) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Root-Cause Analysis {}\n", report.revision);
    for result in &report.results {
        match &result.tree {
            Some(tree) => {
                let causes = tree.root_causes();
                let _ = writeln!(
                    out,
                    "- `{}`: {} node(s), root causes: {}",
                    result.test,
                    tree.node_count(),
                    if causes.is_empty() {
                        "none".to_string()
                    } else {
                        causes.join(", ")
                    }
                );
            }
            None => {
                let _ = writeln!(out, "- `{}`: no call tree", result.test);
            }
        }
    }
    out
}

/// Write a markdown summary next to the JSON reports.
pub fn write_summary_md(path: &Path, markdown: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, markdown)?;
    Ok(())
}
