//! Measurement report aggregation.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

use crate::codec::ArtifactCodec;
use crate::domain::{Changes, HistogramValues, ProjectChanges, ProjectStatistics, RevisionPair};
use crate::error::Result;
use crate::histogram::HistogramReader;
use crate::trend::{TrendEntry, TrendStore};
use crate::workspace::ResultsFolders;

/// Measurement results of one revision pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeasurementReport {
    pub revisions: RevisionPair,
    /// Changes detected for the new revision.
    pub changes: Changes,
    pub statistics: ProjectStatistics,
    /// Execution-time distributions per test id.
    pub histograms: BTreeMap<String, HistogramValues>,
}

/// Measurement data read for one revision pair, not yet in the trend ledger.
#[derive(Debug, Clone)]
pub struct MeasurementData {
    pub report: MeasurementReport,
    /// Changes of every revision, handed to the root-cause search.
    pub project_changes: ProjectChanges,
}

/// Output of [`MeasurementAggregator::aggregate`].
#[derive(Debug, Clone)]
pub struct MeasurementOutcome {
    pub report: MeasurementReport,
    pub project_changes: ProjectChanges,
    pub trend_entry: TrendEntry,
}

/// Builds the measurement report and appends the trend entry.
pub struct MeasurementAggregator<'a> {
    folders: &'a ResultsFolders,
    codec: &'a ArtifactCodec,
}

impl<'a> MeasurementAggregator<'a> {
    pub fn new(folders: &'a ResultsFolders, codec: &'a ArtifactCodec) -> Self {
        Self { folders, codec }
    }

    /// Detected changes; an absent file is the legitimate initial state.
    pub fn read_changes(&self) -> Result<ProjectChanges> {
        let path = self.folders.changes_file();
        Ok(self.codec.read_optional(&path)?.unwrap_or_else(|| {
            info!(path = %path.display(), "No changes file, starting with empty changes");
            ProjectChanges::default()
        }))
    }

    pub fn read_statistics(&self) -> Result<ProjectStatistics> {
        let path = self.folders.statistics_file();
        Ok(self.codec.read_optional(&path)?.unwrap_or_else(|| {
            info!(path = %path.display(), "No statistics file, starting with empty statistics");
            ProjectStatistics::default()
        }))
    }

    /// Read histograms, changes and statistics for `revisions` without
    /// touching the trend ledger.
    pub fn collect(&self, revisions: &RevisionPair) -> Result<MeasurementData> {
        let data_folder = self.folders.data_folder(revisions);
        let histograms =
            HistogramReader::new(revisions, &data_folder, self.codec).read_measurements()?;

        let project_changes = self.read_changes()?;
        let statistics = self.read_statistics()?;

        let changes = project_changes.version(&revisions.new);
        info!(
            revisions = %revisions,
            tests = histograms.len(),
            statistics = statistics.len(),
            changed = changes.changed_tests().len(),
            "Aggregated measurement data"
        );

        Ok(MeasurementData {
            report: MeasurementReport {
                revisions: revisions.clone(),
                changes,
                statistics,
                histograms,
            },
            project_changes,
        })
    }

    /// Append the trend entry for collected data.
    pub fn record(
        &self,
        data: MeasurementData,
        run_id: &str,
        config_digest: &str,
    ) -> Result<MeasurementOutcome> {
        let trend_entry = TrendStore::new(self.folders.trend_file(), self.codec).append(
            run_id,
            &data.report.revisions,
            config_digest,
            &data.report.statistics,
        )?;
        Ok(MeasurementOutcome {
            report: data.report,
            project_changes: data.project_changes,
            trend_entry,
        })
    }

    /// [`collect`](Self::collect) followed by [`record`](Self::record).
    pub fn aggregate(
        &self,
        revisions: &RevisionPair,
        run_id: &str,
        config_digest: &str,
    ) -> Result<MeasurementOutcome> {
        let data = self.collect(revisions)?;
        self.record(data, run_id, config_digest)
    }
}
