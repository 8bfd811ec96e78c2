//! Append-only trend ledger.
//!
//! Every pipeline run appends exactly one [`TrendEntry`] for its revision
//! pair. Entries are never reordered or overwritten; `sequence` always equals
//! the entry's position.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::codec::ArtifactCodec;
use crate::domain::{ProjectStatistics, RevisionPair};
use crate::error::{PerfCiError, Result};

/// Summary statistics of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendEntry {
    /// Position in the ledger, starting at 0.
    pub sequence: u64,
    pub run_id: String,
    pub revisions: RevisionPair,
    /// Digest of the configuration the run used.
    pub config_digest: String,
    pub recorded_at: DateTime<Utc>,
    pub statistics: ProjectStatistics,
}

/// Revision-ordered ledger of trend entries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrendRecord {
    entries: Vec<TrendEntry>,
}

impl TrendRecord {
    pub fn entries(&self) -> &[TrendEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&TrendEntry> {
        self.entries.last()
    }

    /// Append a snapshot and return the new entry.
    pub fn append(
        &mut self,
        run_id: impl Into<String>,
        revisions: RevisionPair,
        config_digest: impl Into<String>,
        statistics: ProjectStatistics,
    ) -> &TrendEntry {
        let entry = TrendEntry {
            sequence: self.entries.len() as u64,
            run_id: run_id.into(),
            revisions,
            config_digest: config_digest.into(),
            recorded_at: Utc::now(),
            statistics,
        };
        self.entries.push(entry);
        &self.entries[self.entries.len() - 1]
    }

    fn verify_order(&self, path: &Path) -> Result<()> {
        for (index, entry) in self.entries.iter().enumerate() {
            if entry.sequence != index as u64 {
                return Err(PerfCiError::CorruptLedger {
                    path: path.to_path_buf(),
                    reason: format!(
                        "trend entry at position {} has sequence {}",
                        index, entry.sequence
                    ),
                });
            }
        }
        Ok(())
    }
}

/// File-backed trend ledger.
pub struct TrendStore<'a> {
    path: PathBuf,
    codec: &'a ArtifactCodec,
}

impl<'a> TrendStore<'a> {
    pub fn new(path: impl Into<PathBuf>, codec: &'a ArtifactCodec) -> Self {
        Self {
            path: path.into(),
            codec,
        }
    }

    /// Load the ledger; an absent file is an empty ledger.
    pub fn load(&self) -> Result<TrendRecord> {
        let record: TrendRecord = self.codec.read_optional(&self.path)?.unwrap_or_default();
        record.verify_order(&self.path)?;
        Ok(record)
    }

    /// Append one entry and persist the ledger atomically.
    pub fn append(
        &self,
        run_id: &str,
        revisions: &RevisionPair,
        config_digest: &str,
        statistics: &ProjectStatistics,
    ) -> Result<TrendEntry> {
        let mut record = self.load()?;
        let entry = record
            .append(run_id, revisions.clone(), config_digest, statistics.clone())
            .clone();
        self.codec.write(&self.path, &record)?;
        info!(sequence = entry.sequence, revisions = %revisions, "Appended trend entry");

        Ok(entry)
    }
}
