//! Reads raw execution-time samples of a revision pair into histograms.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::codec::ArtifactCodec;
use crate::domain::{HistogramValues, MeasurementFile, RevisionPair};
use crate::error::{PerfCiError, Result};

/// Reader for one revision-pair data folder.
pub struct HistogramReader<'a> {
    revisions: &'a RevisionPair,
    data_folder: PathBuf,
    codec: &'a ArtifactCodec,
}

impl<'a> HistogramReader<'a> {
    pub fn new(revisions: &'a RevisionPair, data_folder: &Path, codec: &'a ArtifactCodec) -> Self {
        Self {
            revisions,
            data_folder: data_folder.to_path_buf(),
            codec,
        }
    }

    /// Histogram per test id.
    ///
    /// An absent folder yields an empty map. A path that is not a directory,
    /// or an unparsable measurement file, is an error.
    pub fn read_measurements(&self) -> Result<BTreeMap<String, HistogramValues>> {
        let mut histograms = BTreeMap::new();
        if !self.data_folder.exists() {
            warn!(folder = %self.data_folder.display(), "Measurement data folder does not exist");
            return Ok(histograms);
        }
        if !self.data_folder.is_dir() {
            return Err(PerfCiError::InvalidDataFolder {
                path: self.data_folder.clone(),
                reason: "not a directory".to_string(),
            });
        }

        let mut files: Vec<PathBuf> = std::fs::read_dir(&self.data_folder)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<std::io::Result<_>>()?;
        files.retain(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"));
        files.sort();

        for path in files {
            let file: MeasurementFile = self.codec.read(&path)?;
            let baseline = file
                .values
                .get(&self.revisions.old)
                .cloned()
                .unwrap_or_default();
            let current = file
                .values
                .get(&self.revisions.new)
                .cloned()
                .unwrap_or_default();
            if baseline.is_empty() && current.is_empty() {
                debug!(path = %path.display(), "No values for the measured revisions");
                continue;
            }

            let entry: &mut HistogramValues =
                histograms.entry(file.test_case.executable()).or_default();
            entry.baseline.extend(baseline);
            entry.current.extend(current);
        }

        debug!(tests = histograms.len(), folder = %self.data_folder.display(), "Read histograms");
        Ok(histograms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) {
        std::fs::create_dir_all(dir).unwrap();
        std::fs::write(dir.join(name), content).unwrap();
    }

    #[test]
    fn test_reads_both_revisions() {
        let dir = tempfile::tempdir().unwrap();
        let pair = RevisionPair::new("HEAD", "HEAD~1");
        let folder = dir.path().join(pair.folder_name());
        write(
            &folder,
            "bar.json",
            r#"{"test_case": "a.BarTest#x", "values": {"HEAD": [10.0, 11.0], "HEAD~1": [9.0]}}"#,
        );
        write(&folder, "notes.txt", "ignored");

        let codec = ArtifactCodec::default();
        let histograms = HistogramReader::new(&pair, &folder, &codec)
            .read_measurements()
            .unwrap();
        let values = &histograms["a.BarTest#x"];
        assert_eq!(values.current, vec![10.0, 11.0]);
        assert_eq!(values.baseline, vec![9.0]);
    }

    #[test]
    fn test_missing_folder_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let pair = RevisionPair::new("HEAD", "HEAD~1");
        let codec = ArtifactCodec::default();
        let histograms = HistogramReader::new(&pair, &dir.path().join("absent"), &codec)
            .read_measurements()
            .unwrap();
        assert!(histograms.is_empty());
    }

    #[test]
    fn test_file_instead_of_folder_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("HEAD_HEAD~1");
        std::fs::write(&path, "x").unwrap();
        let pair = RevisionPair::new("HEAD", "HEAD~1");
        let codec = ArtifactCodec::default();
        let err = HistogramReader::new(&pair, &path, &codec)
            .read_measurements()
            .unwrap_err();
        assert!(matches!(err, PerfCiError::InvalidDataFolder { .. }));
    }

    #[test]
    fn test_malformed_measurement_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let pair = RevisionPair::new("HEAD", "HEAD~1");
        let folder = dir.path().join(pair.folder_name());
        write(&folder, "bad.json", "{");
        let codec = ArtifactCodec::default();
        assert!(HistogramReader::new(&pair, &folder, &codec)
            .read_measurements()
            .is_err());
    }
}
