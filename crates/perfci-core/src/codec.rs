//! Artifact (de)serialization.
//!
//! One [`ArtifactCodec`] is created by the entry point and passed by
//! reference to every reader and writer.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{PerfCiError, Result};

/// JSON codec for workspace artifacts.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactCodec {
    pretty: bool,
}

impl Default for ArtifactCodec {
    fn default() -> Self {
        Self { pretty: true }
    }
}

impl ArtifactCodec {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    /// Read `path`. A missing file yields `Ok(None)`; a present but
    /// unparsable file is a [`PerfCiError::MalformedArtifact`].
    pub fn read_optional<T: DeserializeOwned>(&self, path: &Path) -> Result<Option<T>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(PerfCiError::Io(e)),
        };
        self.decode(path, &bytes).map(Some)
    }

    /// Read `path`, failing if it does not exist.
    pub fn read<T: DeserializeOwned>(&self, path: &Path) -> Result<T> {
        let bytes = std::fs::read(path)?;
        self.decode(path, &bytes)
    }

    fn decode<T: DeserializeOwned>(&self, path: &Path, bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|source| PerfCiError::MalformedArtifact {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>> {
        let bytes = if self.pretty {
            serde_json::to_vec_pretty(value)?
        } else {
            serde_json::to_vec(value)?
        };
        Ok(bytes)
    }

    /// Write `value` to `path` atomically: temp file in the same directory,
    /// then rename.
    pub fn write<T: Serialize>(&self, path: &Path, value: &T) -> Result<()> {
        let bytes = self.encode(value)?;
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        tmp.write_all(&bytes)?;
        tmp.persist(path).map_err(|e| e.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_missing_file_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let codec = ArtifactCodec::default();
        let value: Option<BTreeMap<String, u32>> =
            codec.read_optional(&dir.path().join("absent.json")).unwrap();
        assert!(value.is_none());
    }

    #[test]
    fn test_malformed_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let codec = ArtifactCodec::default();
        let err = codec
            .read_optional::<BTreeMap<String, u32>>(&path)
            .unwrap_err();
        assert!(matches!(err, PerfCiError::MalformedArtifact { .. }));
    }

    #[test]
    fn test_write_creates_parent_and_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("value.json");
        let codec = ArtifactCodec::new(false);

        codec.write(&path, &vec![1, 2, 3]).unwrap();
        codec.write(&path, &vec![4]).unwrap();

        let back: Vec<u32> = codec.read(&path).unwrap();
        assert_eq!(back, vec![4]);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "[4]");
    }
}
