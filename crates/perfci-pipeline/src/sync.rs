//! Copies the remote results folder into the local workspace.

use std::fs;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::error::PipelineError;

/// Recursive results copy.
///
/// Relative structure is preserved, existing local files are overwritten
/// and any I/O error aborts the copy.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactSync;

impl ArtifactSync {
    /// Copy every file below `remote` into `local`. Returns the number of
    /// files copied.
    pub fn copy(remote: &Path, local: &Path) -> Result<usize, PipelineError> {
        if !remote.is_dir() {
            return Err(PipelineError::Sync {
                path: remote.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "remote results folder does not exist",
                ),
            });
        }
        fs::create_dir_all(local).map_err(|source| PipelineError::Sync {
            path: local.to_path_buf(),
            source,
        })?;

        let mut copied = 0;
        for entry in WalkDir::new(remote).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(remote).to_path_buf();
                PipelineError::Sync {
                    path,
                    source: e.into(),
                }
            })?;
            let relative = entry
                .path()
                .strip_prefix(remote)
                .map_err(|_| PipelineError::Workspace(format!(
                    "{} escapes {}",
                    entry.path().display(),
                    remote.display()
                )))?;
            let target = local.join(relative);

            if entry.file_type().is_dir() {
                fs::create_dir_all(&target).map_err(|source| PipelineError::Sync {
                    path: target.clone(),
                    source,
                })?;
                continue;
            }

            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(|source| PipelineError::Sync {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
            fs::copy(entry.path(), &target).map_err(|source| PipelineError::Sync {
                path: entry.path().to_path_buf(),
                source,
            })?;
            debug!(file = %relative.display(), "Synced artifact");
            copied += 1;
        }

        info!(
            remote = %remote.display(),
            local = %local.display(),
            files = copied,
            "Synced results"
        );
        Ok(copied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_copy_preserves_structure() {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        write(&remote.path().join("changes.json"), "{}");
        write(&remote.path().join("r2_r1/measurements/a.json"), "[]");
        fs::create_dir_all(remote.path().join("empty")).unwrap();

        let copied = ArtifactSync::copy(remote.path(), local.path()).unwrap();
        assert_eq!(copied, 2);
        assert!(local.path().join("changes.json").is_file());
        assert!(local.path().join("r2_r1/measurements/a.json").is_file());
        assert!(local.path().join("empty").is_dir());
    }

    #[test]
    fn test_rerun_overwrites() {
        let remote = tempfile::tempdir().unwrap();
        let local = tempfile::tempdir().unwrap();
        write(&remote.path().join("statistics.json"), "old");
        ArtifactSync::copy(remote.path(), local.path()).unwrap();

        write(&remote.path().join("statistics.json"), "new");
        ArtifactSync::copy(remote.path(), local.path()).unwrap();
        assert_eq!(
            fs::read_to_string(local.path().join("statistics.json")).unwrap(),
            "new"
        );
    }

    #[test]
    fn test_missing_remote_fails() {
        let local = tempfile::tempdir().unwrap();
        let err = ArtifactSync::copy(&local.path().join("absent"), local.path()).unwrap_err();
        assert!(matches!(err, PipelineError::Sync { .. }));
    }
}
