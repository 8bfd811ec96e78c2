//! CI host boundary.
//!
//! The pipeline only needs two things from the CI host: attach a named
//! result to the current run, and mark the run failed.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::codec::ArtifactCodec;
use crate::error::{PerfCiError, Result};

/// Narrow interface to the CI run.
pub trait RunHost: Send + Sync {
    /// Attach a named result object to the run. Re-attaching a name replaces
    /// the previous object.
    fn attach(&self, name: &str, payload: Value) -> Result<()>;

    /// Mark the run failed.
    fn mark_failed(&self) -> Result<()>;
}

/// Final status written by [`FsRunHost`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Failure,
}

/// Host that stores results as files in a run directory:
/// `<run_dir>/<name>.json` plus `<run_dir>/result.json`.
pub struct FsRunHost {
    run_dir: PathBuf,
    codec: ArtifactCodec,
}

impl FsRunHost {
    pub fn new(run_dir: impl Into<PathBuf>, codec: ArtifactCodec) -> Result<Self> {
        let run_dir = run_dir.into();
        std::fs::create_dir_all(&run_dir)?;
        let host = Self { run_dir, codec };
        host.write_status(RunStatus::Success)?;
        Ok(host)
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    fn status_file(&self) -> PathBuf {
        self.run_dir.join("result.json")
    }

    fn write_status(&self, status: RunStatus) -> Result<()> {
        self.codec
            .write(&self.status_file(), &serde_json::json!({ "status": status }))
    }

    pub fn status(&self) -> Result<RunStatus> {
        let value: Value = self.codec.read(&self.status_file())?;
        Ok(serde_json::from_value(value["status"].clone())?)
    }
}

fn validate_name(name: &str) -> Result<()> {
    let valid = !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid || name == "result" {
        return Err(PerfCiError::Host(format!("invalid result name: {:?}", name)));
    }
    Ok(())
}

impl RunHost for FsRunHost {
    fn attach(&self, name: &str, payload: Value) -> Result<()> {
        validate_name(name)?;
        self.codec
            .write(&self.run_dir.join(format!("{}.json", name)), &payload)
    }

    fn mark_failed(&self) -> Result<()> {
        self.write_status(RunStatus::Failure)
    }
}

/// In-memory host for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryRunHost {
    attached: Mutex<BTreeMap<String, Value>>,
    failed: Mutex<bool>,
}

impl MemoryRunHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attached(&self, name: &str) -> Option<Value> {
        self.attached.lock().unwrap().get(name).cloned()
    }

    pub fn attached_names(&self) -> Vec<String> {
        self.attached.lock().unwrap().keys().cloned().collect()
    }

    pub fn is_failed(&self) -> bool {
        *self.failed.lock().unwrap()
    }
}

impl RunHost for MemoryRunHost {
    fn attach(&self, name: &str, payload: Value) -> Result<()> {
        validate_name(name)?;
        self.attached
            .lock()
            .unwrap()
            .insert(name.to_string(), payload);
        Ok(())
    }

    fn mark_failed(&self) -> Result<()> {
        *self.failed.lock().unwrap() = true;
        Ok(())
    }
}
