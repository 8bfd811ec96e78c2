//! Error taxonomy for perfci.
//!
//! A missing artifact is not an error: readers report it as absent data.
//! Everything here is fatal for the stage that produced it.

use std::path::PathBuf;

/// perfci core errors.
#[derive(Debug, thiserror::Error)]
pub enum PerfCiError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("malformed artifact {path:?}: {source}")]
    MalformedArtifact {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid data folder {path:?}: {reason}")]
    InvalidDataFolder { path: PathBuf, reason: String },

    #[error("corrupt trend ledger {path:?}: {reason}")]
    CorruptLedger { path: PathBuf, reason: String },

    #[error("host error: {0}")]
    Host(String),

    #[error("unsafe path segment {0:?} in artifact data")]
    UnsafePathSegment(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("config file error: {0}")]
    ConfigFile(#[from] toml::de::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl PerfCiError {
    pub(crate) fn config(message: impl Into<String>) -> Self {
        PerfCiError::Config(message.into())
    }
}

/// Result type for perfci core operations.
pub type Result<T> = std::result::Result<T, PerfCiError>;
