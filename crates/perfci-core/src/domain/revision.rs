//! Revision identifiers.

use serde::{Deserialize, Serialize};

/// Opaque code-version identifier (commit id or a token such as `HEAD~1`).
///
/// Used as the join key across every artifact.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Revision(String);

impl Revision {
    pub fn new(id: impl Into<String>) -> Self {
        Revision(id.into())
    }

    /// The symbolic head revision.
    pub fn head() -> Self {
        Revision("HEAD".to_string())
    }

    /// `HEAD~<distance>`.
    pub fn head_minus(distance: u32) -> Self {
        Revision(format!("HEAD~{}", distance))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Revision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Revision {
    fn from(s: &str) -> Self {
        Revision(s.to_string())
    }
}

impl From<String> for Revision {
    fn from(s: String) -> Self {
        Revision(s)
    }
}

/// Two adjacent revisions forming one comparison unit.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionPair {
    /// The changed revision.
    pub new: Revision,
    /// The baseline revision.
    pub old: Revision,
}

impl RevisionPair {
    pub fn new(new: impl Into<Revision>, old: impl Into<Revision>) -> Self {
        Self {
            new: new.into(),
            old: old.into(),
        }
    }

    /// Name of the measurement data folder for this pair (`<new>_<old>`).
    pub fn folder_name(&self) -> String {
        format!("{}_{}", self.new, self.old)
    }
}

impl std::fmt::Display for RevisionPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.old, self.new)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_head_minus() {
        assert_eq!(Revision::head_minus(3).as_str(), "HEAD~3");
        assert_eq!(Revision::head().as_str(), "HEAD");
    }

    #[test]
    fn test_folder_name() {
        let pair = RevisionPair::new(Revision::head(), Revision::head_minus(1));
        assert_eq!(pair.folder_name(), "HEAD_HEAD~1");
    }

    #[test]
    fn test_revision_serializes_as_plain_string() {
        let json = serde_json::to_string(&Revision::new("abc123")).unwrap();
        assert_eq!(json, "\"abc123\"");
    }
}
