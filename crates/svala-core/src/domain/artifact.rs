//! Versioned controller artifacts.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::error::{Result, SvalaError};

/// An immutable controller source produced for one iteration.
///
/// Identity is the iteration token plus the SHA-256 digest of `source`;
/// artifacts are never overwritten in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControllerArtifact {
    /// Iteration this artifact was produced for.
    pub iteration: u32,

    /// File name used when materializing the artifact (e.g. `custom_controller.py`).
    pub file_name: String,

    pub source: String,

    /// Hex SHA-256 digest of `source`.
    pub digest: String,
}

impl ControllerArtifact {
    pub fn new(iteration: u32, file_name: impl Into<String>, source: impl Into<String>) -> Self {
        let source = source.into();
        let digest = source_digest(&source);
        Self {
            iteration,
            file_name: file_name.into(),
            source,
            digest,
        }
    }

    /// Read an existing controller from disk and tag it with `iteration`.
    pub fn from_path(iteration: u32, path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| {
                SvalaError::InvalidConfig(format!("controller path {:?} has no file name", path))
            })?;
        Ok(Self::new(iteration, file_name, source))
    }

    /// Short digest prefix for log lines.
    pub fn short_digest(&self) -> &str {
        &self.digest[..self.digest.len().min(12)]
    }
}

/// Hex SHA-256 digest of controller source.
pub fn source_digest(source: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_digest_is_content_addressed() {
        let a = ControllerArtifact::new(0, "c.py", "print('a')");
        let b = ControllerArtifact::new(1, "c.py", "print('a')");
        let c = ControllerArtifact::new(1, "c.py", "print('b')");
        assert_eq!(a.digest, b.digest);
        assert_ne!(a.digest, c.digest);
        assert_eq!(a.digest.len(), 64);
        assert_eq!(a.short_digest().len(), 12);
    }

    #[test]
    fn test_from_path() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("custom_controller.py");
        std::fs::write(&path, "class CustomController: pass\n").expect("write");

        let artifact = ControllerArtifact::from_path(2, &path).expect("read");
        assert_eq!(artifact.iteration, 2);
        assert_eq!(artifact.file_name, "custom_controller.py");
        assert_eq!(artifact.digest, source_digest("class CustomController: pass\n"));
    }
}
