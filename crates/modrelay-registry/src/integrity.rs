//! Build-info checksums for module artifacts.
//!
//! Each resolved package records a checksum per artifact (requirements file,
//! archive, optional info file) so that a build-info record can list exactly
//! what was consumed.

use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::Result;

/// A content hash (SHA-256 hex digest).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentHash(pub String);

impl ContentHash {
    /// Compute the SHA-256 hash of the given data.
    pub fn compute(data: &[u8]) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(data);
        ContentHash(hex_encode(&hasher.finalize()))
    }

    /// Hash the contents of a file.
    pub fn of_file(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)?;
        Ok(ContentHash::compute(&data))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ContentHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Which artifact of a module a build-info record describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Mod,
    Zip,
    Info,
}

/// One build-info dependency record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfoDependency {
    /// Cache key of the module (`encodedPath:version`).
    pub id: String,
    pub kind: ArtifactKind,
    pub sha256: ContentHash,
}
