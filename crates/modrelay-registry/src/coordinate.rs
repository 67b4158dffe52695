//! Module coordinates and the case-escaping path codec.
//!
//! Module paths are case-sensitive, but the on-disk module cache and the
//! registry's storage layout must survive case-insensitive filesystems. The
//! encoded form replaces every upper-case letter with `!` followed by its
//! lower-case form:
//!
//! ```text
//! github.com/Sirupsen/logrus  <->  github.com/!sirupsen/logrus
//! ```
//!
//! A coordinate has two string identities that must stay mutually derivable:
//! the graph key `path@version` (canonical, as printed by the toolchain) and
//! the cache key `encodedPath:encodedVersion` (used in the dependency cache).

use std::fmt;

use crate::error::{RegistryError, Result};

const ESCAPE: char = '!';

/// Encode a module path (or version) for use on disk.
pub fn encode_path(path: &str) -> String {
    let mut out = String::with_capacity(path.len());
    for c in path.chars() {
        if c.is_uppercase() {
            out.push(ESCAPE);
            out.extend(c.to_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

/// Decode an escaped module path back to its canonical form.
///
/// A trailing escape marker with nothing after it is dropped.
pub fn decode_path(encoded: &str) -> String {
    let mut out = String::with_capacity(encoded.len());
    let mut chars = encoded.chars();
    while let Some(c) = chars.next() {
        if c == ESCAPE {
            if let Some(next) = chars.next() {
                out.extend(next.to_uppercase());
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// A module identity: canonical path plus version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleCoordinate {
    /// Canonical (case-preserving) module path.
    pub path: String,
    /// Module version, e.g. `v1.5.2`.
    pub version: String,
}

impl ModuleCoordinate {
    pub fn new(path: impl Into<String>, version: impl Into<String>) -> Self {
        ModuleCoordinate {
            path: path.into(),
            version: version.into(),
        }
    }

    /// Parse a `path@version` graph key.
    pub fn parse_graph_key(key: &str) -> Result<Self> {
        match key.split_once('@') {
            Some((path, version)) if !path.is_empty() && !version.is_empty() => {
                Ok(ModuleCoordinate::new(path, version))
            }
            _ => Err(RegistryError::InvalidCoordinate {
                input: key.to_string(),
            }),
        }
    }

    /// Parse an `encodedPath:encodedVersion` cache key.
    pub fn parse_cache_key(key: &str) -> Result<Self> {
        match key.rsplit_once(':') {
            Some((path, version)) if !path.is_empty() && !version.is_empty() => {
                Ok(ModuleCoordinate::new(decode_path(path), decode_path(version)))
            }
            _ => Err(RegistryError::InvalidCoordinate {
                input: key.to_string(),
            }),
        }
    }

    /// The `path@version` form used by the toolchain and the registry.
    pub fn graph_key(&self) -> String {
        format!("{}@{}", self.path, self.version)
    }

    /// The `encodedPath:encodedVersion` form used by the dependency cache.
    pub fn cache_key(&self) -> String {
        format!("{}:{}", self.encoded_path(), self.encoded_version())
    }

    pub fn encoded_path(&self) -> String {
        encode_path(&self.path)
    }

    pub fn encoded_version(&self) -> String {
        encode_path(&self.version)
    }

    /// Relative location of an artifact in a module-cache style layout:
    /// `{encodedPath}/@v/{version}.{ext}`.
    pub fn artifact_path(&self, extension: &str) -> String {
        format!(
            "{}/@v/{}.{}",
            self.encoded_path(),
            self.encoded_version(),
            extension
        )
    }
}

impl fmt::Display for ModuleCoordinate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.path, self.version)
    }
}
