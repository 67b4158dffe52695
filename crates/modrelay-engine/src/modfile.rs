//! Requirements-file inspection.

use regex::Regex;

use crate::error::Result;

/// Marker stamped on requirements files this tool rewrote.
pub const DEFAULT_EDIT_MARKER: &str = "// Edited by modrelay";

/// Compiled patterns for requirements-file content, built once per run.
#[derive(Debug, Clone)]
pub struct ModInspector {
    require_line: Regex,
}

impl ModInspector {
    pub fn new() -> Result<Self> {
        Ok(ModInspector {
            require_line: Regex::new(r"(?m)^\s*require\s+\S")?,
        })
    }

    /// A requirements file is "empty" unless it declares at least one
    /// `require` line or block.
    pub fn has_requirements(&self, content: &[u8]) -> bool {
        self.require_line
            .is_match(&String::from_utf8_lossy(content))
    }
}

/// Prefix `content` with the edit marker and a blank line.
pub fn sign(content: &[u8], marker: &str) -> Vec<u8> {
    let mut signed = Vec::with_capacity(marker.len() + 2 + content.len());
    signed.extend_from_slice(marker.as_bytes());
    signed.extend_from_slice(b"\n\n");
    signed.extend_from_slice(content);
    signed
}
