//! Project root discovery.

use std::path::{Path, PathBuf};

use crate::error::{EngineError, Result};
use crate::sidefile::MOD_FILE;

/// Walk up from `start` to the nearest directory holding a go.mod.
pub fn find_project_root(start: &Path) -> Result<PathBuf> {
    let mut dir = start.to_path_buf();
    loop {
        if dir.join(MOD_FILE).is_file() {
            return Ok(dir);
        }
        if !dir.pop() {
            return Err(EngineError::ProjectRootNotFound {
                start: start.to_path_buf(),
            });
        }
    }
}
