//! Scoped capture and restoration of files a toolchain command may rewrite.
//!
//! `graph`, `list`, `tidy` and `init` can silently update go.mod and go.sum.
//! A [`SideFileGuard`] snapshots a file's bytes and permissions and puts
//! them back when it is restored or dropped, on every exit path. A file that
//! did not exist when captured is left as the command produced it.

use std::fs::Permissions;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::error::{EngineError, Result};

/// Manifest file name.
pub const MOD_FILE: &str = "go.mod";
/// Checksum side-file name.
pub const SUM_FILE: &str = "go.sum";

#[derive(Debug)]
struct Snapshot {
    content: Vec<u8>,
    permissions: Permissions,
}

/// Restores a captured file on drop.
#[derive(Debug)]
pub struct SideFileGuard {
    path: PathBuf,
    snapshot: Option<Snapshot>,
    restored: bool,
}

impl SideFileGuard {
    pub fn capture(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let snapshot = if path.is_file() {
            let metadata = std::fs::metadata(&path).map_err(|e| side_error(&path, e))?;
            let content = std::fs::read(&path).map_err(|e| side_error(&path, e))?;
            debug!("Captured {}", path.display());
            Some(Snapshot {
                content,
                permissions: metadata.permissions(),
            })
        } else {
            None
        };
        Ok(SideFileGuard {
            path,
            snapshot,
            restored: false,
        })
    }

    /// Snapshot the file, then remove it. It comes back on restore.
    pub fn capture_and_remove(path: impl Into<PathBuf>) -> Result<Self> {
        let guard = SideFileGuard::capture(path)?;
        if guard.snapshot.is_some() {
            std::fs::remove_file(&guard.path).map_err(|e| side_error(&guard.path, e))?;
        }
        Ok(guard)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if the file existed when captured.
    pub fn existed(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Write the snapshot back, byte for byte and with its original mode.
    pub fn restore(&mut self) -> Result<()> {
        if self.restored {
            return Ok(());
        }
        self.restored = true;
        let Some(snapshot) = &self.snapshot else {
            return Ok(());
        };
        debug!("Restoring {}", self.path.display());
        std::fs::write(&self.path, &snapshot.content).map_err(|e| side_error(&self.path, e))?;
        std::fs::set_permissions(&self.path, snapshot.permissions.clone())
            .map_err(|e| side_error(&self.path, e))?;
        Ok(())
    }
}

impl Drop for SideFileGuard {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            warn!("{e}");
        }
    }
}

fn side_error(path: &Path, e: std::io::Error) -> EngineError {
    EngineError::SideFile {
        path: path.to_path_buf(),
        detail: e.to_string(),
    }
}

/// Run `f` with the named files in `dir` guarded.
///
/// On success a failed restoration is an error; when `f` already failed, a
/// restoration failure is only logged and `f`'s error wins.
pub fn guarded<T>(dir: &Path, names: &[&str], f: impl FnOnce() -> Result<T>) -> Result<T> {
    let mut guards = names
        .iter()
        .map(|name| SideFileGuard::capture(dir.join(name)))
        .collect::<Result<Vec<_>>>()?;
    let outcome = f();
    for guard in &mut guards {
        match (guard.restore(), &outcome) {
            (Err(e), Ok(_)) => return Err(e),
            (Err(e), Err(_)) => warn!("{e}"),
            (Ok(()), _) => {}
        }
    }
    outcome
}
