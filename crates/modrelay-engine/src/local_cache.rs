//! The toolchain's local module download cache.
//!
//! Artifacts live at `{root}/{encodedPath}/@v/{encodedVersion}.{zip,mod,info}`
//! where `root` is `{GOPATH}/pkg/mod/cache/download`. Some toolchain releases
//! store them one level up, so lookups also try the parent of `root`.

use std::path::{Path, PathBuf};

use modrelay_registry::{ArtifactKind, BuildInfoDependency, ContentHash, ModuleCoordinate};
use tracing::{debug, warn};

use crate::error::Result;
use crate::package::Package;

/// Module cache below a GOPATH entry.
pub const CACHE_SUBDIR: &str = "pkg/mod/cache/download";

#[derive(Debug, Clone)]
pub struct LocalCache {
    root: PathBuf,
}

impl LocalCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        LocalCache { root: root.into() }
    }

    pub fn from_gopath(gopath: &Path) -> Self {
        LocalCache::new(gopath.join(CACHE_SUBDIR))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Archive of `coord`, or `None` when it has not been downloaded yet.
    pub fn locate(&self, coord: &ModuleCoordinate) -> Option<PathBuf> {
        let relative = coord.artifact_path("zip");
        let primary = self.root.join(&relative);
        if primary.is_file() {
            return Some(primary);
        }
        let fallback = self.root.parent()?.join(&relative);
        if fallback.is_file() {
            return Some(fallback);
        }
        debug!("The following file is missing: {}", primary.display());
        None
    }

    /// Directory holding the requirements file of `coord`.
    pub fn version_dir(&self, coord: &ModuleCoordinate) -> PathBuf {
        self.root.join(coord.encoded_path()).join("@v")
    }

    pub fn mod_path(&self, coord: &ModuleCoordinate) -> PathBuf {
        self.root.join(coord.artifact_path("mod"))
    }

    /// Build a [`Package`] from the cached artifacts.
    ///
    /// `Ok(None)` when the archive is not in the cache. The requirements
    /// and info files are read from the directory the archive was found in.
    pub fn load_package(&self, coord: &ModuleCoordinate) -> Result<Option<Package>> {
        let Some(zip_path) = self.locate(coord) else {
            return Ok(None);
        };
        let dir = zip_path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| self.version_dir(coord));
        let version = coord.encoded_version();
        let mod_path = dir.join(format!("{version}.mod"));
        let info_path = dir.join(format!("{version}.info"));
        let info_path = info_path.is_file().then_some(info_path);

        let mod_content = std::fs::read(&mod_path)?;
        let id = coord.cache_key();
        let mut build_info = vec![
            BuildInfoDependency {
                id: id.clone(),
                kind: ArtifactKind::Mod,
                sha256: ContentHash::compute(&mod_content),
            },
            BuildInfoDependency {
                id: id.clone(),
                kind: ArtifactKind::Zip,
                sha256: ContentHash::of_file(&zip_path)?,
            },
        ];
        if let Some(info) = &info_path {
            build_info.push(BuildInfoDependency {
                id,
                kind: ArtifactKind::Info,
                sha256: ContentHash::of_file(info)?,
            });
        }

        Ok(Some(Package::new(
            coord.clone(),
            mod_content,
            zip_path,
            mod_path,
            info_path,
            build_info,
        )))
    }

    /// Overwrite the cached requirements file of `coord`.
    pub fn write_mod(&self, coord: &ModuleCoordinate, content: &[u8]) -> Result<()> {
        let path = self.mod_path(coord);
        if !path.parent().is_some_and(Path::is_dir) {
            warn!("No cache directory for {coord}, not writing {}", path.display());
            return Ok(());
        }
        std::fs::write(&path, content)?;
        Ok(())
    }
}
