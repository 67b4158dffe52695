//! Registry backend trait and local filesystem implementation.
//!
//! The `RegistryBackend` trait abstracts over registry implementations (HTTP,
//! local filesystem). The `LocalRegistry` stores modules in the same layout
//! the toolchain's module proxy protocol serves, so its repository directory
//! can be used directly as a `file://` proxy.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;
use url::Url;

use crate::coordinate::{encode_path, ModuleCoordinate};
use crate::error::{RegistryError, Result};
use crate::publish::{ModuleInfo, PublishRequest};
use crate::version::parse_module_version;

/// Abstract registry backend.
///
/// A backend is bound to one target repository; lookups go through it.
pub trait RegistryBackend {
    /// Whether the registry holds the requirements file of `coord`.
    fn mod_exists(&self, coord: &ModuleCoordinate) -> Result<bool>;

    /// Fetch the registry-held requirements file, `None` when absent.
    fn fetch_mod(&self, coord: &ModuleCoordinate) -> Result<Option<Vec<u8>>>;

    /// Resolve a version query (`latest`, a branch, a version) to a version.
    fn resolve_version(&self, module_path: &str, query: &str) -> Result<Option<String>>;

    /// Publish a module version (archive, requirements, info) as one unit.
    fn publish(&self, request: &PublishRequest) -> Result<()>;

    /// Value for the toolchain's proxy variable when resolving from this
    /// registry.
    fn proxy_value(&self, direct_fallback: bool) -> Result<String>;
}

/// A local filesystem registry.
///
/// Layout:
/// ```text
/// <root>/
///   <repo>/
///     <encoded-path>/@v/
///       list
///       <version>.mod
///       <version>.zip
///       <version>.info
/// ```
pub struct LocalRegistry {
    root: PathBuf,
    repo: String,
}

impl LocalRegistry {
    pub fn new(root: PathBuf, repo: impl Into<String>) -> Self {
        LocalRegistry {
            root,
            repo: repo.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn repo_dir(&self, repo: &str) -> PathBuf {
        self.root.join(repo)
    }

    fn artifact(&self, repo: &str, coord: &ModuleCoordinate, extension: &str) -> PathBuf {
        self.repo_dir(repo).join(coord.artifact_path(extension))
    }

    fn list_versions(&self, module_path: &str) -> Result<Vec<String>> {
        let list = self
            .repo_dir(&self.repo)
            .join(encode_path(module_path))
            .join("@v")
            .join("list");
        if !list.is_file() {
            return Ok(Vec::new());
        }
        let data = std::fs::read_to_string(&list)?;
        Ok(data
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect())
    }

    fn storage_error(path: &Path, detail: impl Into<String>) -> RegistryError {
        RegistryError::Storage {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}

impl RegistryBackend for LocalRegistry {
    fn mod_exists(&self, coord: &ModuleCoordinate) -> Result<bool> {
        Ok(self.artifact(&self.repo, coord, "mod").is_file())
    }

    fn fetch_mod(&self, coord: &ModuleCoordinate) -> Result<Option<Vec<u8>>> {
        let path = self.artifact(&self.repo, coord, "mod");
        if !path.is_file() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }

    fn resolve_version(&self, module_path: &str, query: &str) -> Result<Option<String>> {
        if query == "latest" {
            let latest = self
                .list_versions(module_path)?
                .into_iter()
                .filter_map(|v| parse_module_version(&v).map(|parsed| (parsed, v)))
                .max_by(|a, b| a.0.cmp(&b.0))
                .map(|(_, v)| v);
            return Ok(latest);
        }
        let coord = ModuleCoordinate::new(module_path, query);
        let info_path = self.artifact(&self.repo, &coord, "info");
        if !info_path.is_file() {
            return Ok(None);
        }
        let info: ModuleInfo = serde_json::from_slice(&std::fs::read(&info_path)?)?;
        Ok(Some(info.version))
    }

    fn publish(&self, request: &PublishRequest) -> Result<()> {
        let coord = request.coordinate();
        let mod_target = self.artifact(&request.target_repo, &coord, "mod");
        let dir = mod_target
            .parent()
            .ok_or_else(|| Self::storage_error(&mod_target, "artifact has no parent"))?
            .to_path_buf();
        std::fs::create_dir_all(&dir)?;

        std::fs::copy(
            &request.zip_path,
            self.artifact(&request.target_repo, &coord, "zip"),
        )?;
        std::fs::write(&mod_target, &request.mod_content)?;
        std::fs::write(
            self.artifact(&request.target_repo, &coord, "info"),
            request.info_bytes()?,
        )?;

        // Append to the version list served to the toolchain.
        let list_path = dir.join("list");
        let known = if list_path.is_file() {
            std::fs::read_to_string(&list_path)?
        } else {
            String::new()
        };
        if !known.lines().any(|l| l.trim() == request.version) {
            let mut list = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&list_path)?;
            writeln!(list, "{}", request.version)?;
        }

        debug!("Stored {} under {}", coord, dir.display());
        Ok(())
    }

    fn proxy_value(&self, direct_fallback: bool) -> Result<String> {
        let dir = self.repo_dir(&self.repo);
        let url = Url::from_directory_path(&dir)
            .map_err(|_| Self::storage_error(&dir, "registry root must be an absolute path"))?;
        let mut value = url.as_str().trim_end_matches('/').to_string();
        if direct_fallback {
            value.push_str("|direct");
        }
        Ok(value)
    }
}
