//! Module publishing workflow.
//!
//! A publish request bundles one module version as a single unit: archive,
//! requirements file content (possibly stamped with an edit marker), and the
//! optional info file. Requests are validated before being handed to a
//! registry backend.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::client::RegistryBackend;
use crate::coordinate::ModuleCoordinate;
use crate::error::{RegistryError, Result};

/// Everything needed to publish one module version.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    /// Archive in the local module cache.
    pub zip_path: PathBuf,
    /// Requirements file content to ship; may differ from what is on disk.
    pub mod_content: Vec<u8>,
    pub version: String,
    pub target_repo: String,
    /// Canonical module path.
    pub module_id: String,
    /// Requirements file in the local module cache.
    pub mod_path: PathBuf,
    pub info_path: Option<PathBuf>,
}

/// Contents of a module `.info` file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleInfo {
    #[serde(rename = "Version")]
    pub version: String,
    #[serde(rename = "Time", default, skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
}

impl PublishRequest {
    pub fn coordinate(&self) -> ModuleCoordinate {
        ModuleCoordinate::new(self.module_id.clone(), self.version.clone())
    }

    /// Pre-publish checks. Returns the first problem found.
    pub fn validate(&self) -> Result<()> {
        let fail = |detail: String| {
            Err(RegistryError::PublishFailed {
                module: self.coordinate().graph_key(),
                detail,
            })
        };
        if self.module_id.is_empty() {
            return fail("module id is empty".to_string());
        }
        if self.version.is_empty() {
            return fail("version is empty".to_string());
        }
        if self.target_repo.is_empty() {
            return fail("target repository is empty".to_string());
        }
        if !self.zip_path.is_file() {
            return fail(format!("archive {} does not exist", self.zip_path.display()));
        }
        if self.mod_content.is_empty() {
            return fail("requirements file is empty".to_string());
        }
        if let Some(info) = &self.info_path {
            if !info.is_file() {
                return fail(format!("info file {} does not exist", info.display()));
            }
        }
        Ok(())
    }

    /// Info file bytes: the cached file when present, otherwise a minimal
    /// document naming the version.
    pub fn info_bytes(&self) -> Result<Vec<u8>> {
        match &self.info_path {
            Some(path) => Ok(std::fs::read(path)?),
            None => Ok(serde_json::to_vec(&ModuleInfo {
                version: self.version.clone(),
                time: None,
            })?),
        }
    }
}

/// Validate a request and publish it through the given backend.
pub fn publish(request: &PublishRequest, backend: &dyn RegistryBackend) -> Result<()> {
    request.validate()?;
    debug!(
        "Deploying {} to {}",
        request.coordinate(),
        request.target_repo
    );
    backend.publish(request)
}
