//! A resolved dependency and the one-shot publish strategy.

use std::path::{Path, PathBuf};

use modrelay_registry::{BuildInfoDependency, ModuleCoordinate, PublishRequest};
use tracing::{debug, info};

use crate::coordinator::{DependencyPublisher, PublishContext};
use crate::deps_cache::DependenciesCache;
use crate::error::{EngineError, Result};

/// A dependency whose archive is present in the local module cache.
///
/// Only the requirements content changes after construction, when a
/// registry-held or synthesized copy supersedes the cached one.
#[derive(Debug, Clone)]
pub struct Package {
    coordinate: ModuleCoordinate,
    id: String,
    mod_content: Vec<u8>,
    zip_path: PathBuf,
    mod_path: PathBuf,
    info_path: Option<PathBuf>,
    build_info: Vec<BuildInfoDependency>,
}

impl Package {
    pub fn new(
        coordinate: ModuleCoordinate,
        mod_content: Vec<u8>,
        zip_path: PathBuf,
        mod_path: PathBuf,
        info_path: Option<PathBuf>,
        build_info: Vec<BuildInfoDependency>,
    ) -> Self {
        Package {
            id: coordinate.cache_key(),
            coordinate,
            mod_content,
            zip_path,
            mod_path,
            info_path,
            build_info,
        }
    }

    pub fn coordinate(&self) -> &ModuleCoordinate {
        &self.coordinate
    }

    /// Cache key, `encodedPath:encodedVersion`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn version(&self) -> &str {
        &self.coordinate.version
    }

    pub fn mod_content(&self) -> &[u8] {
        &self.mod_content
    }

    pub fn set_mod_content(&mut self, content: Vec<u8>) {
        self.mod_content = content;
    }

    pub fn zip_path(&self) -> &Path {
        &self.zip_path
    }

    pub fn mod_path(&self) -> &Path {
        &self.mod_path
    }

    pub fn info_path(&self) -> Option<&Path> {
        self.info_path.as_deref()
    }

    /// Build-info checksum records for the cached artifacts.
    pub fn dependencies(&self) -> &[BuildInfoDependency] {
        &self.build_info
    }

    pub fn publish_request(&self, target_repo: &str) -> PublishRequest {
        PublishRequest {
            zip_path: self.zip_path.clone(),
            mod_content: self.mod_content.clone(),
            version: self.coordinate.version.clone(),
            target_repo: target_repo.to_string(),
            module_id: self.coordinate.path.clone(),
            mod_path: self.mod_path.clone(),
            info_path: self.info_path.clone(),
        }
    }
}

/// Publish `package` and count the outcome.
pub(crate) fn publish_counted(
    package: &Package,
    ctx: &PublishContext<'_>,
    cache: &mut DependenciesCache,
) -> Result<()> {
    info!(
        "Publishing: {} to {}: {}/{}",
        package.id(),
        ctx.target_repo,
        cache.successes() + 1,
        cache.total()
    );
    let request = package.publish_request(&ctx.target_repo);
    match modrelay_registry::publish(&request, ctx.registry) {
        Ok(()) => {
            cache.increment_success();
            Ok(())
        }
        Err(source) => {
            cache.increment_failures();
            Err(EngineError::Publish {
                module: package.coordinate().graph_key(),
                source,
            })
        }
    }
}

/// Publishes each top-level dependency as-is. No requirements rewriting, no
/// recursion.
#[derive(Debug, Default)]
pub struct SimplePublisher;

impl DependencyPublisher for SimplePublisher {
    fn populate_and_publish(
        &mut self,
        ctx: &PublishContext<'_>,
        package: Package,
        cache: &mut DependenciesCache,
    ) -> Result<()> {
        if cache.is_published(package.id()) {
            debug!("Dependency {} was published previously", package.id());
            return Ok(());
        }
        publish_counted(&package, ctx, cache)?;
        cache.mark(package.id(), true);
        Ok(())
    }
}
