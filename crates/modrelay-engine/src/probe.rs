//! Registry existence checks and source-aware downloads.
//!
//! A module found in the registry is downloaded through the registry proxy;
//! anything else is downloaded from its origin with the proxy removed. The
//! answer is recorded in the [`DependenciesCache`] so later steps know
//! whether the registry's requirements file can be trusted.

use std::path::Path;

use modrelay_registry::ModuleCoordinate;
use tracing::debug;

use crate::coordinator::PublishContext;
use crate::deps_cache::DependenciesCache;
use crate::error::Result;
use crate::package::Package;
use crate::toolchain::{DownloadInfo, Source};

pub struct ExistenceProbe<'c, 'a> {
    ctx: &'c PublishContext<'a>,
}

impl<'c, 'a> ExistenceProbe<'c, 'a> {
    pub fn new(ctx: &'c PublishContext<'a>) -> Self {
        ExistenceProbe { ctx }
    }

    /// Whether the target registry already holds `coord`.
    pub fn exists(&self, coord: &ModuleCoordinate) -> Result<bool> {
        let found = self.ctx.registry.mod_exists(coord)?;
        debug!("Registry lookup for {coord}: {}", if found { "found" } else { "not found" });
        Ok(found)
    }

    /// Download `coord` into the local module cache, running in `dir`.
    pub fn download(
        &self,
        dir: &Path,
        coord: &ModuleCoordinate,
        from_registry: bool,
    ) -> Result<DownloadInfo> {
        let source = if from_registry {
            Source::Registry
        } else {
            Source::Origin
        };
        debug!("Downloading dependency from the {source}: {coord}");
        let info = self
            .ctx
            .toolchain
            .download(dir, coord, self.ctx.proxies.for_source(source))?;
        Ok(info)
    }

    /// Probe, record the answer in `cache`, then download from the matching
    /// source. Returns whether the registry had it.
    pub fn materialize(
        &self,
        dir: &Path,
        coord: &ModuleCoordinate,
        cache: &mut DependenciesCache,
    ) -> Result<bool> {
        let exists = self.exists(coord)?;
        cache.mark(&coord.cache_key(), exists);
        self.download(dir, coord, exists)?;
        Ok(exists)
    }

    /// Load a transitive dependency, downloading it first when the local
    /// cache lacks its archive. Does not touch the dependencies cache.
    pub fn resolve_transitive(
        &self,
        dir: &Path,
        coord: &ModuleCoordinate,
    ) -> Result<Option<(Package, bool)>> {
        let cached = self.ctx.local_cache.load_package(coord)?;
        let exists = self.exists(coord)?;
        let package = match cached {
            Some(package) => Some(package),
            None => {
                self.download(dir, coord, exists)?;
                self.ctx.local_cache.load_package(coord)?
            }
        };
        Ok(package.map(|p| (p, exists)))
    }

    /// Replace the locally cached requirements file of `coord` with the
    /// registry's copy. `None` when the module was never downloaded locally
    /// or the registry has no copy.
    pub fn refresh_mod(&self, coord: &ModuleCoordinate) -> Result<Option<Vec<u8>>> {
        if !self.ctx.local_cache.version_dir(coord).is_dir() {
            return Ok(None);
        }
        debug!("Overwriting the cached mod file of {coord} with the registry's");
        let Some(content) = self.ctx.registry.fetch_mod(coord)? else {
            return Ok(None);
        };
        self.ctx.local_cache.write_mod(coord, &content)?;
        Ok(Some(content))
    }
}
