//! Run a toolchain command against the registry, falling back to the origin
//! when the registry lacks a dependency.

use std::path::Path;

use modrelay_registry::RegistryBackend;
use tracing::{info, warn};

use crate::coordinator::{PublishCoordinator, PublishOptions, Strategy};
use crate::error::{EngineError, Result, ToolchainError};
use crate::toolchain::{ProxySettings, Source, Toolchain};

/// What to do when the registry answers "not found" for a dependency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum OnMissing {
    /// Re-run against the origin.
    #[default]
    Origin,
    /// Publish the missing dependencies, then re-run against the origin.
    PublishThenOrigin,
}

/// Whether a failed toolchain command failed because a dependency was not
/// found.
pub fn dependency_not_found(err: &ToolchainError) -> bool {
    err.to_string().contains("404")
}

pub struct FallbackRunner<'a> {
    toolchain: &'a dyn Toolchain,
    registry: &'a dyn RegistryBackend,
    proxies: ProxySettings,
    options: PublishOptions,
}

impl<'a> FallbackRunner<'a> {
    /// Missing dependencies are published with `options`, forced to the
    /// simple strategy.
    pub fn new(
        toolchain: &'a dyn Toolchain,
        registry: &'a dyn RegistryBackend,
        proxies: ProxySettings,
        options: PublishOptions,
    ) -> Self {
        FallbackRunner {
            toolchain,
            registry,
            proxies,
            options: PublishOptions {
                strategy: Strategy::Simple,
                ..options
            },
        }
    }

    /// Run `args` in `dir`. Returns the command's stdout.
    pub fn run(&self, dir: &Path, args: &[String], on_missing: OnMissing) -> Result<String> {
        let Some(registry_proxy) = self.proxies.for_source(Source::Registry) else {
            return Ok(self.toolchain.run(dir, args, None)?);
        };

        let err = match self.toolchain.run(dir, args, Some(registry_proxy)) {
            Ok(output) => return Ok(output),
            Err(err) if dependency_not_found(&err) => err,
            Err(err) => return Err(err.into()),
        };
        warn!("Received {err} from the registry");

        if on_missing == OnMissing::PublishThenOrigin {
            info!("Publishing the missing dependencies to {}", self.options.target_repo);
            PublishCoordinator::new(
                self.toolchain,
                self.registry,
                self.proxies.clone(),
                self.options.clone(),
            )
            .run(dir, true)?;
        }

        info!("Running against the origin");
        self.toolchain
            .run(dir, args, None)
            .map_err(EngineError::from)
    }
}
