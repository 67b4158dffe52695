//! `modrelay publish-deps`: publish the project's dependencies the registry
//! lacks.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use modrelay_engine::{PublishCoordinator, RunSummary, Strategy, Toolchain};
use modrelay_registry::RegistryBackend;
use tracing::debug;

use crate::commands::{open_toolchain, require_registry};
use crate::config::Config;

/// Command-line overrides of the `[publish]` section.
#[derive(Debug, Clone, Copy, Default)]
pub struct PublishFlags {
    pub simple: bool,
    pub fail_on_error: bool,
    pub timeout_secs: Option<u64>,
}

pub fn run(project_dir: &Path, config: &Config, flags: PublishFlags) -> Result<()> {
    let registry = require_registry(config)?;
    debug!("Target registry: {} ({})", registry.endpoint.base_url(), registry.endpoint.repo());
    let toolchain = open_toolchain()?;
    let summary = publish_deps(
        &toolchain,
        registry.backend.as_ref(),
        project_dir,
        config,
        flags,
    )?;
    println!(
        "Published {} of {} dependencies to {} ({} failed)",
        summary.successes,
        summary.total,
        registry.endpoint.repo(),
        summary.failures
    );
    Ok(())
}

/// Resolve and publish with an already opened toolchain and registry.
pub fn publish_deps(
    toolchain: &dyn Toolchain,
    registry: &dyn RegistryBackend,
    project_dir: &Path,
    config: &Config,
    flags: PublishFlags,
) -> Result<RunSummary> {
    let repo = config
        .registry
        .repo
        .as_deref()
        .context("no target repository configured")?;
    let mut options = config.publish_options(repo);
    if flags.simple {
        options.strategy = Strategy::Simple;
    }
    if let Some(secs) = flags.timeout_secs {
        options.timeout = Some(Duration::from_secs(secs));
    }
    let fail_on_error = flags.fail_on_error || config.publish.fail_on_error;

    let proxy = registry.proxy_value(config.registry.direct_fallback)?;
    let coordinator = PublishCoordinator::new(
        toolchain,
        registry,
        modrelay_engine::ProxySettings::new(Some(proxy)),
        options,
    );
    coordinator
        .run(project_dir, fail_on_error)
        .with_context(|| format!("publishing dependencies of {}", project_dir.display()))
}
