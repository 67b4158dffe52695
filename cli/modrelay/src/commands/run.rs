//! `modrelay run -- <go args>`: run a toolchain command against the
//! registry, falling back to the origin for dependencies it lacks.

use std::path::Path;

use anyhow::{Context, Result};
use modrelay_engine::{FallbackRunner, OnMissing, Toolchain};

use crate::commands::{open_registry, open_toolchain};
use crate::config::Config;

pub fn run(
    project_dir: &Path,
    config: &Config,
    args: &[String],
    publish: bool,
    no_registry: bool,
) -> Result<()> {
    let toolchain = open_toolchain()?;
    let registry = if no_registry {
        None
    } else {
        open_registry(config)?
    };
    let label = format!("go {}", args.join(" "));

    let output = match registry {
        None => toolchain
            .run(project_dir, args, None)
            .with_context(|| format!("running '{label}'"))?,
        Some(registry) => {
            let on_missing = if publish {
                OnMissing::PublishThenOrigin
            } else {
                OnMissing::Origin
            };
            FallbackRunner::new(
                &toolchain,
                registry.backend.as_ref(),
                registry.proxies(config)?,
                config.publish_options(registry.endpoint.repo()),
            )
            .run(project_dir, args, on_missing)
            .with_context(|| format!("running '{label}'"))?
        }
    };
    print!("{output}");
    Ok(())
}
