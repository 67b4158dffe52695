//! `modrelay doctor`: toolchain and configuration diagnostics.

use std::path::Path;

use anyhow::Result;
use modrelay_engine::{find_project_root, LocalCache, Toolchain};
use modrelay_registry::CredentialMask;

use crate::commands::{open_registry, open_toolchain};
use crate::config::{Config, CONFIG_FILE};

/// Print diagnostic information. Problems are reported, not returned.
pub fn run(cwd: &Path, config: &Config) -> Result<()> {
    let mask = CredentialMask::new()?;

    println!("=== modrelay doctor ===");
    println!();
    println!("modrelay version: {}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("--- Toolchain ---");
    match open_toolchain() {
        Ok(toolchain) => print_toolchain(&toolchain, cwd),
        Err(e) => println!("  go: {e:#}"),
    }
    println!();

    println!("--- Project ---");
    match find_project_root(cwd) {
        Ok(root) => println!("  go.mod:    found at {}", root.display()),
        Err(e) => println!("  go.mod:    {e}"),
    }
    match Config::find_and_load(cwd) {
        Ok(Some((_, dir))) => println!("  {CONFIG_FILE}: found at {}", dir.display()),
        Ok(None) => println!("  {CONFIG_FILE}: not found"),
        Err(e) => println!("  {CONFIG_FILE}: {e:#}"),
    }
    println!();

    println!("--- Registry ---");
    match open_registry(config) {
        Ok(Some(registry)) => {
            println!("  URL:        {}", registry.endpoint.base_url());
            println!("  Repository: {}", registry.endpoint.repo());
            match registry.backend.proxy_value(config.registry.direct_fallback) {
                Ok(proxy) => println!("  GOPROXY:    {}", mask.mask(&proxy)),
                Err(e) => println!("  GOPROXY:    {e}"),
            }
        }
        Ok(None) => println!("  not configured"),
        Err(e) => println!("  {e:#}"),
    }
    Ok(())
}

fn print_toolchain(toolchain: &dyn Toolchain, cwd: &Path) {
    match toolchain.version() {
        Ok(version) => println!("  go:           go{version}"),
        Err(e) => println!("  go:           {e}"),
    }
    match toolchain.gopath(cwd) {
        Ok(gopath) => {
            println!("  GOPATH:       {}", gopath.display());
            println!("  Module cache: {}", LocalCache::from_gopath(&gopath).root().display());
        }
        Err(e) => println!("  GOPATH:       {e}"),
    }
}
