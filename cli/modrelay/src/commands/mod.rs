//! CLI command implementations.

pub mod doctor;
pub mod publish;
pub mod run;
pub mod version;

use anyhow::{Context, Result};
use modrelay_engine::{GoToolchain, ProxySettings};
use modrelay_registry::{CredentialMask, RegistryBackend, RegistryEndpoint};

use crate::config::Config;

/// The configured registry, opened.
pub struct Registry {
    pub endpoint: RegistryEndpoint,
    pub backend: Box<dyn RegistryBackend>,
}

impl Registry {
    /// Proxy settings for resolving through this registry.
    pub fn proxies(&self, config: &Config) -> Result<ProxySettings> {
        let value = self
            .backend
            .proxy_value(config.registry.direct_fallback)
            .context("building the registry proxy value")?;
        Ok(ProxySettings::new(Some(value)))
    }
}

/// Open the registry named by `config`, `None` when none is configured.
pub fn open_registry(config: &Config) -> Result<Option<Registry>> {
    let Some(endpoint) = config.endpoint()? else {
        return Ok(None);
    };
    let backend = modrelay_registry::open_backend(endpoint.clone())
        .with_context(|| format!("opening registry {}", endpoint.base_url()))?;
    Ok(Some(Registry { endpoint, backend }))
}

/// Like [`open_registry`], but a registry is mandatory.
pub fn require_registry(config: &Config) -> Result<Registry> {
    open_registry(config)?.context(
        "no registry configured; set [registry] url and repo in modrelay.toml or MODRELAY_REGISTRY_URL and MODRELAY_REPO",
    )
}

/// The `go` toolchain from `PATH`.
pub fn open_toolchain() -> Result<GoToolchain> {
    let mask = CredentialMask::new()?;
    GoToolchain::new(mask).context("locating the go toolchain")
}
