//! `modrelay.toml` configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use modrelay_engine::{ListingMode, PublishOptions, Strategy, DEFAULT_EDIT_MARKER};
use modrelay_registry::{Credentials, RegistryEndpoint};
use serde::{Deserialize, Serialize};

pub const CONFIG_FILE: &str = "modrelay.toml";

/// The whole configuration file. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub registry: RegistryConfig,
    pub publish: PublishConfig,
    pub log: LogConfig,
}

/// Where modules are looked up and published.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Registry base URL. `file://` selects a filesystem registry.
    pub url: Option<String>,
    /// Repository modules are published to and resolved from.
    pub repo: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub access_token: Option<String>,
    /// Let the toolchain fall back to the origin on its own (`|direct`).
    pub direct_fallback: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        RegistryConfig {
            url: None,
            repo: None,
            user: None,
            password: None,
            access_token: None,
            direct_fallback: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublishConfig {
    /// Publish transitive dependencies first, rewriting empty requirements
    /// files.
    pub recursive: bool,
    /// Stop at the first dependency that fails to publish.
    pub fail_on_error: bool,
    pub edit_marker: String,
    /// Abort the run after this many seconds.
    pub timeout_secs: Option<u64>,
    pub listing: ListingMode,
}

impl Default for PublishConfig {
    fn default() -> Self {
        PublishConfig {
            recursive: true,
            fail_on_error: false,
            edit_marker: DEFAULT_EDIT_MARKER.to_string(),
            timeout_secs: None,
            listing: ListingMode::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// `EnvFilter` directive, e.g. `modrelay_engine=debug`.
    pub filter: Option<String>,
}

impl Config {
    /// Search upward from `start_dir` for a `modrelay.toml` file, parse and
    /// return it along with the directory it was found in.
    pub fn find_and_load(start_dir: &Path) -> Result<Option<(Self, PathBuf)>> {
        let mut dir = start_dir.to_path_buf();
        loop {
            let candidate = dir.join(CONFIG_FILE);
            if candidate.is_file() {
                return Ok(Some((Self::load(&candidate)?, dir)));
            }
            if !dir.pop() {
                return Ok(None);
            }
        }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))
    }

    /// An explicit `--config` path, else the nearest `modrelay.toml`, else
    /// defaults. Environment overrides are applied on top.
    pub fn resolve(explicit: Option<&Path>, cwd: &Path) -> Result<Self> {
        let mut config = match explicit {
            Some(path) => Self::load(path)?,
            None => Self::find_and_load(cwd)?
                .map(|(config, _)| config)
                .unwrap_or_default(),
        };
        config.apply_env(|name| std::env::var(name).ok());
        Ok(config)
    }

    /// Apply `MODRELAY_*` overrides from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let registry = &mut self.registry;
        let targets = [
            ("MODRELAY_REGISTRY_URL", &mut registry.url),
            ("MODRELAY_REPO", &mut registry.repo),
            ("MODRELAY_USER", &mut registry.user),
            ("MODRELAY_PASSWORD", &mut registry.password),
            ("MODRELAY_ACCESS_TOKEN", &mut registry.access_token),
        ];
        for (name, slot) in targets {
            if let Some(value) = lookup(name).filter(|v| !v.is_empty()) {
                *slot = Some(value);
            }
        }
    }

    /// The configured registry, `None` when no URL is set.
    pub fn endpoint(&self) -> Result<Option<RegistryEndpoint>> {
        let Some(url) = self.registry.url.as_deref() else {
            return Ok(None);
        };
        let Some(repo) = self.registry.repo.as_deref() else {
            bail!("registry url is set but no repository is configured ([registry] repo or MODRELAY_REPO)");
        };
        let credentials = Credentials {
            user: self.registry.user.clone(),
            password: self.registry.password.clone(),
            access_token: self.registry.access_token.clone(),
        };
        let endpoint = RegistryEndpoint::new(url, repo, credentials)
            .with_context(|| format!("invalid registry url {url}"))?;
        Ok(Some(endpoint))
    }

    pub fn publish_options(&self, target_repo: &str) -> PublishOptions {
        PublishOptions {
            strategy: if self.publish.recursive {
                Strategy::Recursive
            } else {
                Strategy::Simple
            },
            listing: self.publish.listing,
            edit_marker: self.publish.edit_marker.clone(),
            timeout: self.publish.timeout_secs.map(Duration::from_secs),
            ..PublishOptions::new(target_repo)
        }
    }
}
