//! `modrelay resolve-version`: resolve a version query against the registry.

use anyhow::{bail, Context, Result};
use modrelay_registry::RegistryBackend;

use crate::commands::require_registry;
use crate::config::Config;

pub fn run(config: &Config, module: &str, query: &str) -> Result<()> {
    let registry = require_registry(config)?;
    let version = resolve(registry.backend.as_ref(), module, query)?;
    println!("{version}");
    Ok(())
}

pub fn resolve(registry: &dyn RegistryBackend, module: &str, query: &str) -> Result<String> {
    let resolved = registry
        .resolve_version(module, query)
        .with_context(|| format!("resolving {module}@{query}"))?;
    match resolved {
        Some(version) => Ok(version),
        None => bail!("the registry has no version of {module} matching '{query}'"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use modrelay_registry::{LocalRegistry, PublishRequest};

    fn publish(registry: &LocalRegistry, dir: &std::path::Path, version: &str) {
        let zip_path = dir.join(format!("{version}.zip"));
        let mod_path = dir.join(format!("{version}.mod"));
        std::fs::write(&zip_path, b"zip").unwrap();
        std::fs::write(&mod_path, b"module rsc.io/quote\n").unwrap();
        registry
            .publish(&PublishRequest {
                zip_path,
                mod_content: b"module rsc.io/quote\n".to_vec(),
                version: version.to_string(),
                target_repo: "go-local".to_string(),
                module_id: "rsc.io/quote".to_string(),
                mod_path,
                info_path: None,
            })
            .unwrap();
    }

    #[test]
    fn latest_and_exact_queries() {
        let root = tempfile::tempdir().unwrap();
        let scratch = tempfile::tempdir().unwrap();
        let registry = LocalRegistry::new(root.path().to_path_buf(), "go-local");
        publish(&registry, scratch.path(), "v1.5.1");
        publish(&registry, scratch.path(), "v1.5.2");

        assert_eq!(resolve(&registry, "rsc.io/quote", "latest").unwrap(), "v1.5.2");
        assert_eq!(resolve(&registry, "rsc.io/quote", "v1.5.1").unwrap(), "v1.5.1");
    }

    #[test]
    fn unknown_module_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let registry = LocalRegistry::new(root.path().to_path_buf(), "go-local");
        let err = resolve(&registry, "example.org/none", "latest").unwrap_err();
        assert!(err.to_string().contains("example.org/none"));
    }
}
