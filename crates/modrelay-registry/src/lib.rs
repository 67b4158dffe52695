//! Registry side of modrelay.
//!
//! Module coordinates and their on-disk encoding, version parsing, registry
//! endpoints and credentials, and the backends modules are looked up in and
//! published to. Supports an HTTP registry exposing the module proxy API and
//! a local filesystem registry laid out for `file://` proxy use.
//!
//! # Layout
//!
//! ```text
//! {base}/api/go/{repo}/{encodedPath}/@v/{version}.{mod,info}   lookup
//! {base}/{repo}/{encodedPath}/@v/{version}.{zip,mod,info}      deploy
//! ```

pub mod client;
pub mod coordinate;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod integrity;
pub mod publish;
pub mod version;

// Re-exports for convenience.
pub use client::{LocalRegistry, RegistryBackend};
pub use coordinate::{decode_path, encode_path, ModuleCoordinate};
pub use endpoint::{CredentialMask, Credentials, RegistryEndpoint};
pub use error::{RegistryError, Result};
pub use http::HttpRegistry;
pub use integrity::{ArtifactKind, BuildInfoDependency, ContentHash};
pub use publish::{publish, ModuleInfo, PublishRequest};
pub use version::{is_module_version, parse_module_version, parse_toolchain_version, Version};

/// Open the backend an endpoint points at: a filesystem registry for
/// `file://` URLs, the HTTP registry otherwise.
pub fn open_backend(endpoint: RegistryEndpoint) -> Result<Box<dyn RegistryBackend>> {
    match endpoint.local_root() {
        Some(root) => Ok(Box::new(LocalRegistry::new(root, endpoint.repo()))),
        None => Ok(Box::new(HttpRegistry::new(endpoint)?)),
    }
}
