//! Resolution and publish engine for modrelay.
//!
//! Resolves a project's module dependency set through the registry with
//! fallback to each module's origin, materializes every module in the local
//! module cache, and republishes what the registry lacks, dependencies first.
//!
//! # Flow
//!
//! ```text
//! GraphResolver ──► replace::merge ──► ExistenceProbe ──► LocalCache
//!                                                            │
//!                        DependencyPublisher (simple | recursive)
//!                                                            │
//!                                                   RegistryBackend
//! ```
//!
//! Every toolchain invocation takes its working directory and proxy setting
//! as arguments, and the project's go.sum is restored around any command that
//! may rewrite it.

pub mod coordinator;
pub mod deps_cache;
pub mod error;
pub mod fallback;
pub mod listing;
pub mod local_cache;
pub mod modfile;
pub mod package;
pub mod probe;
pub mod project;
pub mod replace;
pub mod resolver;
pub mod sidefile;
pub mod toolchain;
pub mod walker;

#[cfg(test)]
mod testing;

// Re-exports for convenience.
pub use coordinator::{
    DependencyPublisher, PublishContext, PublishCoordinator, PublishOptions, RunSummary, Strategy,
};
pub use deps_cache::DependenciesCache;
pub use error::{EngineError, Result, ToolchainError};
pub use fallback::{dependency_not_found, FallbackRunner, OnMissing};
pub use listing::{ListingMode, ListingParser, ModuleGraph};
pub use local_cache::LocalCache;
pub use modfile::{sign, ModInspector, DEFAULT_EDIT_MARKER};
pub use package::{Package, SimplePublisher};
pub use project::find_project_root;
pub use replace::ReplaceDirective;
pub use resolver::GraphResolver;
pub use sidefile::{guarded, SideFileGuard};
pub use toolchain::{DownloadInfo, GoToolchain, ProxySettings, Source, Toolchain};
pub use walker::RecursivePublisher;
