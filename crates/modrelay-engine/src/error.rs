//! Engine error types.

use std::path::PathBuf;

use modrelay_registry::RegistryError;

use crate::toolchain::Source;

/// Failures of a single toolchain invocation.
#[derive(Debug, thiserror::Error)]
pub enum ToolchainError {
    /// The toolchain executable could not be started.
    #[error("could not run '{program}': {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The command ran and exited unsuccessfully. `output` is the masked
    /// stderr (or stdout when stderr is empty).
    #[error("'{command}' in {} failed: {output}", dir.display())]
    CommandFailed {
        command: String,
        dir: PathBuf,
        output: String,
    },

    /// The command succeeded but its output could not be understood.
    #[error("unexpected output from '{command}': {detail}")]
    UnexpectedOutput { command: String, detail: String },
}

impl ToolchainError {
    /// Text the offending module is extracted from.
    pub fn output(&self) -> &str {
        match self {
            ToolchainError::CommandFailed { output, .. } => output,
            ToolchainError::UnexpectedOutput { detail, .. } => detail,
            ToolchainError::Spawn { program, .. } => program,
        }
    }
}

/// Errors raised by the resolution and publish engine.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A source answered "not found" for a module. Recovered by switching
    /// source inside the resolver.
    #[error("{module} was not found in the {origin}")]
    SourceNotFound { module: String, origin: Source },

    #[error("Failed to retrieve {module} from both the registry and the origin")]
    BothSourcesExhausted { module: String },

    /// The same source failed twice for one module without the other source
    /// ever being tried.
    #[error("Failed to retrieve {module}: the {origin} failed repeatedly")]
    RetryLimitExceeded { module: String, origin: Source },

    /// A listing command failed and its output names no module.
    #[error("Missing module name and version in the error message: {detail}")]
    UnidentifiedFailure { detail: String },

    #[error("Could not find go.mod for project, searched upward from {}", start.display())]
    ProjectRootNotFound { start: PathBuf },

    #[error("side file {}: {detail}", path.display())]
    SideFile { path: PathBuf, detail: String },

    #[error("failed to publish {module}: {source}")]
    Publish {
        module: String,
        #[source]
        source: RegistryError,
    },

    /// The graph command failed right after a successful init. Recovered by
    /// the tidy fallback.
    #[error("graph failed after init for {module}: {detail}")]
    GraphAfterInit { module: String, detail: String },

    /// The archive of a module is not in the local module cache.
    #[error("{module} has no archive in the local module cache")]
    MissingArchive { module: String },

    #[error("run deadline exceeded")]
    DeadlineExceeded,

    #[error(transparent)]
    Toolchain(#[from] ToolchainError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("archive error: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Result type alias for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;
