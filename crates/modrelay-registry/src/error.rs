//! Registry error types.

use std::path::PathBuf;

/// Errors that can occur during registry operations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// A graph or cache key could not be split into path and version.
    #[error("invalid module coordinate: {input}")]
    InvalidCoordinate { input: String },

    /// The registry answered with a status outside the expected set.
    #[error("unexpected registry response {status} for {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Registry URL could not be parsed or extended.
    #[error("invalid registry URL '{url}': {detail}")]
    InvalidUrl { url: String, detail: String },

    /// Publish error.
    #[error("publish failed for '{module}': {detail}")]
    PublishFailed { module: String, detail: String },

    /// Local registry storage error.
    #[error("registry storage error at {}: {detail}", path.display())]
    Storage { path: PathBuf, detail: String },

    /// A built-in pattern failed to compile.
    #[error("invalid pattern: {0}")]
    Pattern(#[from] regex::Error),

    /// HTTP transport error.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
