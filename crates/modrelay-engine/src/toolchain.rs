//! Toolchain abstraction and the `go` command adapter.
//!
//! Every command takes an explicit working directory and an explicit proxy
//! setting. `Some(value)` sets `GOPROXY` for that one child process; `None`
//! removes it so modules resolve from their origin. Process-global state
//! (current directory, environment) is never touched.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use modrelay_registry::{parse_toolchain_version, CredentialMask, ModuleCoordinate, Version};
use serde::Deserialize;
use tracing::debug;

use crate::error::ToolchainError;

/// Name of the environment variable redirecting module resolution.
pub const PROXY_VAR: &str = "GOPROXY";

/// Oldest toolchain whose `list` no longer edits go.mod on its own and so
/// needs `-mod=mod`.
const MOD_FLAG_SINCE: (u64, u64) = (1, 15);

type Result<T> = std::result::Result<T, ToolchainError>;

/// Where a toolchain command resolves modules from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Source {
    Registry,
    Origin,
}

impl Source {
    pub fn other(self) -> Source {
        match self {
            Source::Registry => Source::Origin,
            Source::Origin => Source::Registry,
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Registry => write!(f, "registry"),
            Source::Origin => write!(f, "origin"),
        }
    }
}

/// Proxy values per source for one run.
#[derive(Debug, Clone, Default)]
pub struct ProxySettings {
    registry: Option<String>,
}

impl ProxySettings {
    pub fn new(registry: Option<String>) -> Self {
        ProxySettings { registry }
    }

    /// Origin only; every source maps to an unset proxy.
    pub fn origin_only() -> Self {
        ProxySettings { registry: None }
    }

    pub fn has_registry(&self) -> bool {
        self.registry.is_some()
    }

    pub fn for_source(&self, source: Source) -> Option<&str> {
        match source {
            Source::Registry => self.registry.as_deref(),
            Source::Origin => None,
        }
    }
}

/// Result of `mod download -json`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct DownloadInfo {
    pub path: String,
    pub version: String,
    pub info: Option<PathBuf>,
    pub go_mod: Option<PathBuf>,
    pub zip: Option<PathBuf>,
    pub error: Option<String>,
}

/// The external module toolchain.
pub trait Toolchain {
    /// Toolchain release, from `version`.
    fn version(&self) -> Result<Version>;

    /// First entry of `env GOPATH`.
    fn gopath(&self, dir: &Path) -> Result<PathBuf>;

    /// Raw `mod graph` output.
    fn graph(&self, dir: &Path, proxy: Option<&str>) -> Result<String>;

    /// Raw `list -m all` output.
    fn list_all(&self, dir: &Path, proxy: Option<&str>) -> Result<String>;

    /// `mod init <module_path>`.
    fn init(&self, dir: &Path, module_path: &str) -> Result<()>;

    /// `mod tidy`. Rewrites go.mod and go.sum in `dir`.
    fn tidy(&self, dir: &Path, proxy: Option<&str>) -> Result<()>;

    /// `mod download -json <path@version>` into the local module cache.
    fn download(
        &self,
        dir: &Path,
        coord: &ModuleCoordinate,
        proxy: Option<&str>,
    ) -> Result<DownloadInfo>;

    /// Arbitrary toolchain command; returns stdout.
    fn run(&self, dir: &Path, args: &[String], proxy: Option<&str>) -> Result<String>;
}

/// First entry of a `GOPATH` list.
pub fn first_path_entry(value: &str) -> Option<PathBuf> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    std::env::split_paths(trimmed)
        .find(|p| !p.as_os_str().is_empty())
}

/// The `go` executable.
pub struct GoToolchain {
    program: PathBuf,
    mask: CredentialMask,
    list_mod_flag: bool,
}

impl GoToolchain {
    /// Use `go` from `PATH`.
    pub fn new(mask: CredentialMask) -> Result<Self> {
        GoToolchain::with_program("go", mask)
    }

    /// Use a specific executable. Probes its version once.
    pub fn with_program(program: impl Into<PathBuf>, mask: CredentialMask) -> Result<Self> {
        let mut toolchain = GoToolchain {
            program: program.into(),
            mask,
            list_mod_flag: false,
        };
        let version = toolchain.version()?;
        toolchain.list_mod_flag = (version.major, version.minor) >= MOD_FLAG_SINCE;
        debug!(
            "Using {} (go{}), list -mod=mod: {}",
            toolchain.program.display(),
            version,
            toolchain.list_mod_flag
        );
        Ok(toolchain)
    }

    fn command(&self, dir: &Path, args: &[&str], proxy: Option<&str>) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(args).current_dir(dir);
        match proxy {
            Some(value) => cmd.env(PROXY_VAR, value),
            None => cmd.env_remove(PROXY_VAR),
        };
        cmd
    }

    fn label(args: &[&str]) -> String {
        format!("go {}", args.join(" "))
    }

    fn spawn(&self, mut cmd: Command) -> Result<Output> {
        cmd.output().map_err(|source| ToolchainError::Spawn {
            program: self.program.display().to_string(),
            source,
        })
    }

    /// Run and return stdout, or a masked failure.
    fn execute(&self, dir: &Path, args: &[&str], proxy: Option<&str>) -> Result<String> {
        let label = Self::label(args);
        debug!("Running '{}' in {}", label, dir.display());
        let output = self.spawn(self.command(dir, args, proxy))?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        if !stdout.is_empty() {
            debug!("{}", self.mask.mask(&stdout));
        }
        if output.status.success() {
            return Ok(stdout);
        }
        let stderr = String::from_utf8_lossy(&output.stderr);
        let text = if stderr.trim().is_empty() {
            stdout.as_str()
        } else {
            &*stderr
        };
        Err(ToolchainError::CommandFailed {
            command: label,
            dir: dir.to_path_buf(),
            output: self.mask.mask(text.trim()),
        })
    }
}

impl Toolchain for GoToolchain {
    fn version(&self) -> Result<Version> {
        let args = ["version"];
        let cwd = std::env::temp_dir();
        let output = self.execute(&cwd, &args, None)?;
        parse_toolchain_version(&output).ok_or_else(|| ToolchainError::UnexpectedOutput {
            command: Self::label(&args),
            detail: output.trim().to_string(),
        })
    }

    fn gopath(&self, dir: &Path) -> Result<PathBuf> {
        let args = ["env", "GOPATH"];
        let output = self.execute(dir, &args, None)?;
        first_path_entry(&output).ok_or_else(|| ToolchainError::UnexpectedOutput {
            command: Self::label(&args),
            detail: "GOPATH is empty".to_string(),
        })
    }

    fn graph(&self, dir: &Path, proxy: Option<&str>) -> Result<String> {
        self.execute(dir, &["mod", "graph"], proxy)
    }

    fn list_all(&self, dir: &Path, proxy: Option<&str>) -> Result<String> {
        if self.list_mod_flag {
            self.execute(dir, &["list", "-mod=mod", "-m", "all"], proxy)
        } else {
            self.execute(dir, &["list", "-m", "all"], proxy)
        }
    }

    fn init(&self, dir: &Path, module_path: &str) -> Result<()> {
        self.execute(dir, &["mod", "init", module_path], None)
            .map(|_| ())
    }

    fn tidy(&self, dir: &Path, proxy: Option<&str>) -> Result<()> {
        self.execute(dir, &["mod", "tidy"], proxy).map(|_| ())
    }

    fn download(
        &self,
        dir: &Path,
        coord: &ModuleCoordinate,
        proxy: Option<&str>,
    ) -> Result<DownloadInfo> {
        let key = coord.graph_key();
        let args = ["mod", "download", "-json", key.as_str()];
        match self.execute(dir, &args, proxy) {
            Ok(stdout) => {
                serde_json::from_str(&stdout).map_err(|e| ToolchainError::UnexpectedOutput {
                    command: Self::label(&args),
                    detail: e.to_string(),
                })
            }
            Err(ToolchainError::CommandFailed {
                command,
                dir,
                output,
            }) => {
                // The JSON document on stdout carries the real reason.
                let reason = serde_json::from_str::<DownloadInfo>(&output)
                    .ok()
                    .and_then(|info| info.error)
                    .unwrap_or(output);
                Err(ToolchainError::CommandFailed {
                    command,
                    dir,
                    output: reason,
                })
            }
            Err(other) => Err(other),
        }
    }

    fn run(&self, dir: &Path, args: &[String], proxy: Option<&str>) -> Result<String> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.execute(dir, &args, proxy)
    }
}
