//! Dual-source dependency resolution.
//!
//! The resolver is a two-state machine. Each attempt runs the listing
//! command against the active source (registry or origin). On failure the
//! offending `path@version` is pulled from the error text, the active source
//! is recorded against it, and the other source is tried next. A module that
//! has failed from both sources ends resolution with
//! [`EngineError::BothSourcesExhausted`]. Every attempt either succeeds or
//! records a new (module, source) pair, so the loop terminates.

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::error::{EngineError, Result, ToolchainError};
use crate::listing::{ListingMode, ListingParser, ModuleGraph};
use crate::sidefile::{guarded, MOD_FILE, SUM_FILE};
use crate::toolchain::{ProxySettings, Source, Toolchain};

/// Which sources already failed for one module.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PreviousTries {
    pub registry: bool,
    pub origin: bool,
}

impl PreviousTries {
    pub fn tried(&self, source: Source) -> bool {
        match source {
            Source::Registry => self.registry,
            Source::Origin => self.origin,
        }
    }

    pub fn mark(&mut self, source: Source) {
        match source {
            Source::Registry => self.registry = true,
            Source::Origin => self.origin = true,
        }
    }

    pub fn exhausted(&self) -> bool {
        self.registry && self.origin
    }
}

pub struct GraphResolver<'a> {
    toolchain: &'a dyn Toolchain,
    proxies: &'a ProxySettings,
    parser: &'a ListingParser,
    mode: ListingMode,
}

impl<'a> GraphResolver<'a> {
    pub fn new(
        toolchain: &'a dyn Toolchain,
        proxies: &'a ProxySettings,
        parser: &'a ListingParser,
        mode: ListingMode,
    ) -> Self {
        GraphResolver {
            toolchain,
            proxies,
            parser,
            mode,
        }
    }

    /// Resolve the dependency set of the module rooted at `dir`.
    ///
    /// go.mod and go.sum in `dir` are restored after every attempt.
    pub fn resolve(&self, dir: &Path) -> Result<ModuleGraph> {
        let mut source = if self.proxies.has_registry() {
            Source::Registry
        } else {
            Source::Origin
        };
        let mut tries: HashMap<String, PreviousTries> = HashMap::new();

        loop {
            debug!("Resolving dependencies of {} from the {source}", dir.display());
            let proxy = self.proxies.for_source(source);
            let attempt = guarded(dir, &[MOD_FILE, SUM_FILE], || {
                self.list(dir, proxy).map_err(EngineError::from)
            });

            let failure = match attempt {
                Ok(output) => return Ok(self.parser.parse(self.mode, &output)),
                Err(EngineError::Toolchain(failure @ ToolchainError::CommandFailed { .. })) => {
                    failure
                }
                Err(other) => return Err(other),
            };

            warn!("Received {failure} from the {source}");
            let module = self
                .parser
                .offending_module(failure.output())
                .ok_or_else(|| EngineError::UnidentifiedFailure {
                    detail: failure.to_string(),
                })?;

            if !self.proxies.has_registry() {
                return Err(EngineError::SourceNotFound {
                    module,
                    origin: Source::Origin,
                });
            }

            let record = tries.entry(module.clone()).or_default();
            if record.tried(source) {
                return Err(EngineError::RetryLimitExceeded {
                    module,
                    origin: source,
                });
            }
            record.mark(source);
            if record.exhausted() {
                return Err(EngineError::BothSourcesExhausted { module });
            }
            source = source.other();
        }
    }

    fn list(&self, dir: &Path, proxy: Option<&str>) -> std::result::Result<String, ToolchainError> {
        match self.mode {
            ListingMode::Graph => self.toolchain.graph(dir, proxy),
            ListingMode::List => self.toolchain.list_all(dir, proxy),
        }
    }
}
