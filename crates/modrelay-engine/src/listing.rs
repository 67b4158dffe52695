//! Dependency listings and the parsers for the toolchain's two formats.
//!
//! Graph lines look like `parent@v1 child@v2`; the main module appears as a
//! parent without a version. List lines look like `path version`, optionally
//! followed by `=> newpath newversion` (registry replacement) or
//! `=> ../local` (filesystem replacement, dropped).

use std::collections::BTreeSet;

use modrelay_registry::ModuleCoordinate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;

/// Which listing command drives resolution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListingMode {
    /// `mod graph`: both ends of every parent/child line.
    #[default]
    Graph,
    /// `list -m all`: modules only.
    List,
}

/// Pseudo-modules printed by newer toolchains that are not dependencies.
const PSEUDO_MODULES: [&str; 2] = ["go", "toolchain"];

/// A resolved dependency set, keyed by `path@version`. Replacement
/// reconciliation works on membership, so only the nodes are kept.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModuleGraph {
    modules: BTreeSet<String>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        ModuleGraph::default()
    }

    pub fn from_modules<I, S>(modules: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        ModuleGraph {
            modules: modules.into_iter().map(Into::into).collect(),
        }
    }

    pub fn insert(&mut self, key: impl Into<String>) -> bool {
        self.modules.insert(key.into())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.modules.contains(key)
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Module keys in sorted order.
    pub fn modules(&self) -> impl Iterator<Item = &str> {
        self.modules.iter().map(String::as_str)
    }

    /// Remove every module whose coordinate satisfies `matches`. Returns the
    /// removed keys.
    pub fn remove_matching(&mut self, matches: impl Fn(&ModuleCoordinate) -> bool) -> Vec<String> {
        let removed: Vec<String> = self
            .modules
            .iter()
            .filter(|key| {
                ModuleCoordinate::parse_graph_key(key)
                    .map(|coord| matches(&coord))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        for key in &removed {
            self.modules.remove(key);
        }
        removed
    }
}

/// Parses listing output and toolchain failure text.
#[derive(Debug, Clone)]
pub struct ListingParser {
    failures: Vec<Regex>,
    coordinate: Regex,
}

impl ListingParser {
    pub fn new() -> Result<Self> {
        let failures = [
            r"([^\s:]+/[^\s:]*).*404 Not Found",
            r"([^\s:]+/[^\s:]*).*unrecognized import path",
            r"([^\s:]+/[^\s:]*).*unknown revision",
        ]
        .iter()
        .map(|p| Regex::new(p))
        .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ListingParser {
            failures,
            coordinate: Regex::new(r"([A-Za-z0-9][A-Za-z0-9._~/!+\-]*)@(v[0-9A-Za-z.+\-]+)")?,
        })
    }

    pub fn parse(&self, mode: ListingMode, output: &str) -> ModuleGraph {
        match mode {
            ListingMode::Graph => self.parse_graph(output),
            ListingMode::List => self.parse_list(output),
        }
    }

    /// Parse `mod graph` output.
    pub fn parse_graph(&self, output: &str) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for line in output.lines() {
            if line.contains("=>") {
                debug!("Skipping replacement entry in graph output: {line}");
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            let [parent, child] = tokens[..] else {
                continue;
            };
            if is_pseudo_module(parent) || is_pseudo_module(child) {
                continue;
            }
            for token in [parent, child] {
                if is_versioned(token) {
                    graph.insert(token);
                }
            }
        }
        graph
    }

    /// Parse `list -m all` output.
    pub fn parse_list(&self, output: &str) -> ModuleGraph {
        let mut graph = ModuleGraph::new();
        for line in output.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with("go:") {
                continue;
            }
            let tokens: Vec<&str> = line.split_whitespace().collect();
            match tokens[..] {
                [path, version] => {
                    graph.insert(format!("{path}@{version}"));
                }
                [_, _, "=>", path, version] => {
                    graph.insert(format!("{path}@{version}"));
                }
                [_, _, "=>", local] | [_, "=>", local] => {
                    debug!("Dropping local replacement {local} from: {line}");
                }
                // The main module.
                [_] => {}
                _ => debug!("Unrecognised list line: {line}"),
            }
        }
        graph
    }

    /// The `path@version` a failed listing command complains about.
    ///
    /// Known failure lines (404, unrecognized import path, unknown revision)
    /// are searched first; otherwise the first coordinate-shaped token in the
    /// text is used.
    pub fn offending_module(&self, error_text: &str) -> Option<String> {
        for line in error_text.lines() {
            if self.failures.iter().any(|re| re.is_match(line)) {
                if let Some(found) = self.first_coordinate(line) {
                    return Some(found);
                }
            }
        }
        self.first_coordinate(error_text)
    }

    fn first_coordinate(&self, text: &str) -> Option<String> {
        self.coordinate
            .captures(text)
            .map(|c| format!("{}@{}", &c[1], &c[2]))
    }
}

fn is_versioned(token: &str) -> bool {
    matches!(token.split_once('@'), Some((path, version)) if !path.is_empty() && !version.is_empty())
}

fn is_pseudo_module(token: &str) -> bool {
    let path = token.split_once('@').map_or(token, |(p, _)| p);
    PSEUDO_MODULES.contains(&path)
}
