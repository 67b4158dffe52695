//! `replace` directives: parsing from go.mod and merging into a graph.
//!
//! ```text
//! replace example.com/a => example.com/b v1.2.0          any version of a
//! replace example.com/a v1.0.0 => example.com/b v1.2.0   exactly a@v1.0.0
//! replace example.com/a => ../a                           local, remove only
//! replace (
//!     example.com/c => example.com/d v0.3.0
//! )
//! ```

use modrelay_registry::{is_module_version, ModuleCoordinate};
use tracing::debug;

use crate::listing::ModuleGraph;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaceDirective {
    pub target_path: String,
    /// `None` means every version of `target_path`.
    pub target_version: Option<String>,
    pub replacement_path: String,
    pub replacement_version: Option<String>,
}

impl ReplaceDirective {
    /// Parse the body of a directive (`old [v] => new [v]`), without the
    /// `replace` keyword.
    pub fn parse(body: &str) -> Option<Self> {
        let (left, right) = body.split_once("=>")?;
        let left: Vec<&str> = left.split_whitespace().collect();
        let right: Vec<&str> = right.split_whitespace().collect();
        let (target_path, target_version) = match left[..] {
            [path] => (path, None),
            [path, version] => (path, Some(version)),
            _ => return None,
        };
        let (replacement_path, replacement_version) = match right[..] {
            [path] => (path, None),
            [path, version] => (path, Some(version)),
            _ => return None,
        };
        Some(ReplaceDirective {
            target_path: target_path.to_string(),
            target_version: target_version.map(str::to_string),
            replacement_path: replacement_path.to_string(),
            replacement_version: replacement_version.map(str::to_string),
        })
    }

    /// The replacement as a graph key, when it is resolvable from a registry
    /// (versioned, not a filesystem path).
    pub fn replacement_key(&self) -> Option<String> {
        let version = self.replacement_version.as_deref()?;
        if is_local_path(&self.replacement_path) || !is_module_version(version) {
            return None;
        }
        Some(format!("{}@{}", self.replacement_path, version))
    }

    fn targets(&self, coord: &ModuleCoordinate) -> bool {
        coord.path == self.target_path
            && self
                .target_version
                .as_deref()
                .map_or(true, |v| v == coord.version)
    }
}

fn is_local_path(path: &str) -> bool {
    path.starts_with("./")
        || path.starts_with("../")
        || path.starts_with('/')
        || path.starts_with(".\\")
        || path.starts_with("..\\")
        || path.as_bytes().get(1) == Some(&b':')
}

fn strip_comment(line: &str) -> &str {
    line.find("//").map_or(line, |at| &line[..at]).trim()
}

/// Collect every replace directive in a go.mod, single-line and block form.
pub fn parse_directives(manifest: &str) -> Vec<ReplaceDirective> {
    let mut directives = Vec::new();
    let mut in_block = false;

    for raw in manifest.lines() {
        let line = strip_comment(raw);
        if in_block {
            if line == ")" {
                in_block = false;
            } else if !line.is_empty() {
                push_parsed(&mut directives, line);
            }
            continue;
        }
        let Some(rest) = line.strip_prefix("replace") else {
            continue;
        };
        let rest = rest.trim_start();
        if let Some(inner) = rest.strip_prefix('(') {
            debug!("Found replace block");
            let inner = inner.trim();
            if inner == ")" {
                continue;
            }
            in_block = true;
            if !inner.is_empty() {
                push_parsed(&mut directives, inner);
            }
        } else if rest.len() < line.len() - "replace".len() {
            // Keyword followed by whitespace, not a longer identifier.
            push_parsed(&mut directives, rest);
        }
    }
    directives
}

fn push_parsed(directives: &mut Vec<ReplaceDirective>, body: &str) {
    match ReplaceDirective::parse(body) {
        Some(directive) => directives.push(directive),
        None => debug!("Ignoring malformed replace line: {body}"),
    }
}

/// Apply directives to a resolved graph.
///
/// Matching modules are removed (every version, or the exact one). A
/// registry replacement is added when something was removed, or when the
/// directive targets every version of its path. Local replacements only
/// remove.
pub fn merge(directives: &[ReplaceDirective], graph: &mut ModuleGraph) {
    for directive in directives {
        let removed = graph.remove_matching(|coord| directive.targets(coord));
        if !removed.is_empty() {
            debug!("Replace removed {}", removed.join(", "));
        }
        match directive.replacement_key() {
            Some(key) if !removed.is_empty() || directive.target_version.is_none() => {
                debug!("Adding dependency {key}");
                graph.insert(key);
            }
            Some(key) => debug!("Nothing to replace for {key}"),
            None => debug!(
                "Replacement {} is not a registry coordinate",
                directive.replacement_path
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modules(graph: &ModuleGraph) -> Vec<&str> {
        graph.modules().collect()
    }

    #[test]
    fn absent_target_adds_replacement() {
        let mut graph = ModuleGraph::from_modules(["cli@v1.21.0"]);
        merge(&parse_directives("replace X => X v0.1.0\n"), &mut graph);
        assert_eq!(modules(&graph), vec!["X@v0.1.0", "cli@v1.21.0"]);
    }

    #[test]
    fn exact_version_replaces_only_that_version() {
        let mut graph = ModuleGraph::from_modules(["X@v0.1.0", "X@v0.1.1"]);
        merge(&parse_directives("replace X v0.1.1 => X v0.2.0\n"), &mut graph);
        assert_eq!(modules(&graph), vec!["X@v0.1.0", "X@v0.2.0"]);
    }

    #[test]
    fn path_only_replaces_every_version() {
        let mut graph = ModuleGraph::from_modules(["X@v0.1.0", "X@v0.1.1"]);
        merge(&parse_directives("replace X => X v0.2.0\n"), &mut graph);
        assert_eq!(modules(&graph), vec!["X@v0.2.0"]);
    }

    #[test]
    fn exact_version_without_match_is_noop() {
        let mut graph = ModuleGraph::from_modules(["X@v0.1.0"]);
        merge(&parse_directives("replace X v0.9.9 => X v0.2.0\n"), &mut graph);
        assert_eq!(modules(&graph), vec!["X@v0.1.0"]);
    }

    #[test]
    fn local_replacement_only_removes() {
        let mut graph = ModuleGraph::from_modules(["X@v0.1.0", "Y@v1.0.0"]);
        merge(&parse_directives("replace X => ../local/path\n"), &mut graph);
        assert_eq!(modules(&graph), vec!["Y@v1.0.0"]);

        let mut graph = ModuleGraph::from_modules(["Y@v1.0.0"]);
        merge(&parse_directives("replace X => ../local/path\n"), &mut graph);
        assert_eq!(modules(&graph), vec!["Y@v1.0.0"]);
    }

    #[test]
    fn replacement_may_change_path() {
        let mut graph = ModuleGraph::from_modules(["X@v0.1.0", "Y@v1.0.0"]);
        merge(&parse_directives("replace X => Z v0.3.0\n"), &mut graph);
        assert_eq!(modules(&graph), vec!["Y@v1.0.0", "Z@v0.3.0"]);
    }

    #[test]
    fn parses_lines_and_blocks() {
        let manifest = r#"module github.com/jfrog/project

go 1.14

require (
	github.com/jfrog/gofrog v1.0.6
	rsc.io/quote v1.5.2 // indirect
)

replace github.com/jfrog/gofrog => github.com/jfrog/gofrog v1.0.5

replace (
	rsc.io/quote v1.5.2 => rsc.io/quote v1.5.1 // pinned
	// rsc.io/sampler => rsc.io/sampler v1.0.0
	github.com/local/lib => ../lib
)

replace example.com/late v1.0.0 => example.com/late v1.1.0
"#;
        let directives = parse_directives(manifest);
        assert_eq!(directives.len(), 4);
        assert_eq!(
            directives[0],
            ReplaceDirective {
                target_path: "github.com/jfrog/gofrog".into(),
                target_version: None,
                replacement_path: "github.com/jfrog/gofrog".into(),
                replacement_version: Some("v1.0.5".into()),
            }
        );
        assert_eq!(directives[1].target_version.as_deref(), Some("v1.5.2"));
        assert_eq!(directives[1].replacement_key().as_deref(), Some("rsc.io/quote@v1.5.1"));
        assert_eq!(directives[2].replacement_key(), None);
        assert_eq!(directives[3].target_path, "example.com/late");
    }

    #[test]
    fn replace_prefix_of_other_words_ignored() {
        assert!(parse_directives("replacement => x v1.0.0\n").is_empty());
        assert!(parse_directives("replace ()\n").is_empty());
    }
}
