//! Module and toolchain version parsing.
//!
//! Module versions are semantic versions with a mandatory `v` prefix
//! (`v1.2.3`, `v2.13.0+incompatible`, pseudo-versions such as
//! `v0.0.0-20180518054509-2e65f85255db`). Wraps the `semver` crate.

/// A parsed semantic version.
pub type Version = semver::Version;

/// Parse a module version such as `v1.5.2`.
///
/// Returns `None` for anything that is not a `v`-prefixed semantic version,
/// which is how local filesystem replacements are told apart from registry
/// coordinates.
pub fn parse_module_version(s: &str) -> Option<Version> {
    let rest = s.strip_prefix('v')?;
    Version::parse(rest).ok()
}

/// True if `s` is a registry-resolvable module version.
pub fn is_module_version(s: &str) -> bool {
    parse_module_version(s).is_some()
}

/// Parse the output of the toolchain's `version` command.
///
/// The expected shape is `go version go1.14.1 darwin/amd64`. Release
/// versions without a patch component (`go1.21`) are padded, and
/// pre-release suffixes (`go1.22rc1`) are ignored.
pub fn parse_toolchain_version(output: &str) -> Option<Version> {
    let token = output
        .split_whitespace()
        .find(|t| t.starts_with("go") && t[2..].starts_with(|c: char| c.is_ascii_digit()))?;
    let numeric: String = token[2..]
        .chars()
        .take_while(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    let mut parts: Vec<u64> = numeric
        .split('.')
        .filter(|p| !p.is_empty())
        .map(|p| p.parse().ok())
        .collect::<Option<Vec<_>>>()?;
    parts.resize(3, 0);
    Some(Version::new(parts[0], parts[1], parts[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn module_versions() {
        assert!(is_module_version("v1.5.2"));
        assert!(is_module_version("v2.13.0+incompatible"));
        assert!(is_module_version("v0.0.0-20180518054509-2e65f85255db"));
        assert!(!is_module_version("1.5.2"));
        assert!(!is_module_version("../local/path"));
        assert!(!is_module_version("/abs/path"));
        assert!(!is_module_version("vnext"));
    }

    #[test]
    fn pseudo_version_is_prerelease() {
        let v = parse_module_version("v0.0.0-20180518054509-2e65f85255db").unwrap();
        assert!(!v.pre.is_empty());
    }

    #[test]
    fn toolchain_version_output() {
        assert_eq!(
            parse_toolchain_version("go version go1.14.1 darwin/amd64"),
            Some(Version::new(1, 14, 1))
        );
        assert_eq!(
            parse_toolchain_version("go version go1.21 linux/amd64"),
            Some(Version::new(1, 21, 0))
        );
        assert_eq!(
            parse_toolchain_version("go version go1.22rc1 linux/arm64"),
            Some(Version::new(1, 22, 0))
        );
        assert_eq!(parse_toolchain_version("something else"), None);
    }
}
