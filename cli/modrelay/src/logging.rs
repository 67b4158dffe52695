//! Log subscriber setup.

use tracing_subscriber::EnvFilter;

/// Filter directive in order of precedence: `RUST_LOG`, the config file's
/// `[log] filter`, `--verbose`, then `info`.
pub fn filter_directive(rust_log: Option<&str>, configured: Option<&str>, verbose: bool) -> String {
    let non_empty = |s: &&str| !s.trim().is_empty();
    if let Some(env) = rust_log.filter(non_empty) {
        return env.to_string();
    }
    if let Some(configured) = configured.filter(non_empty) {
        return configured.to_string();
    }
    if verbose {
        "debug".to_string()
    } else {
        "info".to_string()
    }
}

/// Install the global subscriber. Logs go to stderr so command output on
/// stdout stays clean. `NO_COLOR` disables ANSI colours.
pub fn init_logging(configured: Option<&str>, verbose: bool) {
    let rust_log = std::env::var("RUST_LOG").ok();
    let directive = filter_directive(rust_log.as_deref(), configured, verbose);
    let filter = EnvFilter::try_new(&directive).unwrap_or_else(|_| EnvFilter::new("info"));

    // A second init (tests, embedding) keeps the first subscriber.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_ansi(std::env::var_os("NO_COLOR").is_none())
        .try_init();
}
