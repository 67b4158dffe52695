//! modrelay CLI: resolve a Go project's module dependencies and republish
//! them through a package registry.

mod commands;
mod config;
mod logging;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};

use commands::publish::PublishFlags;
use config::Config;

#[derive(Parser)]
#[command(
    name = "modrelay",
    version,
    about = "Resolve module dependencies through a registry and republish what it lacks"
)]
struct Cli {
    /// Configuration file (default: nearest modrelay.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Registry base URL (overrides config and MODRELAY_REGISTRY_URL)
    #[arg(long, global = true)]
    registry_url: Option<String>,
    /// Target repository (overrides config and MODRELAY_REPO)
    #[arg(long, global = true)]
    repo: Option<String>,
    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish the project's dependencies that the registry lacks
    PublishDeps {
        /// Publish top-level dependencies only, as they are
        #[arg(long)]
        simple: bool,
        /// Stop at the first dependency that fails
        #[arg(long)]
        fail_on_error: bool,
        /// Abort after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Run a go command against the registry, falling back to the origin
    Run {
        /// Publish missing dependencies before falling back
        #[arg(long)]
        publish: bool,
        /// Resolve from the origin only
        #[arg(long, conflicts_with = "publish")]
        no_registry: bool,
        /// Arguments passed to go
        #[arg(last = true, required = true)]
        args: Vec<String>,
    },
    /// Resolve a version query (e.g. latest) against the registry
    ResolveVersion {
        /// Module path
        module: String,
        /// Version query
        #[arg(default_value = "latest")]
        query: String,
    },
    /// Check toolchain, project, and registry configuration
    Doctor,
}

fn main() {
    let cli = Cli::parse();

    let result = run(cli);
    if let Err(e) = result {
        eprintln!("error: {e:#}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let cwd = std::env::current_dir()?;
    let mut config = Config::resolve(cli.config.as_deref(), &cwd)?;
    if let Some(url) = cli.registry_url {
        config.registry.url = Some(url);
    }
    if let Some(repo) = cli.repo {
        config.registry.repo = Some(repo);
    }
    logging::init_logging(config.log.filter.as_deref(), cli.verbose);

    match cli.command {
        Commands::PublishDeps {
            simple,
            fail_on_error,
            timeout,
        } => commands::publish::run(
            &cwd,
            &config,
            PublishFlags {
                simple,
                fail_on_error,
                timeout_secs: timeout,
            },
        ),

        Commands::Run {
            publish,
            no_registry,
            args,
        } => commands::run::run(&cwd, &config, &args, publish, no_registry),

        Commands::ResolveVersion { module, query } => {
            commands::version::run(&config, &module, &query)
        }

        Commands::Doctor => commands::doctor::run(&cwd, &config),
    }
}
