//! Resolve a project's dependencies, then publish what the registry lacks.
//!
//! ```text
//! find project root
//!   -> resolve graph (registry, origin fallback)
//!   -> merge replace directives from go.mod
//!   -> probe + download each module (project go.sum set aside)
//!   -> load packages from the local module cache
//!   -> publish through the selected strategy
//!   -> summary line
//! ```

use std::path::Path;
use std::time::{Duration, Instant};

use modrelay_registry::{ModuleCoordinate, RegistryBackend};
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::deps_cache::DependenciesCache;
use crate::error::{EngineError, Result};
use crate::listing::{ListingMode, ListingParser};
use crate::local_cache::LocalCache;
use crate::modfile::{ModInspector, DEFAULT_EDIT_MARKER};
use crate::package::{Package, SimplePublisher};
use crate::probe::ExistenceProbe;
use crate::project::find_project_root;
use crate::replace;
use crate::resolver::GraphResolver;
use crate::sidefile::{SideFileGuard, MOD_FILE, SUM_FILE};
use crate::toolchain::{ProxySettings, Toolchain};
use crate::walker::RecursivePublisher;

/// Everything one publish run needs, passed explicitly to every step.
pub struct PublishContext<'a> {
    pub toolchain: &'a dyn Toolchain,
    pub registry: &'a dyn RegistryBackend,
    pub proxies: ProxySettings,
    pub parser: ListingParser,
    pub inspector: ModInspector,
    pub local_cache: LocalCache,
    pub target_repo: String,
    pub listing: ListingMode,
    pub edit_marker: String,
    pub deadline: Option<Instant>,
}

impl<'a> PublishContext<'a> {
    pub fn new(
        toolchain: &'a dyn Toolchain,
        registry: &'a dyn RegistryBackend,
        proxies: ProxySettings,
        local_cache: LocalCache,
        target_repo: impl Into<String>,
    ) -> Result<Self> {
        Ok(PublishContext {
            toolchain,
            registry,
            proxies,
            parser: ListingParser::new()?,
            inspector: ModInspector::new()?,
            local_cache,
            target_repo: target_repo.into(),
            listing: ListingMode::default(),
            edit_marker: DEFAULT_EDIT_MARKER.to_string(),
            deadline: None,
        })
    }

    pub fn with_listing(mut self, listing: ListingMode) -> Self {
        self.listing = listing;
        self
    }

    pub fn with_edit_marker(mut self, marker: impl Into<String>) -> Self {
        self.edit_marker = marker.into();
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Instant>) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn resolver(&self) -> GraphResolver<'_> {
        GraphResolver::new(self.toolchain, &self.proxies, &self.parser, self.listing)
    }

    pub fn check_deadline(&self) -> Result<()> {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(EngineError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

/// The shared contract of both publish strategies.
pub trait DependencyPublisher {
    /// Prepare `package` as the strategy requires and publish it (and, for
    /// the recursive strategy, whatever it transitively needs).
    fn populate_and_publish(
        &mut self,
        ctx: &PublishContext<'_>,
        package: Package,
        cache: &mut DependenciesCache,
    ) -> Result<()>;
}

/// How dependencies are published.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Publish top-level dependencies as they are.
    Simple,
    /// Normalize requirements files and publish transitive dependencies
    /// first.
    #[default]
    Recursive,
}

impl Strategy {
    pub fn publisher(self) -> Result<Box<dyn DependencyPublisher>> {
        match self {
            Strategy::Simple => Ok(Box::new(SimplePublisher)),
            Strategy::Recursive => Ok(Box::new(RecursivePublisher::new()?)),
        }
    }
}

/// Knobs for one run.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    pub target_repo: String,
    pub strategy: Strategy,
    pub listing: ListingMode,
    pub edit_marker: String,
    pub timeout: Option<Duration>,
}

impl PublishOptions {
    pub fn new(target_repo: impl Into<String>) -> Self {
        PublishOptions {
            target_repo: target_repo.into(),
            strategy: Strategy::default(),
            listing: ListingMode::default(),
            edit_marker: DEFAULT_EDIT_MARKER.to_string(),
            timeout: None,
        }
    }
}

/// Final counters of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub total: usize,
    pub successes: usize,
    pub failures: usize,
}

impl From<&DependenciesCache> for RunSummary {
    fn from(cache: &DependenciesCache) -> Self {
        RunSummary {
            total: cache.total(),
            successes: cache.successes(),
            failures: cache.failures(),
        }
    }
}

pub struct PublishCoordinator<'a> {
    toolchain: &'a dyn Toolchain,
    registry: &'a dyn RegistryBackend,
    proxies: ProxySettings,
    options: PublishOptions,
}

impl<'a> PublishCoordinator<'a> {
    pub fn new(
        toolchain: &'a dyn Toolchain,
        registry: &'a dyn RegistryBackend,
        proxies: ProxySettings,
        options: PublishOptions,
    ) -> Self {
        PublishCoordinator {
            toolchain,
            registry,
            proxies,
            options,
        }
    }

    /// Resolve and publish the dependencies of the project containing
    /// `start`.
    ///
    /// With `fail_on_error`, the first dependency that cannot be loaded or
    /// published ends the run. The summary line is logged on every exit.
    pub fn run(&self, start: &Path, fail_on_error: bool) -> Result<RunSummary> {
        let mut cache = DependenciesCache::new();
        let outcome = self.collect_and_publish(start, fail_on_error, &mut cache);
        info!(
            "Done building and publishing {} dependencies to {} out of a total of {} dependencies.",
            cache.successes(),
            self.options.target_repo,
            cache.total()
        );
        outcome.map(|()| RunSummary::from(&cache))
    }

    fn collect_and_publish(
        &self,
        start: &Path,
        fail_on_error: bool,
        cache: &mut DependenciesCache,
    ) -> Result<()> {
        let root = find_project_root(start)?;
        debug!("Project root: {}", root.display());
        let gopath = self.toolchain.gopath(&root)?;
        let deadline = self.options.timeout.map(|t| Instant::now() + t);
        let ctx = PublishContext::new(
            self.toolchain,
            self.registry,
            self.proxies.clone(),
            LocalCache::from_gopath(&gopath),
            self.options.target_repo.clone(),
        )?
        .with_listing(self.options.listing)
        .with_edit_marker(self.options.edit_marker.clone())
        .with_deadline(deadline);

        let coordinates = self.collect(&ctx, &root, cache)?;
        if coordinates.is_empty() {
            debug!("No dependencies to publish");
            return Ok(());
        }

        let mut packages = Vec::with_capacity(coordinates.len());
        for coord in &coordinates {
            match ctx.local_cache.load_package(coord) {
                Ok(Some(package)) => packages.push(package),
                Ok(None) => debug!("{coord} has no archive in the local module cache, skipping"),
                Err(e) if fail_on_error => return Err(e),
                Err(e) => error!("Received an error retrieving {coord}: {e}"),
            }
        }

        cache.increment_total(packages.len());
        let mut publisher = self.options.strategy.publisher()?;
        for package in packages {
            ctx.check_deadline()?;
            let module = package.coordinate().graph_key();
            match publisher.populate_and_publish(&ctx, package, cache) {
                Ok(()) => {}
                Err(EngineError::DeadlineExceeded) => return Err(EngineError::DeadlineExceeded),
                Err(e) if fail_on_error => return Err(e),
                Err(e) => error!("Failed to publish {module}: {e}"),
            }
        }
        Ok(())
    }

    /// Resolve, merge replacements, and materialize every module in the
    /// local module cache. The project's go.sum is set aside meanwhile.
    fn collect(
        &self,
        ctx: &PublishContext<'_>,
        root: &Path,
        cache: &mut DependenciesCache,
    ) -> Result<Vec<ModuleCoordinate>> {
        let mut graph = ctx.resolver().resolve(root)?;
        let manifest = std::fs::read_to_string(root.join(MOD_FILE))?;
        replace::merge(&replace::parse_directives(&manifest), &mut graph);

        let coordinates = graph
            .modules()
            .map(ModuleCoordinate::parse_graph_key)
            .collect::<modrelay_registry::Result<Vec<_>>>()?;

        let mut sum = SideFileGuard::capture_and_remove(root.join(SUM_FILE))?;
        let probe = ExistenceProbe::new(ctx);
        for coord in &coordinates {
            ctx.check_deadline()?;
            probe.materialize(root, coord, cache)?;
        }
        sum.restore()?;
        Ok(coordinates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeModule, FakeToolchain, Fixture, Outcome, PROJECT_MODULE, TARGET_REPO};

    fn options(strategy: Strategy) -> PublishOptions {
        PublishOptions {
            strategy,
            ..PublishOptions::new(TARGET_REPO)
        }
    }

    fn seed_world(fake: &FakeToolchain) {
        fake.add_module(
            "rsc.io/quote@v1.5.2",
            FakeModule::with_mod("module rsc.io/quote\n\nrequire rsc.io/sampler v1.3.0\n"),
        );
        fake.add_module(
            "rsc.io/sampler@v1.3.0",
            FakeModule::with_mod("module rsc.io/sampler\n\nrequire golang.org/x/text v0.3.0\n"),
        );
        fake.add_module("golang.org/x/text@v0.3.0", FakeModule::with_mod("module golang.org/x/text\n"));
        fake.script_graph(
            PROJECT_MODULE,
            vec![Outcome::Ok(
                "example.com/app rsc.io/quote@v1.5.2\n\
                 rsc.io/quote@v1.5.2 rsc.io/sampler@v1.3.0\n\
                 rsc.io/sampler@v1.3.0 golang.org/x/text@v0.3.0\n"
                    .into(),
            )],
        );
    }

    #[test]
    fn simple_run_publishes_missing_modules() {
        let fake = FakeToolchain::new();
        seed_world(&fake);
        let fixture = Fixture::new(&fake);
        fixture.seed_registry("rsc.io/quote@v1.5.2", "module rsc.io/quote\n");

        let coordinator = PublishCoordinator::new(&fake, &fixture.registry, fixture.proxies(), options(Strategy::Simple));
        let summary = coordinator.run(fixture.project(), true).unwrap();

        let mut published = fixture.registry.published();
        published.sort();
        assert_eq!(published, vec!["golang.org/x/text@v0.3.0", "rsc.io/sampler@v1.3.0"]);
        assert_eq!(summary, RunSummary { total: 3, successes: 2, failures: 0 });
    }

    #[test]
    fn recursive_run_publishes_every_missing_module() {
        let fake = FakeToolchain::new();
        seed_world(&fake);
        let fixture = Fixture::new(&fake);

        let summary = PublishCoordinator::new(&fake, &fixture.registry, fixture.proxies(), options(Strategy::Recursive))
            .run(fixture.project(), false)
            .unwrap();

        let mut published = fixture.registry.published();
        published.sort();
        assert_eq!(
            published,
            vec!["golang.org/x/text@v0.3.0", "rsc.io/quote@v1.5.2", "rsc.io/sampler@v1.3.0"]
        );
        assert_eq!(summary, RunSummary { total: 3, successes: 3, failures: 0 });
    }

    #[test]
    fn project_sum_survives_run() {
        let fake = FakeToolchain::new();
        seed_world(&fake);
        let fixture = Fixture::new(&fake);
        let sum = fixture.project().join(SUM_FILE);
        let before = std::fs::read(&sum).unwrap();

        PublishCoordinator::new(&fake, &fixture.registry, fixture.proxies(), options(Strategy::Simple))
            .run(fixture.project(), false)
            .unwrap();
        assert_eq!(std::fs::read(&sum).unwrap(), before);
    }

    #[test]
    fn replace_directives_join_the_graph() {
        let fake = FakeToolchain::new();
        seed_world(&fake);
        fake.add_module("rsc.io/quote@v1.5.1", FakeModule::with_mod("module rsc.io/quote\n"));
        let fixture = Fixture::new(&fake);
        fixture.write_project_mod(&format!(
            "module {PROJECT_MODULE}\n\nrequire rsc.io/quote v1.5.2\n\nreplace rsc.io/quote => rsc.io/quote v1.5.1\n"
        ));

        PublishCoordinator::new(&fake, &fixture.registry, fixture.proxies(), options(Strategy::Simple))
            .run(fixture.project(), true)
            .unwrap();
        let published = fixture.registry.published();
        assert!(published.contains(&"rsc.io/quote@v1.5.1".to_string()));
        assert!(!published.contains(&"rsc.io/quote@v1.5.2".to_string()));
    }

    #[test]
    fn resolution_failure_propagates() {
        let fake = FakeToolchain::new();
        let missing = "go: example.org/gone@v0.1.0: reading example.org/gone/@v/v0.1.0.mod: 404 Not Found";
        fake.script_graph(
            PROJECT_MODULE,
            vec![Outcome::Fail(missing.into()), Outcome::Fail(missing.into())],
        );
        let fixture = Fixture::new(&fake);

        let err = PublishCoordinator::new(&fake, &fixture.registry, fixture.proxies(), options(Strategy::Recursive))
            .run(fixture.project(), false)
            .unwrap_err();
        assert!(matches!(err, EngineError::BothSourcesExhausted { .. }));
        assert!(fixture.registry.published().is_empty());
    }

    #[test]
    fn expired_deadline_stops_run() {
        let fake = FakeToolchain::new();
        seed_world(&fake);
        let fixture = Fixture::new(&fake);
        let opts = PublishOptions {
            timeout: Some(Duration::ZERO),
            ..options(Strategy::Recursive)
        };

        let err = PublishCoordinator::new(&fake, &fixture.registry, fixture.proxies(), opts)
            .run(fixture.project(), false)
            .unwrap_err();
        assert!(matches!(err, EngineError::DeadlineExceeded));
        assert!(fixture.registry.published().is_empty());
    }

    #[test]
    fn strategy_serde_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            strategy: Strategy,
        }
        let w: Wrapper = serde_json::from_str(r#"{"strategy":"simple"}"#).unwrap();
        assert_eq!(w.strategy, Strategy::Simple);
        assert_eq!(Strategy::default(), Strategy::Recursive);
    }
}
