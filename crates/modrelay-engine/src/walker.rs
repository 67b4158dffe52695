//! Recursive, dependency-first publishing.
//!
//! Each dependency moves through
//!
//! ```text
//! Unpacked -> ModResolved -> GraphObtained -> TransitiveHandled -> Published | Skipped
//! ```
//!
//! The walk uses an explicit stack of frames rather than call recursion.
//! A frame is pushed for a dependency, prepares it (unpack, normalize the
//! requirements file, obtain its graph, discover children), then pushes its
//! children one at a time. Once every child frame has been popped the
//! dependency itself is published. The [`DependenciesCache`] doubles as the
//! visited set, so diamonds and cycles are walked once.
//!
//! Failures of one dependency are logged and absorbed by the cache counters;
//! only [`EngineError::DeadlineExceeded`] ends the walk.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use modrelay_registry::ModuleCoordinate;
use tempfile::TempDir;
use tracing::{debug, error};

use crate::coordinator::{DependencyPublisher, PublishContext};
use crate::deps_cache::DependenciesCache;
use crate::error::{EngineError, Result};
use crate::listing::ModuleGraph;
use crate::modfile::sign;
use crate::package::{publish_counted, Package};
use crate::probe::ExistenceProbe;
use crate::sidefile::{guarded, MOD_FILE, SUM_FILE};

/// A dependency plus the state the walk keeps for it.
#[derive(Debug)]
pub struct PackageWithDeps {
    package: Package,
    should_revert: bool,
    original_mod_content: Vec<u8>,
    scratch: Option<TempDir>,
    module_dir: Option<PathBuf>,
}

impl PackageWithDeps {
    pub fn new(package: Package) -> Self {
        PackageWithDeps {
            package,
            should_revert: false,
            original_mod_content: Vec::new(),
            scratch: None,
            module_dir: None,
        }
    }

    pub fn id(&self) -> &str {
        self.package.id()
    }

    fn module_dir(&self) -> Result<&Path> {
        self.module_dir
            .as_deref()
            .ok_or_else(|| EngineError::MissingArchive {
                module: self.package.coordinate().graph_key(),
            })
    }

    fn mod_file(&self) -> Result<PathBuf> {
        Ok(self.module_dir()?.join(MOD_FILE))
    }

    /// Everything up to child discovery. Returns the children to walk.
    fn prepare(
        &mut self,
        ctx: &PublishContext<'_>,
        scratch_root: &Path,
        cache: &mut DependenciesCache,
    ) -> Vec<PackageWithDeps> {
        debug!("Starting to work on {}", self.id());
        if cache.is_published(self.id()) {
            self.refresh_from_registry(ctx, cache);
        }
        debug!(
            "Dependency {} mod file is empty: {}",
            self.id(),
            !ctx.inspector.has_requirements(self.package.mod_content())
        );

        match self.prepare_mod(ctx, scratch_root, cache) {
            Ok(graph) => self.discover_children(ctx, &graph, cache),
            Err(e) => {
                error!("{e}");
                Vec::new()
            }
        }
    }

    fn refresh_from_registry(&mut self, ctx: &PublishContext<'_>, cache: &mut DependenciesCache) {
        match ExistenceProbe::new(ctx).refresh_mod(self.package.coordinate()) {
            Ok(Some(content)) => self.package.set_mod_content(content),
            Ok(None) => {}
            Err(e) => {
                cache.increment_failures();
                error!("Failed to refresh the mod file of {}: {e}", self.id());
            }
        }
    }

    /// Unpack, then make the scratch go.mod usable for graph resolution.
    fn prepare_mod(
        &mut self,
        ctx: &PublishContext<'_>,
        scratch_root: &Path,
        cache: &DependenciesCache,
    ) -> Result<ModuleGraph> {
        self.unpack(scratch_root)?;
        self.should_revert = false;

        if ctx.inspector.has_requirements(self.package.mod_content()) {
            self.use_cached_mod()?;
        } else if !cache.is_published(self.id()) {
            return self.prepare_unpublished(ctx);
        } else {
            self.prepare_resolved(ctx)?;
        }
        self.resolve_graph(ctx)
    }

    /// Extract the archive into a private directory below `scratch_root`.
    fn unpack(&mut self, scratch_root: &Path) -> Result<()> {
        let scratch = tempfile::Builder::new()
            .prefix("modrelay-dep-")
            .tempdir_in(scratch_root)?;
        let file = std::fs::File::open(self.package.zip_path())?;
        let mut archive = zip::ZipArchive::new(file)?;
        archive.extract(scratch.path())?;

        let module_dir = scratch.path().join(self.package.coordinate().graph_key());
        std::fs::create_dir_all(&module_dir)?;
        debug!("Unpacked {} into {}", self.id(), module_dir.display());
        self.module_dir = Some(module_dir);
        self.scratch = Some(scratch);
        Ok(())
    }

    fn use_cached_mod(&self) -> Result<()> {
        debug!("Using the mod in the cache since not empty: {}", self.id());
        std::fs::write(self.mod_file()?, self.package.mod_content())?;
        self.remove_sum()
    }

    /// A module that is known to the registry but whose requirements file
    /// declares nothing.
    fn prepare_resolved(&mut self, ctx: &PublishContext<'_>) -> Result<()> {
        std::fs::write(self.mod_file()?, self.package.mod_content())?;
        if ctx.inspector.has_requirements(self.package.mod_content()) {
            debug!("Mod file is not empty after downloading from the registry: {}", self.id());
        } else {
            debug!("The mod is still empty after downloading from the registry: {}", self.id());
            let original = self.package.mod_content().to_vec();
            self.prepare_and_run_tidy(ctx, original);
        }
        Ok(())
    }

    /// A newly discovered module with an empty requirements file: try init,
    /// fall back to tidy.
    fn prepare_unpublished(&mut self, ctx: &PublishContext<'_>) -> Result<ModuleGraph> {
        let mod_file = self.mod_file()?;
        let original = self.package.mod_content().to_vec();

        if let Err(e) = self.run_init(ctx) {
            error!("{e}");
            if !mod_file.exists() {
                log_err(std::fs::write(&mod_file, &original).map_err(EngineError::from));
            }
        }
        let content = std::fs::read(&mod_file).unwrap_or_else(|e| {
            error!("Failed to read {}: {e}", mod_file.display());
            Vec::new()
        });
        self.package.set_mod_content(content);

        if !ctx.inspector.has_requirements(self.package.mod_content()) {
            debug!("The mod is still empty after running init for {}", self.id());
            self.prepare_and_run_tidy(ctx, original);
            return self.resolve_graph(ctx);
        }

        debug!("Mod file after init is not empty for {}", self.id());
        debug!("Signing mod file for {}", self.id());
        let signed = sign(self.package.mod_content(), &ctx.edit_marker);
        self.package.set_mod_content(signed);

        match self.resolve_graph(ctx) {
            Ok(graph) => {
                log_err(self.write_mod_to_cache(ctx));
                Ok(graph)
            }
            Err(e) => {
                let failure = EngineError::GraphAfterInit {
                    module: self.package.coordinate().graph_key(),
                    detail: e.to_string(),
                };
                debug!("{failure}");
                log_err(std::fs::write(&mod_file, &original).map_err(EngineError::from));
                self.package.set_mod_content(original.clone());
                self.prepare_and_run_tidy(ctx, original);
                self.resolve_graph(ctx)
            }
        }
    }

    fn run_init(&self, ctx: &PublishContext<'_>) -> Result<()> {
        let mod_file = self.mod_file()?;
        debug!("Preparing to init {}", mod_file.display());
        if mod_file.exists() {
            log_err(std::fs::remove_file(&mod_file).map_err(EngineError::from));
        }
        let dir = self.module_dir()?;
        guarded(dir, &[SUM_FILE], || {
            Ok(ctx.toolchain.init(dir, &self.package.coordinate().path)?)
        })
    }

    /// Populate the scratch go.mod with tidy so the graph can be read. The
    /// content to publish reverts to `original` afterwards.
    fn prepare_and_run_tidy(&mut self, ctx: &PublishContext<'_>, original: Vec<u8>) {
        if let Err(e) = self.run_tidy(ctx) {
            error!("{e}");
        }
        self.should_revert = true;
        self.original_mod_content = original;
    }

    fn run_tidy(&self, ctx: &PublishContext<'_>) -> Result<()> {
        let dir = self.module_dir()?;
        debug!("Preparing to populate mod {}", dir.display());
        log_err(self.remove_sum());
        guarded(dir, &[SUM_FILE], || Ok(ctx.toolchain.tidy(dir, None)?))
    }

    /// A stale go.sum from the archive would conflict with rewritten
    /// requirements.
    fn remove_sum(&self) -> Result<()> {
        let sum = self.module_dir()?.join(SUM_FILE);
        if sum.exists() {
            std::fs::remove_file(sum)?;
        }
        Ok(())
    }

    fn resolve_graph(&self, ctx: &PublishContext<'_>) -> Result<ModuleGraph> {
        ctx.resolver().resolve(self.module_dir()?)
    }

    fn write_mod_to_cache(&self, ctx: &PublishContext<'_>) -> Result<()> {
        ctx.local_cache
            .write_mod(self.package.coordinate(), self.package.mod_content())
    }

    /// Children from this dependency's graph that nothing has claimed yet.
    /// The scratch go.sum is guarded while they are downloaded.
    fn discover_children(
        &self,
        ctx: &PublishContext<'_>,
        graph: &ModuleGraph,
        cache: &mut DependenciesCache,
    ) -> Vec<PackageWithDeps> {
        if graph.is_empty() {
            return Vec::new();
        }
        let dir = match self.module_dir() {
            Ok(dir) => dir,
            Err(e) => {
                error!("{e}");
                return Vec::new();
            }
        };
        let found = guarded(dir, &[SUM_FILE], || {
            Ok(self.collect_children(ctx, dir, graph, cache))
        });
        found.unwrap_or_else(|e| {
            error!("{e}");
            Vec::new()
        })
    }

    fn collect_children(
        &self,
        ctx: &PublishContext<'_>,
        dir: &Path,
        graph: &ModuleGraph,
        cache: &mut DependenciesCache,
    ) -> Vec<PackageWithDeps> {
        let probe = ExistenceProbe::new(ctx);
        let mut children = Vec::new();
        for key in graph.modules() {
            let coord = match ModuleCoordinate::parse_graph_key(key) {
                Ok(coord) => coord,
                Err(e) => {
                    debug!("{e}");
                    continue;
                }
            };
            let id = coord.cache_key();
            if cache.is_known(&id) {
                debug!("Dependency {key} has been previously added.");
                continue;
            }
            match probe.resolve_transitive(dir, &coord) {
                Ok(Some((package, in_registry))) => {
                    debug!("Dependency {} has transitive dependency {id}", self.id());
                    cache.mark(&id, in_registry);
                    children.push(PackageWithDeps::new(package));
                }
                Ok(None) => debug!("{key} is missing from the local module cache"),
                Err(e) => error!("{e}"),
            }
        }
        children
    }

    /// Revert, publish unless the registry already has it, and drop the
    /// scratch directory.
    fn finish(mut self, ctx: &PublishContext<'_>, cache: &mut DependenciesCache) {
        let published = cache.is_published(self.id());
        if !published && self.should_revert {
            debug!("Reverting to the original mod of {}", self.id());
            let original = std::mem::take(&mut self.original_mod_content);
            self.package.set_mod_content(original);
            log_err(self.write_mod_to_cache(ctx));
        }
        if !published {
            log_err(publish_counted(&self.package, ctx, cache));
            cache.mark(self.id(), true);
        }
        if let Some(scratch) = self.scratch.take() {
            let path = scratch.path().to_path_buf();
            if let Err(e) = scratch.close() {
                error!("Removing {} has encountered an error: {e}", path.display());
            }
        }
    }
}

fn log_err(result: Result<()>) {
    if let Err(e) = result {
        error!("{e}");
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Prepare,
    Children,
    Finish,
}

struct Frame {
    node: PackageWithDeps,
    stage: Stage,
    children: VecDeque<PackageWithDeps>,
}

impl Frame {
    fn new(node: PackageWithDeps) -> Self {
        Frame {
            node,
            stage: Stage::Prepare,
            children: VecDeque::new(),
        }
    }
}

/// The recursive strategy. Owns the scratch root every dependency is
/// unpacked under; it is removed when the publisher is dropped.
pub struct RecursivePublisher {
    scratch_root: TempDir,
}

impl RecursivePublisher {
    pub fn new() -> Result<Self> {
        let scratch_root = tempfile::Builder::new().prefix("modrelay-").tempdir()?;
        Ok(RecursivePublisher { scratch_root })
    }

    pub fn scratch_root(&self) -> &Path {
        self.scratch_root.path()
    }
}

impl DependencyPublisher for RecursivePublisher {
    fn populate_and_publish(
        &mut self,
        ctx: &PublishContext<'_>,
        package: Package,
        cache: &mut DependenciesCache,
    ) -> Result<()> {
        let scratch_root = self.scratch_root.path();
        let mut stack = vec![Frame::new(PackageWithDeps::new(package))];

        while let Some(frame) = stack.last_mut() {
            ctx.check_deadline()?;
            let stage = frame.stage;
            match stage {
                Stage::Prepare => {
                    let children = frame.node.prepare(ctx, scratch_root, cache);
                    cache.increment_total(children.len());
                    frame.children = children.into();
                    frame.stage = Stage::Children;
                }
                Stage::Children => match frame.children.pop_front() {
                    Some(child) if cache.is_published(child.id()) => {
                        debug!("The dependency {} was already handled", child.id());
                        cache.increment_success();
                    }
                    Some(child) => {
                        debug!("Starting to work on transitive dependency: {}", child.id());
                        stack.push(Frame::new(child));
                    }
                    None => frame.stage = Stage::Finish,
                },
                Stage::Finish => {
                    if let Some(done) = stack.pop() {
                        done.node.finish(ctx, cache);
                    }
                }
            }
        }
        Ok(())
    }
}
