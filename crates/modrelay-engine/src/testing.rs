//! Scripted toolchain used by the engine's tests.
//!
//! Graph and list outputs are scripted per module path, where the module path
//! is read from `go.mod` in the command's working directory. Downloads
//! materialise real archives and requirements files under a private GOPATH so
//! the cache reader and the walker see what the real toolchain leaves behind.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::io::Write;
use std::path::{Path, PathBuf};

use modrelay_registry::{
    LocalRegistry, ModuleCoordinate, PublishRequest, RegistryBackend, Version,
};
use tempfile::TempDir;

use crate::coordinator::PublishContext;
use crate::error::ToolchainError;
use crate::local_cache::LocalCache;
use crate::sidefile::{MOD_FILE, SUM_FILE};
use crate::toolchain::{DownloadInfo, ProxySettings, Toolchain};

type Result<T> = std::result::Result<T, ToolchainError>;

pub const TARGET_REPO: &str = "go-local";
pub const PROJECT_MODULE: &str = "example.com/app";

/// A scripted command result.
#[derive(Debug, Clone)]
pub enum Outcome {
    Ok(String),
    Fail(String),
}

/// A module the fake can download.
#[derive(Debug, Clone)]
pub struct FakeModule {
    /// `go.mod` inside the archive; `None` leaves it out.
    pub zipped_mod: Option<String>,
    /// `go.sum` inside the archive.
    pub zipped_sum: Option<String>,
    /// The `.mod` file written next to the archive.
    pub cached_mod: String,
}

impl FakeModule {
    pub fn with_mod(content: &str) -> Self {
        FakeModule {
            zipped_mod: Some(content.to_string()),
            zipped_sum: None,
            cached_mod: content.to_string(),
        }
    }
}

/// One recorded invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub command: String,
    pub dir: PathBuf,
    pub proxy: Option<String>,
}

#[derive(Default)]
struct State {
    graph: HashMap<String, VecDeque<Outcome>>,
    list: HashMap<String, VecDeque<Outcome>>,
    run: VecDeque<Outcome>,
    tidy: HashMap<String, String>,
    init: HashMap<String, String>,
    init_failures: HashSet<String>,
    modules: HashMap<String, FakeModule>,
    calls: Vec<Call>,
    graph_sums: Vec<Option<String>>,
    tamper: bool,
}

pub struct FakeToolchain {
    gopath: TempDir,
    state: RefCell<State>,
}

impl FakeToolchain {
    pub fn new() -> Self {
        FakeToolchain {
            gopath: tempfile::tempdir().unwrap(),
            state: RefCell::new(State::default()),
        }
    }

    pub fn gopath_dir(&self) -> &Path {
        self.gopath.path()
    }

    /// `{GOPATH}/pkg/mod/cache/download`.
    pub fn cache_dir(&self) -> PathBuf {
        self.gopath.path().join("pkg/mod/cache/download")
    }

    pub fn script_graph(&self, module_path: &str, outcomes: Vec<Outcome>) {
        self.state
            .borrow_mut()
            .graph
            .entry(module_path.to_string())
            .or_default()
            .extend(outcomes);
    }

    pub fn script_list(&self, module_path: &str, outcomes: Vec<Outcome>) {
        self.state
            .borrow_mut()
            .list
            .entry(module_path.to_string())
            .or_default()
            .extend(outcomes);
    }

    pub fn script_run(&self, outcomes: Vec<Outcome>) {
        self.state.borrow_mut().run.extend(outcomes);
    }

    /// go.mod content `tidy` writes for a module.
    pub fn script_tidy(&self, module_path: &str, go_mod: &str) {
        self.state
            .borrow_mut()
            .tidy
            .insert(module_path.to_string(), go_mod.to_string());
    }

    /// go.mod content `init` writes for a module.
    pub fn script_init(&self, module_path: &str, go_mod: &str) {
        self.state
            .borrow_mut()
            .init
            .insert(module_path.to_string(), go_mod.to_string());
    }

    pub fn fail_init(&self, module_path: &str) {
        self.state
            .borrow_mut()
            .init_failures
            .insert(module_path.to_string());
    }

    /// Make `key` (`path@version`) downloadable.
    pub fn add_module(&self, key: &str, module: FakeModule) {
        self.state
            .borrow_mut()
            .modules
            .insert(key.to_string(), module);
    }

    /// Rewrite go.mod and go.sum on every graph or list call, and go.sum on
    /// every init.
    pub fn set_tamper(&self, tamper: bool) {
        self.state.borrow_mut().tamper = tamper;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// Commands starting with `prefix`.
    pub fn calls_of(&self, prefix: &str) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.command.starts_with(prefix))
            .collect()
    }

    /// go.sum content in the working directory when each graph call started.
    pub fn graph_sums(&self) -> Vec<Option<String>> {
        self.state.borrow().graph_sums.clone()
    }

    /// Proxy of every graph or list call, in order.
    pub fn graph_proxies(&self) -> Vec<Option<String>> {
        self.calls()
            .into_iter()
            .filter(|c| c.command == "graph" || c.command == "list")
            .map(|c| c.proxy)
            .collect()
    }

    /// `(path@version, from registry)` for every download.
    pub fn downloads(&self) -> Vec<(String, bool)> {
        self.calls_of("download ")
            .into_iter()
            .map(|c| {
                let key = c.command.trim_start_matches("download ").to_string();
                (key, c.proxy.is_some())
            })
            .collect()
    }

    fn record(&self, command: impl Into<String>, dir: &Path, proxy: Option<&str>) {
        self.state.borrow_mut().calls.push(Call {
            command: command.into(),
            dir: dir.to_path_buf(),
            proxy: proxy.map(str::to_string),
        });
    }

    fn module_of(dir: &Path) -> String {
        std::fs::read_to_string(dir.join("go.mod"))
            .unwrap_or_default()
            .lines()
            .find_map(|l| l.trim().strip_prefix("module ").map(|m| m.trim().to_string()))
            .unwrap_or_default()
    }

    fn failed(command: &str, dir: &Path, output: impl Into<String>) -> ToolchainError {
        ToolchainError::CommandFailed {
            command: format!("go {command}"),
            dir: dir.to_path_buf(),
            output: output.into(),
        }
    }

    fn scripted(&self, command: &str, dir: &Path, list: bool) -> Result<String> {
        let module = Self::module_of(dir);
        let mut state = self.state.borrow_mut();
        if state.tamper {
            std::fs::write(dir.join("go.mod"), "tampered").unwrap();
            std::fs::write(dir.join("go.sum"), "tampered").unwrap();
        }
        let scripts = if list { &mut state.list } else { &mut state.graph };
        let outcome = scripts.get_mut(&module).and_then(VecDeque::pop_front);
        match outcome {
            Some(Outcome::Ok(output)) => Ok(output),
            Some(Outcome::Fail(output)) => Err(Self::failed(command, dir, output)),
            None => Ok(String::new()),
        }
    }

    fn write_archive(zip_path: &Path, coord: &ModuleCoordinate, module: &FakeModule) {
        let file = std::fs::File::create(zip_path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = zip::write::FileOptions::default();
        let root = coord.graph_key();
        if let Some(content) = &module.zipped_mod {
            writer.start_file(format!("{root}/go.mod"), options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        if let Some(content) = &module.zipped_sum {
            writer.start_file(format!("{root}/go.sum"), options).unwrap();
            writer.write_all(content.as_bytes()).unwrap();
        }
        writer.start_file(format!("{root}/lib.go"), options).unwrap();
        writer.write_all(b"package lib\n").unwrap();
        writer.finish().unwrap();
    }
}

impl Toolchain for FakeToolchain {
    fn version(&self) -> Result<Version> {
        Ok(Version::new(1, 20, 0))
    }

    fn gopath(&self, dir: &Path) -> Result<PathBuf> {
        self.record("env GOPATH", dir, None);
        Ok(self.gopath.path().to_path_buf())
    }

    fn graph(&self, dir: &Path, proxy: Option<&str>) -> Result<String> {
        self.record("graph", dir, proxy);
        let sum = std::fs::read_to_string(dir.join(SUM_FILE)).ok();
        self.state.borrow_mut().graph_sums.push(sum);
        self.scripted("mod graph", dir, false)
    }

    fn list_all(&self, dir: &Path, proxy: Option<&str>) -> Result<String> {
        self.record("list", dir, proxy);
        self.scripted("list -m all", dir, true)
    }

    fn init(&self, dir: &Path, module_path: &str) -> Result<()> {
        self.record(format!("init {module_path}"), dir, None);
        let state = self.state.borrow();
        if state.init_failures.contains(module_path) {
            return Err(Self::failed("mod init", dir, "go: cannot determine module path"));
        }
        if dir.join("go.mod").exists() {
            return Err(Self::failed("mod init", dir, "go: go.mod already exists"));
        }
        if state.tamper {
            std::fs::write(dir.join("go.sum"), "tampered").unwrap();
        }
        let content = state
            .init
            .get(module_path)
            .cloned()
            .unwrap_or_else(|| format!("module {module_path}\n\ngo 1.20\n"));
        std::fs::write(dir.join("go.mod"), content).unwrap();
        Ok(())
    }

    fn tidy(&self, dir: &Path, proxy: Option<&str>) -> Result<()> {
        self.record("tidy", dir, proxy);
        let module = Self::module_of(dir);
        if let Some(content) = self.state.borrow().tidy.get(&module) {
            std::fs::write(dir.join("go.mod"), content).unwrap();
        }
        std::fs::write(dir.join("go.sum"), format!("{module} h1:tidy=\n")).unwrap();
        Ok(())
    }

    fn download(
        &self,
        dir: &Path,
        coord: &ModuleCoordinate,
        proxy: Option<&str>,
    ) -> Result<DownloadInfo> {
        let key = coord.graph_key();
        self.record(format!("download {key}"), dir, proxy);
        let module = self.state.borrow().modules.get(&key).cloned();
        let Some(module) = module else {
            return Err(Self::failed(
                "mod download",
                dir,
                format!("{key}: reading {key}.mod: 404 Not Found"),
            ));
        };
        let cache = self.cache_dir();
        let zip = cache.join(coord.artifact_path("zip"));
        let go_mod = cache.join(coord.artifact_path("mod"));
        let info = cache.join(coord.artifact_path("info"));
        std::fs::create_dir_all(zip.parent().unwrap()).unwrap();
        Self::write_archive(&zip, coord, &module);
        std::fs::write(&go_mod, &module.cached_mod).unwrap();
        std::fs::write(&info, format!("{{\"Version\":\"{}\"}}", coord.version)).unwrap();
        Ok(DownloadInfo {
            path: coord.path.clone(),
            version: coord.version.clone(),
            info: Some(info),
            go_mod: Some(go_mod),
            zip: Some(zip),
            error: None,
        })
    }

    fn run(&self, dir: &Path, args: &[String], proxy: Option<&str>) -> Result<String> {
        self.record(args.join(" "), dir, proxy);
        match self.state.borrow_mut().run.pop_front() {
            Some(Outcome::Ok(output)) => Ok(output),
            Some(Outcome::Fail(output)) => Err(Self::failed("run", dir, output)),
            None => Ok(String::new()),
        }
    }
}

/// Filesystem registry that records every publish.
pub struct CountingRegistry {
    inner: LocalRegistry,
    published: RefCell<Vec<String>>,
}

impl CountingRegistry {
    pub fn new(root: &Path) -> Self {
        CountingRegistry {
            inner: LocalRegistry::new(root.to_path_buf(), TARGET_REPO),
            published: RefCell::new(Vec::new()),
        }
    }

    /// `path@version` of every publish call, in order.
    pub fn published(&self) -> Vec<String> {
        self.published.borrow().clone()
    }
}

impl RegistryBackend for CountingRegistry {
    fn mod_exists(&self, coord: &ModuleCoordinate) -> modrelay_registry::Result<bool> {
        self.inner.mod_exists(coord)
    }

    fn fetch_mod(&self, coord: &ModuleCoordinate) -> modrelay_registry::Result<Option<Vec<u8>>> {
        self.inner.fetch_mod(coord)
    }

    fn resolve_version(
        &self,
        module_path: &str,
        query: &str,
    ) -> modrelay_registry::Result<Option<String>> {
        self.inner.resolve_version(module_path, query)
    }

    fn publish(&self, request: &PublishRequest) -> modrelay_registry::Result<()> {
        self.published
            .borrow_mut()
            .push(request.coordinate().graph_key());
        self.inner.publish(request)
    }

    fn proxy_value(&self, direct_fallback: bool) -> modrelay_registry::Result<String> {
        self.inner.proxy_value(direct_fallback)
    }
}

/// A project directory, a registry, and the fake toolchain wired together.
pub struct Fixture<'f> {
    fake: &'f FakeToolchain,
    project: TempDir,
    registry_dir: TempDir,
    pub registry: CountingRegistry,
}

impl<'f> Fixture<'f> {
    pub fn new(fake: &'f FakeToolchain) -> Self {
        let project = tempfile::tempdir().unwrap();
        std::fs::write(
            project.path().join(MOD_FILE),
            format!("module {PROJECT_MODULE}\n\ngo 1.20\n"),
        )
        .unwrap();
        std::fs::write(project.path().join(SUM_FILE), "project sums\n").unwrap();
        let registry_dir = tempfile::tempdir().unwrap();
        let registry = CountingRegistry::new(registry_dir.path());
        Fixture {
            fake,
            project,
            registry_dir,
            registry,
        }
    }

    pub fn project(&self) -> &Path {
        self.project.path()
    }

    pub fn write_project_mod(&self, content: &str) {
        std::fs::write(self.project.path().join(MOD_FILE), content).unwrap();
    }

    /// Put `key` in the registry without counting it as a publish.
    pub fn seed_registry(&self, key: &str, go_mod: &str) {
        let coord = ModuleCoordinate::parse_graph_key(key).unwrap();
        let seed = self.registry_dir.path().join("seed");
        std::fs::create_dir_all(&seed).unwrap();
        let zip_path = seed.join("seed.zip");
        let mod_path = seed.join("seed.mod");
        std::fs::write(&zip_path, b"PK seed").unwrap();
        std::fs::write(&mod_path, go_mod).unwrap();
        self.registry
            .inner
            .publish(&PublishRequest {
                zip_path,
                mod_content: go_mod.as_bytes().to_vec(),
                version: coord.version.clone(),
                target_repo: TARGET_REPO.to_string(),
                module_id: coord.path.clone(),
                mod_path,
                info_path: None,
            })
            .unwrap();
    }

    pub fn proxies(&self) -> ProxySettings {
        ProxySettings::new(Some(self.registry.proxy_value(true).unwrap()))
    }

    pub fn context(&self) -> PublishContext<'_> {
        PublishContext::new(
            self.fake,
            &self.registry,
            self.proxies(),
            LocalCache::from_gopath(self.fake.gopath_dir()),
            TARGET_REPO,
        )
        .unwrap()
    }
}
