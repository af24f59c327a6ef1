//! In-memory port implementations for tests.
//!
//! Available to this crate's unit tests and, behind the `test-utils`
//! feature, to downstream crates and integration tests.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Configuration;
use crate::domain::{Release, ReleaseAsset, RemoteTree, RepoInfo, TreeEntry};
use crate::events::AppEvent;
use crate::ports::{
    AppEventEmitter, ContentError, ContentWriterPort, DefaultRepositoriesPort, RemoteClientPort,
    RemoteError, RemoteResult, StoreError, StorePort,
};
use crate::services::{AppCore, Ports};

// ========== Events ==========

/// Records every emitted event. Clones share the same log.
#[derive(Debug, Clone, Default)]
pub struct RecordingEmitter {
    events: Arc<Mutex<Vec<AppEvent>>>,
}

impl RecordingEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AppEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, event: &AppEvent) -> usize {
        self.events().iter().filter(|e| *e == event).count()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl AppEventEmitter for RecordingEmitter {
    fn emit(&self, event: AppEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }

    fn clone_box(&self) -> Box<dyn AppEventEmitter> {
        Box::new(self.clone())
    }
}

// ========== Remote ==========

/// A repository served by [`FakeRemote`].
#[derive(Debug, Clone, Default)]
pub struct FakeRepository {
    pub info: RepoInfo,
    pub releases: Vec<Release>,
    pub tree: Vec<TreeEntry>,
    pub sha: String,
    pub files: HashMap<String, Vec<u8>>,
}

impl FakeRepository {
    pub fn new(id: &str, full_name: &str) -> Self {
        Self {
            info: RepoInfo {
                id: id.to_string(),
                full_name: full_name.to_string(),
                default_branch: "main".to_string(),
                etag: Some(format!("etag-{id}")),
                ..RepoInfo::default()
            },
            sha: "0123456789abcdef".to_string(),
            ..Self::default()
        }
    }

    /// Add a file to the tree with its content.
    #[must_use]
    pub fn with_file(mut self, path: &str, content: impl Into<Vec<u8>>) -> Self {
        let mut dir = String::new();
        for segment in path.split('/').take(path.matches('/').count()) {
            if !dir.is_empty() {
                dir.push('/');
            }
            dir.push_str(segment);
            if !self.tree.iter().any(|e| e.full_path == dir) {
                self.tree.push(TreeEntry::directory(dir.clone()));
            }
        }
        self.tree.push(TreeEntry::file(path));
        self.files.insert(path.to_string(), content.into());
        self
    }

    #[must_use]
    pub fn with_manifest(self, manifest: &Value) -> Self {
        self.with_file(crate::domain::MANIFEST_FILE, manifest.to_string())
    }

    /// Add a release with a single downloadable asset.
    #[must_use]
    pub fn with_release(mut self, tag: &str, asset: &str) -> Self {
        self.releases.push(Release {
            tag_name: tag.to_string(),
            assets: vec![ReleaseAsset {
                name: asset.to_string(),
                download_count: 3,
                download_url: asset_url(&self.info.full_name, tag, asset),
            }],
            ..Release::default()
        });
        self
    }
}

/// Download URL [`FakeRepository::with_release`] assigns to an asset.
pub fn asset_url(full_name: &str, tag: &str, asset: &str) -> String {
    format!("https://fake.invalid/{full_name}/releases/{tag}/{asset}")
}

#[derive(Debug, Default)]
struct FakeRemoteState {
    repositories: HashMap<String, FakeRepository>,
    downloads: HashMap<String, Vec<u8>>,
    failures: HashMap<String, RemoteError>,
    remaining: Option<RemoteResult<u64>>,
}

/// Code host backed by in-memory repositories.
#[derive(Debug, Clone, Default)]
pub struct FakeRemote {
    state: Arc<Mutex<FakeRemoteState>>,
    calls: Arc<AtomicUsize>,
}

impl FakeRemote {
    pub fn new() -> Self {
        let remote = Self::default();
        remote.set_remaining(Ok(5000));
        remote
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeRemoteState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add(&self, repository: FakeRepository) {
        self.lock()
            .repositories
            .insert(repository.info.full_name.to_lowercase(), repository);
    }

    pub fn add_download(&self, url: &str, bytes: impl Into<Vec<u8>>) {
        self.lock().downloads.insert(url.to_string(), bytes.into());
    }

    /// Every call for `full_name` fails with `error`.
    pub fn fail(&self, full_name: &str, error: RemoteError) {
        self.lock().failures.insert(full_name.to_lowercase(), error);
    }

    pub fn set_remaining(&self, remaining: RemoteResult<u64>) {
        self.lock().remaining = Some(remaining);
    }

    /// Remote calls made so far, quota checks excluded.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn repository(&self, full_name: &str) -> RemoteResult<FakeRepository> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let state = self.lock();
        let key = full_name.to_lowercase();
        if let Some(error) = state.failures.get(&key) {
            return Err(error.clone());
        }
        state
            .repositories
            .get(&key)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(full_name))
    }
}

#[async_trait]
impl RemoteClientPort for FakeRemote {
    async fn get_repository(&self, full_name: &str) -> RemoteResult<RepoInfo> {
        Ok(self.repository(full_name)?.info)
    }

    async fn get_releases(&self, full_name: &str) -> RemoteResult<Vec<Release>> {
        Ok(self.repository(full_name)?.releases)
    }

    async fn get_tree(&self, full_name: &str, _git_ref: &str) -> RemoteResult<RemoteTree> {
        let repository = self.repository(full_name)?;
        Ok(RemoteTree {
            sha: repository.sha,
            entries: repository.tree,
        })
    }

    async fn get_contents(
        &self,
        full_name: &str,
        path: &str,
        _git_ref: &str,
    ) -> RemoteResult<Vec<u8>> {
        self.repository(full_name)?
            .files
            .remove(path)
            .ok_or_else(|| RemoteError::not_found(format!("{full_name}/{path}")))
    }

    async fn download(&self, url: &str) -> RemoteResult<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.lock()
            .downloads
            .get(url)
            .cloned()
            .ok_or_else(|| RemoteError::not_found(url))
    }

    async fn rate_limit_remaining(&self) -> RemoteResult<u64> {
        self.lock().remaining.clone().unwrap_or(Ok(5000))
    }
}

// ========== Store ==========

/// Document store held in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    documents: Arc<Mutex<HashMap<String, Value>>>,
    fail_loads: Arc<Mutex<bool>>,
    saves: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, value: Value) {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.documents
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    /// Make every load fail with a storage error.
    pub fn fail_loads(&self) {
        *self.fail_loads.lock().unwrap_or_else(PoisonError::into_inner) = true;
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StorePort for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        if *self.fail_loads.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(StoreError::Storage(format!("cannot read {key}")));
        }
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.insert(key, value.clone());
        Ok(())
    }
}

/// Fixed bundled default list.
#[derive(Debug, Clone)]
pub struct StaticDefaults(pub Value);

#[async_trait]
impl DefaultRepositoriesPort for StaticDefaults {
    async fn load_defaults(&self) -> Result<Value, StoreError> {
        Ok(self.0.clone())
    }
}

// ========== Content ==========

/// Content writer that keeps files in memory.
#[derive(Debug, Clone, Default)]
pub struct MemoryContentWriter {
    files: Arc<Mutex<HashMap<PathBuf, Vec<u8>>>>,
}

impl MemoryContentWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn file(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path.as_ref())
            .cloned()
    }

    /// Written paths, sorted.
    pub fn paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

#[async_trait]
impl ContentWriterPort for MemoryContentWriter {
    async fn write_file(&self, target: &Path, bytes: &[u8]) -> Result<(), ContentError> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(target.to_path_buf(), bytes.to_vec());
        Ok(())
    }

    async fn remove(&self, target: &Path) -> Result<(), ContentError> {
        self.files
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|path, _| !path.starts_with(target));
        Ok(())
    }
}

// ========== Harness ==========

/// Running version reported by [`TestHarness`] cores.
pub const TEST_VERSION: &str = "2.0.0";

/// An [`AppCore`] wired to in-memory ports, with handles to every fake.
///
/// The configuration is rooted at `/config` and enables every category.
#[derive(Debug)]
pub struct TestHarness {
    pub remote: FakeRemote,
    pub store: MemoryStore,
    pub content: MemoryContentWriter,
    pub events: RecordingEmitter,
    core: AppCore,
}

impl TestHarness {
    pub fn new() -> Self {
        let remote = FakeRemote::new();
        Self::build(
            remote.clone(),
            Arc::new(remote),
            Value::Object(serde_json::Map::new()),
            test_configuration(),
        )
    }

    /// Harness over `config` instead of [`test_configuration`].
    pub fn with_config(config: Configuration) -> Self {
        let remote = FakeRemote::new();
        Self::build(
            remote.clone(),
            Arc::new(remote),
            Value::Object(serde_json::Map::new()),
            config,
        )
    }

    /// Harness whose core talks to `remote` instead of the fake.
    pub fn with_remote(remote: Arc<dyn RemoteClientPort>) -> Self {
        Self::build(
            FakeRemote::new(),
            remote,
            Value::Object(serde_json::Map::new()),
            test_configuration(),
        )
    }

    /// Harness with a bundled default repository list.
    pub fn with_defaults(defaults: Value) -> Self {
        let remote = FakeRemote::new();
        Self::build(remote.clone(), Arc::new(remote), defaults, test_configuration())
    }

    fn build(
        fake: FakeRemote,
        remote: Arc<dyn RemoteClientPort>,
        defaults: Value,
        config: Configuration,
    ) -> Self {
        let store = MemoryStore::new();
        let content = MemoryContentWriter::new();
        let events = RecordingEmitter::new();
        let ports = Ports::new(remote, Arc::new(store.clone()), Arc::new(content.clone()))
            .with_defaults(Arc::new(StaticDefaults(defaults)))
            .with_events(Arc::new(events.clone()));
        let core = AppCore::new(config, TEST_VERSION, ports);
        Self {
            remote: fake,
            store,
            content,
            events,
            core,
        }
    }

    pub const fn core(&self) -> &AppCore {
        &self.core
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration used by [`TestHarness`].
pub fn test_configuration() -> Configuration {
    Configuration {
        appdaemon: true,
        netdaemon: true,
        python_script: true,
        theme: true,
        experimental: true,
        ..Configuration::with_root("/config")
    }
}
