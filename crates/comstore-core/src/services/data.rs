//! Data service - restores the registry from the store and writes it back.
//!
//! Restore merges the persisted documents into whatever is already
//! registered, so running it twice yields the same registry. Writes replace
//! both documents and are not transactional across them.

use std::any::Any;
use std::panic::AssertUnwindSafe;

use futures_util::FutureExt;
use futures_util::future::join_all;
use indexmap::IndexMap;
use serde_json::{Map, Value};
use tracing::{debug, error, info, warn};

use super::{Context, RepositoryRecord, RepositoryService};
use crate::domain::{CommonLists, SELF_REPOSITORY};
use crate::events::AppEvent;
use crate::ports::{CoreError, GLOBAL_DOCUMENT, REPOSITORIES_DOCUMENT, StoreError};
use crate::registry::RegistryError;

/// Id of a placeholder record that never maps to a real repository.
const SENTINEL_ID: &str = "0";

/// How a restore treats the running integration's own record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestoreMode {
    /// The running integration is marked installed at the running version.
    #[default]
    Running,
    /// Persisted records are taken as they are, for offline inspection.
    Inspect,
}

/// Which records a write projects.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WriteScope {
    /// Only categories enabled in the configuration.
    #[default]
    Enabled,
    /// Every registered repository.
    All,
}

/// Service for durable state.
#[derive(Debug, Clone)]
pub struct DataService {
    ctx: Context,
    repositories: RepositoryService,
}

impl DataService {
    pub const fn new(ctx: Context, repositories: RepositoryService) -> Self {
        Self { ctx, repositories }
    }

    /// Restore persisted state into the registry.
    ///
    /// Any failure, including a panic, is logged and reported as `false`.
    pub async fn restore(&self) -> bool {
        self.restore_with(RestoreMode::Running).await
    }

    /// [`Self::restore`] with an explicit mode.
    pub async fn restore_with(&self, mode: RestoreMode) -> bool {
        match AssertUnwindSafe(self.try_restore(mode)).catch_unwind().await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(error = %e, "Could not restore persisted data");
                false
            }
            Err(panic) => {
                error!(panic = panic_message(panic.as_ref()), "Restoring persisted data panicked");
                false
            }
        }
    }

    async fn try_restore(&self, mode: RestoreMode) -> Result<(), CoreError> {
        let state = &self.ctx.state;
        let store = &self.ctx.ports.store;
        state.set_new(false);

        let globals = store.load(GLOBAL_DOCUMENT).await?.unwrap_or(Value::Null);
        let mut repositories = store
            .load(REPOSITORIES_DOCUMENT)
            .await?
            .unwrap_or(Value::Null);

        if is_empty_document(&globals) && is_empty_document(&repositories) {
            info!("No persisted data, seeding from the bundled repository list");
            state.set_new(true);
            repositories = self.ctx.ports.defaults.load_defaults().await?;
        }

        let raw: CommonLists = if globals.is_null() {
            CommonLists::default()
        } else {
            serde_json::from_value(globals)
                .map_err(|e| StoreError::Serialization(format!("{GLOBAL_DOCUMENT}: {e}")))?
        };
        state.set_common(CommonLists::deduplicated(&raw));

        let records = parse_records(repositories)?;
        self.register_unknown(&records).await;

        for (id, record) in &records {
            if id == SENTINEL_ID {
                continue;
            }
            self.restore_record(id, record).await?;
        }

        if mode == RestoreMode::Running {
            self.force_self_installed().await;
        }
        debug!(
            repositories = self.ctx.registry.len(),
            "Persisted data restored"
        );
        Ok(())
    }

    /// Register every record the registry does not know yet.
    async fn register_unknown(&self, records: &IndexMap<String, RepositoryRecord>) {
        let registrations = records
            .iter()
            .filter(|(id, _)| *id != SENTINEL_ID)
            .filter(|(_, record)| {
                let full_name = self.ctx.state.resolve_rename(&record.full_name);
                !self.ctx.registry.is_registered(&full_name)
            })
            .map(|(id, record)| {
                self.repositories.register_repository(
                    &record.full_name,
                    record.category,
                    false,
                    Some(id.clone()),
                )
            });

        for result in join_all(registrations).await {
            match result {
                Ok(_) | Err(CoreError::Registry(RegistryError::AlreadyRegistered(_))) => {}
                Err(CoreError::Validation(reason)) => debug!(%reason, "Record not registered"),
                Err(e) => warn!(error = %e, "Could not register persisted repository"),
            }
        }
    }

    async fn restore_record(&self, id: &str, record: &RepositoryRecord) -> Result<(), CoreError> {
        let registry = &self.ctx.registry;
        let full_name = self.ctx.state.resolve_rename(&record.full_name);
        let Some(handle) = registry.get_by_full_name(&full_name) else {
            warn!(id, full_name, "Persisted repository is not registered, ignoring");
            return Ok(());
        };

        if registry.id_of(&full_name).as_deref() != Some(id) {
            match registry.rekey(&full_name, id).await {
                Ok(()) => {}
                Err(RegistryError::IdInUse { full_name: owner, .. }) => {
                    warn!(id, full_name, owner, "Persisted id belongs to another repository");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            }
        }

        let mut entity = handle.lock().await;
        record.apply_to(&mut entity);
        if !entity.install_state_consistent() {
            warn!(
                repository = %entity.string(),
                "Installed without a version or commit, marking as not installed"
            );
            entity.clear_installed();
        }
        entity.content.local = self.ctx.existing_local_path(&entity).await;
        if entity.data.installed {
            entity.first_install = false;
        }
        Ok(())
    }

    /// The running integration is always installed at the running version.
    async fn force_self_installed(&self) {
        let Some(handle) = self.ctx.registry.get_by_full_name(SELF_REPOSITORY) else {
            return;
        };
        let mut entity = handle.lock().await;
        entity.set_installed(Some(self.ctx.version.to_string()), None);
        entity.data.domain.get_or_insert_with(|| "hacs".to_string());
    }

    /// Write the global lists and every record to the store.
    ///
    /// Skipped while the system is disabled unless `force` is set.
    pub async fn write(&self, force: bool) -> Result<(), CoreError> {
        self.write_scoped(force, WriteScope::Enabled).await
    }

    /// [`Self::write`] over the records selected by `scope`.
    pub async fn write_scoped(&self, force: bool, scope: WriteScope) -> Result<(), CoreError> {
        if self.ctx.state.disabled() && !force {
            debug!("System is disabled, not writing data");
            return Ok(());
        }
        let store = &self.ctx.ports.store;

        let globals = serde_json::to_value(self.ctx.state.common())
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        store.save(GLOBAL_DOCUMENT, &globals).await?;

        let mut records = Map::new();
        for entity in self.ctx.registry.snapshot().await {
            if scope == WriteScope::Enabled && !self.ctx.config.is_enabled(entity.category()) {
                continue;
            }
            let Some(id) = entity.id().filter(|id| *id != SENTINEL_ID) else {
                continue;
            };
            let record = serde_json::to_value(RepositoryRecord::from_entity(&entity))
                .map_err(|e| StoreError::Serialization(e.to_string()))?;
            records.insert(id.to_string(), record);
        }
        debug!(records = records.len(), "Writing repository data");
        store
            .save(REPOSITORIES_DOCUMENT, &Value::Object(records))
            .await?;

        self.ctx.emit(AppEvent::RepositoriesChanged);
        self.ctx.emit(AppEvent::Config);
        Ok(())
    }

    /// Write even while disabled.
    pub async fn force_write(&self) -> Result<(), CoreError> {
        self.write(true).await
    }
}

fn is_empty_document(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}

/// Parse the `repositories` document. Records that do not fit are skipped.
fn parse_records(document: Value) -> Result<IndexMap<String, RepositoryRecord>, StoreError> {
    let entries = match document {
        Value::Null => return Ok(IndexMap::new()),
        Value::Object(entries) => entries,
        _ => {
            return Err(StoreError::Serialization(format!(
                "{REPOSITORIES_DOCUMENT} is not an object"
            )));
        }
    };

    let mut records = IndexMap::with_capacity(entries.len());
    for (id, value) in entries {
        match serde_json::from_value::<RepositoryRecord>(value) {
            Ok(record) => {
                records.insert(id, record);
            }
            Err(e) => warn!(id, error = %e, "Skipping unreadable repository record"),
        }
    }
    Ok(records)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("unknown panic")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Configuration;
    use crate::domain::Category;
    use crate::ports::PathSafety;
    use crate::services::{AppCore, Ports};
    use crate::testing::{
        FakeRemote, MemoryContentWriter, MemoryStore, TEST_VERSION, TestHarness,
    };
    use serde_json::json;
    use std::path::Path;
    use std::sync::Arc;

    fn stored() -> TestHarness {
        let harness = TestHarness::new();
        harness.store.insert(
            GLOBAL_DOCUMENT,
            json!({
                "archived_repositories": ["a", "a", "b"],
                "renamed_repositories": {"owner/old": "owner/new", "x/1": "x/2", "x/2": "x/3"},
                "ignored_repositories": ["owner/blocked", "owner/blocked"]
            }),
        );
        harness.store.insert(
            REPOSITORIES_DOCUMENT,
            json!({
                "0": {"full_name": "owner/sentinel", "category": "plugin"},
                "11": {
                    "full_name": "owner/widget",
                    "category": "plugin",
                    "installed": true,
                    "version_installed": "1.0.0",
                    "last_fetched": 1_700_000_000.5,
                    "new": false
                },
                "12": {"full_name": "owner/old", "category": "theme", "stargazers_count": 4},
                "13": {"full_name": "owner/broken", "category": "integration", "installed": true},
                "14": {"full_name": "owner/blocked", "category": "plugin"},
                "15": {"full_name": "hacs/integration", "category": "integration"}
            }),
        );
        harness
    }

    #[tokio::test]
    async fn test_restore_merges_records() {
        let harness = stored();
        let core = harness.core();
        assert!(core.data().restore().await);
        assert!(!core.state().is_new());

        let registry = core.registry();
        assert!(registry.get_by_id("0").is_none());
        assert!(!registry.is_registered("owner/sentinel"));
        assert!(!registry.is_registered("owner/blocked"));

        let widget = registry.get_by_id("11").unwrap();
        let widget = widget.lock().await;
        assert!(widget.data.installed);
        assert!(!widget.first_install);
        assert_eq!(
            widget.data.last_fetched.map(|t| t.timestamp_millis()),
            Some(1_700_000_000_500)
        );
        assert_eq!(widget.content.local, None);
        drop(widget);

        let renamed = registry.get_by_id("12").unwrap();
        assert_eq!(renamed.lock().await.full_name(), "owner/new");

        let broken = registry.get_by_id("13").unwrap();
        assert!(!broken.lock().await.data.installed);

        let own = registry.get_by_id("15").unwrap();
        let own = own.lock().await;
        assert!(own.data.installed);
        assert_eq!(own.data.installed_version.as_deref(), Some("2.0.0"));
    }

    #[tokio::test]
    async fn test_restore_deduplicates_globals() {
        let harness = stored();
        let core = harness.core();
        assert!(core.data().restore().await);

        let common = core.state().common();
        assert_eq!(common.archived_repositories, vec!["a", "b"]);
        assert_eq!(common.ignored_repositories, vec!["owner/blocked"]);
        assert_eq!(common.renamed_repositories.get("owner/old").map(String::as_str), Some("owner/new"));
        assert_eq!(common.renamed_repositories.get("x/1"), None);
        assert_eq!(common.renamed_repositories.get("x/2").map(String::as_str), Some("x/3"));
    }

    #[tokio::test]
    async fn test_restore_is_idempotent() {
        let harness = stored();
        let core = harness.core();
        assert!(core.data().restore().await);
        let first = core.registry().snapshot().await;
        let first_ids: Vec<_> = first.iter().map(|e| e.data.id.clone()).collect();

        assert!(core.data().restore().await);
        let second = core.registry().snapshot().await;
        let second_ids: Vec<_> = second.iter().map(|e| e.data.id.clone()).collect();

        assert_eq!(first, second);
        assert_eq!(first_ids, second_ids);
    }

    #[tokio::test]
    async fn test_restore_rekeys_registered_entities() {
        let harness = stored();
        let core = harness.core();
        core.repositories()
            .register_repository("owner/widget", Category::Plugin, false, Some("tmp".into()))
            .await
            .unwrap();

        assert!(core.data().restore().await);
        assert!(core.registry().get_by_id("tmp").is_none());
        let widget = core.registry().get_by_id("11").unwrap();
        assert_eq!(widget.lock().await.data.installed_version.as_deref(), Some("1.0.0"));
    }

    #[tokio::test]
    async fn test_fresh_install_seeds_defaults() {
        let harness = TestHarness::with_defaults(json!({
            "0": {"full_name": "owner/placeholder", "category": "plugin"},
            "21": {"full_name": "owner/card", "category": "plugin"},
            "22": {"full_name": "owner/weather", "category": "integration"}
        }));
        let core = harness.core();

        assert!(core.data().restore().await);
        assert!(core.state().is_new());
        assert_eq!(core.registry().len(), 2);
        assert!(core.registry().get_by_id("0").is_none());
        assert!(core.registry().get_by_id("21").is_some());
    }

    #[tokio::test]
    async fn test_restore_failure_returns_false() {
        let harness = TestHarness::new();
        harness.store.fail_loads();
        assert!(!harness.core().data().restore().await);

        let harness = TestHarness::new();
        harness.store.insert(REPOSITORIES_DOCUMENT, json!(["not", "an", "object"]));
        assert!(!harness.core().data().restore().await);
    }

    #[tokio::test]
    async fn test_write_round_trip() {
        let harness = stored();
        let core = harness.core();
        assert!(core.data().restore().await);
        harness.events.clear();

        core.data().write(false).await.unwrap();
        assert_eq!(
            harness.events.events(),
            vec![AppEvent::RepositoriesChanged, AppEvent::Config]
        );

        let written = harness.store.get(REPOSITORIES_DOCUMENT).unwrap();
        assert!(written.get("0").is_none());
        assert_eq!(written["11"]["version_installed"], "1.0.0");
        assert_eq!(written["12"]["full_name"], "owner/new");
        assert!(written["12"].get("installed").is_none());
        assert!(written["12"].get("stars").is_none());

        let globals = harness.store.get(GLOBAL_DOCUMENT).unwrap();
        assert_eq!(globals["archived_repositories"], json!(["a", "b"]));

        let reloaded = TestHarness::new();
        reloaded.store.insert(GLOBAL_DOCUMENT, globals);
        reloaded.store.insert(REPOSITORIES_DOCUMENT, written);
        assert!(reloaded.core().data().restore().await);
        let mut expected = core.registry().full_names();
        let mut actual = reloaded.core().registry().full_names();
        expected.sort();
        actual.sort();
        assert_eq!(actual, expected);
    }

    #[tokio::test]
    async fn test_write_skipped_when_disabled() {
        let harness = TestHarness::new();
        let core = harness.core();
        core.state().disable(crate::domain::DisabledReason::Constraints);

        core.data().write(false).await.unwrap();
        assert_eq!(harness.store.save_count(), 0);

        core.data().force_write().await.unwrap();
        assert_eq!(harness.store.save_count(), 2);
    }

    #[tokio::test]
    async fn test_inspect_restore_and_full_write_keep_records() {
        let harness = TestHarness::with_config(Configuration::with_root("/config"));
        harness.store.insert(
            REPOSITORIES_DOCUMENT,
            json!({
                "9": {"full_name": "owner/dark", "category": "appdaemon",
                      "installed": true, "version_installed": "1.0"},
                "172733314": {"full_name": "hacs/integration", "category": "integration",
                              "installed": true, "version_installed": "1.9.0"}
            }),
        );
        let core = harness.core();
        assert!(!core.config().is_enabled(Category::AppDaemon));

        assert!(core.data().restore_with(RestoreMode::Inspect).await);
        core.data().write_scoped(true, WriteScope::All).await.unwrap();

        let written = harness.store.get(REPOSITORIES_DOCUMENT).unwrap();
        assert_eq!(written["9"]["version_installed"], "1.0");
        assert_eq!(written["172733314"]["version_installed"], "1.9.0");

        core.data().force_write().await.unwrap();
        let written = harness.store.get(REPOSITORIES_DOCUMENT).unwrap();
        assert!(written.get("9").is_none());
    }

    struct RejectAll;

    impl PathSafety for RejectAll {
        fn is_safe(&self, _base: &Path, _candidate: &Path) -> bool {
            false
        }
    }

    fn core_on_disk(root: &Path, safety: Option<Arc<dyn PathSafety>>) -> AppCore {
        let store = MemoryStore::new();
        store.insert(
            REPOSITORIES_DOCUMENT,
            json!({
                "31": {"full_name": "owner/widget", "category": "plugin",
                       "installed": true, "version_installed": "1.0.0"}
            }),
        );
        let mut ports = Ports::new(
            Arc::new(FakeRemote::new()),
            Arc::new(store),
            Arc::new(MemoryContentWriter::new()),
        );
        if let Some(safety) = safety {
            ports = ports.with_path_safety(safety);
        }
        AppCore::new(Configuration::with_root(root), TEST_VERSION, ports)
    }

    #[tokio::test]
    async fn test_restore_sets_existing_safe_local_path() {
        let dir = tempfile::tempdir().unwrap();
        let widget_dir = dir.path().join("www/community/widget");
        std::fs::create_dir_all(&widget_dir).unwrap();

        let core = core_on_disk(dir.path(), None);
        assert!(core.data().restore().await);
        let widget = core.registry().get_by_id("31").unwrap();
        assert_eq!(widget.lock().await.content.local, Some(widget_dir));
    }

    #[tokio::test]
    async fn test_restore_ignores_unsafe_local_path() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("www/community/widget")).unwrap();

        let core = core_on_disk(dir.path(), Some(Arc::new(RejectAll)));
        assert!(core.data().restore().await);
        let widget = core.registry().get_by_id("31").unwrap();
        let widget = widget.lock().await;
        assert!(widget.data.installed);
        assert_eq!(widget.content.local, None);
    }
}
