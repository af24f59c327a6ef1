//! Repository service - the per-repository validate/update protocol.
//!
//! Every pass starts from a clean validation result. Problems with the
//! repository itself (missing, archived, non-compliant layout, broken
//! manifest) are collected as validation errors on the entity. Only
//! transport failures are returned as errors.

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, info};

use super::Context;
use crate::domain::{
    Category, MANIFEST_FILE, Manifest, Release, RepoInfo, RepositoryEntity, resolve_content,
};
use crate::events::{AppEvent, RepositoryAction};
use crate::ports::{CoreError, RemoteResult};
use crate::registry::{RegistryError, SharedEntity};

/// Result of [`RepositoryService::update_repository`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The precheck decided there was nothing to do.
    Skipped,
    /// Remote data was refreshed.
    Updated,
    /// Remote data was refreshed but failed validation.
    Invalid,
}

/// Service for validating, updating and registering repositories.
#[derive(Debug, Clone)]
pub struct RepositoryService {
    pub(super) ctx: Context,
}

impl RepositoryService {
    pub const fn new(ctx: Context) -> Self {
        Self { ctx }
    }

    /// Run the full validation pass against fresh remote data.
    ///
    /// Returns whether the entity validated cleanly; the errors are on
    /// `entity.validate`.
    pub async fn validate_repository(&self, entity: &mut RepositoryEntity) -> RemoteResult<bool> {
        self.validate_with_info(entity).await.map(|(valid, _)| valid)
    }

    /// Refresh one repository.
    ///
    /// Without `force` the update is skipped when the system is disabled,
    /// when the quota allows no more updates or when the remote etag is
    /// unchanged. With `ignore_issues` a failed validation still counts as
    /// an update.
    pub async fn update_repository(
        &self,
        handle: &SharedEntity,
        ignore_issues: bool,
        force: bool,
    ) -> RemoteResult<UpdateOutcome> {
        self.ctx
            .gate
            .run(self.update_inner(handle, ignore_issues, force))
            .await
    }

    async fn update_inner(
        &self,
        handle: &SharedEntity,
        ignore_issues: bool,
        force: bool,
    ) -> RemoteResult<UpdateOutcome> {
        let mut entity = handle.lock().await;

        if !force && !self.precheck(&entity).await? {
            return Ok(UpdateOutcome::Skipped);
        }

        let (valid, info) = self.validate_with_info(&mut entity).await?;
        if let Some(info) = &info {
            entity.data.etag_repository.clone_from(&info.etag);
        }
        entity.data.last_fetched = Some(Utc::now());
        entity.content.local = self.ctx.existing_local_path(&entity).await;

        if entity.data.installed {
            self.ctx.emit(AppEvent::repository(
                RepositoryAction::Update,
                entity.full_name(),
                entity.data.id.clone(),
            ));
        }

        let full_name = entity.full_name().to_string();
        let fetched_id = entity.data.id.clone();
        drop(entity);
        self.sync_id(&full_name, fetched_id.as_deref()).await;

        if valid || ignore_issues {
            Ok(UpdateOutcome::Updated)
        } else {
            Ok(UpdateOutcome::Invalid)
        }
    }

    /// Whether an unforced update should run.
    async fn precheck(&self, entity: &RepositoryEntity) -> RemoteResult<bool> {
        if self.ctx.state.disabled() {
            debug!(repository = %entity.string(), "Skipping update, system is disabled");
            return Ok(false);
        }
        if self.ctx.gate.updates_allowed() == Some(0) {
            debug!(repository = %entity.string(), "Skipping update, rate budget exhausted");
            return Ok(false);
        }
        let Some(known) = entity.data.etag_repository.as_deref() else {
            return Ok(true);
        };
        match self.ctx.ports.remote.get_repository(entity.full_name()).await {
            Ok(info) if info.etag.as_deref() == Some(known) => {
                debug!(repository = %entity.string(), "Skipping update, etag unchanged");
                Ok(false)
            }
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(true),
            Err(e) => Err(e),
        }
    }

    /// Keep the registry id index in line with a freshly fetched id.
    pub(super) async fn sync_id(&self, full_name: &str, fetched: Option<&str>) {
        let Some(fetched) = fetched else {
            return;
        };
        if self.ctx.registry.id_of(full_name).as_deref() == Some(fetched) {
            return;
        }
        if let Err(e) = self.ctx.registry.rekey(full_name, fetched).await {
            match e {
                RegistryError::NotFound(_) => {}
                other => error!(full_name, error = %other, "Could not re-key repository"),
            }
        }
    }

    async fn validate_with_info(
        &self,
        entity: &mut RepositoryEntity,
    ) -> RemoteResult<(bool, Option<RepoInfo>)> {
        entity.validate.reset();
        let remote = &self.ctx.ports.remote;
        let full_name = entity.full_name().to_string();

        let info = match remote.get_repository(&full_name).await {
            Ok(info) => info,
            Err(e) if e.is_not_found() => {
                entity.validate.push("Repository does not exist.");
                return Ok((self.finish(entity), None));
            }
            Err(e) => return Err(e),
        };
        apply_info(entity, &info);
        if info.archived {
            self.ctx.state.mark_archived(&full_name);
            entity.validate.push("Repository is archived.");
            return Ok((self.finish(entity), Some(info)));
        }

        let releases = match remote.get_releases(&full_name).await {
            Ok(releases) => releases,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(e),
        };
        apply_releases(entity, releases, self.ctx.config.release_limit);

        let git_ref = select_ref(entity);
        entity.git_ref = Some(git_ref.clone());

        let tree = match remote.get_tree(&full_name, &git_ref).await {
            Ok(tree) => tree,
            Err(e) if e.is_not_found() => {
                entity.tree.clear();
                entity.validate.push(format!(
                    "{full_name} Repository structure for {} is not compliant",
                    entity.ref_display()
                ));
                entity.apply_resolution(None);
                return Ok((self.finish(entity), Some(info)));
            }
            Err(e) => return Err(e),
        };
        entity.data.last_commit = Some(tree.sha.chars().take(7).collect());
        entity.tree = tree.entries;

        self.load_manifest(entity, &git_ref).await?;

        let resolved = resolve_content(
            entity.category(),
            entity.name(),
            &entity.manifest,
            &entity.releases.objects,
            &entity.tree,
        );
        if resolved.is_none() {
            entity.validate.push(format!(
                "{full_name} Repository structure for {} is not compliant",
                entity.ref_display()
            ));
        }
        entity.apply_resolution(resolved);

        if entity.category() == Category::Integration && entity.content.remote.is_some() {
            self.load_integration_domain(entity, &git_ref).await?;
        }

        Ok((self.finish(entity), Some(info)))
    }

    async fn load_manifest(&self, entity: &mut RepositoryEntity, git_ref: &str) -> RemoteResult<()> {
        if !entity.tree.iter().any(|e| e.full_path == MANIFEST_FILE) {
            entity.manifest = Manifest::default();
            return Ok(());
        }

        let bytes = match self
            .ctx
            .ports
            .remote
            .get_contents(entity.full_name(), MANIFEST_FILE, git_ref)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                entity.manifest = Manifest::default();
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match Manifest::from_slice(&bytes) {
            Ok(manifest) => {
                for field in manifest.missing_fields(entity.category()) {
                    entity.validate.push(format!(
                        "{} {MANIFEST_FILE} is missing required field '{field}'",
                        entity.string()
                    ));
                }
                entity.manifest = manifest;
            }
            Err(e) => {
                entity
                    .validate
                    .push(format!("{} {MANIFEST_FILE} is invalid: {e}", entity.string()));
            }
        }
        Ok(())
    }

    /// Read the integration domain from its `manifest.json`.
    async fn load_integration_domain(
        &self,
        entity: &mut RepositoryEntity,
        git_ref: &str,
    ) -> RemoteResult<()> {
        let Some(path) = entity
            .content
            .remote
            .as_ref()
            .and_then(|location| location.join("manifest.json"))
        else {
            return Ok(());
        };

        let bytes = match self
            .ctx
            .ports
            .remote
            .get_contents(entity.full_name(), &path, git_ref)
            .await
        {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(()),
            Err(e) => return Err(e),
        };

        let domain = serde_json::from_slice::<Value>(&bytes)
            .ok()
            .and_then(|v| v.get("domain").and_then(Value::as_str).map(str::to_string));
        match domain {
            Some(domain) => entity.data.domain = Some(domain),
            None if entity.data.domain.is_none() => entity.validate.push(format!(
                "{} Integration manifest has no domain",
                entity.string()
            )),
            None => {}
        }
        Ok(())
    }

    fn finish(&self, entity: &RepositoryEntity) -> bool {
        let valid = entity.validate.success();
        if !valid && !self.ctx.state.startup() {
            for message in entity.validate.errors() {
                error!(repository = %entity.string(), "{message}");
            }
        }
        valid
    }

    /// Register a new repository.
    ///
    /// Renames are followed and ignored repositories are rejected. With
    /// `check` the repository is validated first and only registered when
    /// validation succeeds.
    pub async fn register_repository(
        &self,
        full_name: &str,
        category: Category,
        check: bool,
        id: Option<String>,
    ) -> Result<SharedEntity, CoreError> {
        let full_name = self.ctx.state.resolve_rename(full_name);
        if self.ctx.state.is_ignored(&full_name) {
            return Err(CoreError::Validation(format!(
                "{full_name} is in the ignore list"
            )));
        }
        if self.ctx.registry.is_registered(&full_name) {
            return Err(RegistryError::AlreadyRegistered(full_name).into());
        }

        let mut entity = RepositoryEntity::new(&full_name, category);
        entity.data.id = id;

        if check {
            let valid = self
                .ctx
                .gate
                .run(self.validate_repository(&mut entity))
                .await?;
            if !valid {
                return Err(CoreError::Validation(entity.validate.errors().join(", ")));
            }
        }
        entity.content.local = self.ctx.existing_local_path(&entity).await;

        let id = entity.data.id.clone();
        let handle = self.ctx.registry.register(entity)?;
        debug!(full_name, ?category, "Repository registered");

        if !self.ctx.state.startup() {
            info!(full_name, "New repository added");
            self.ctx.emit(AppEvent::repository(
                RepositoryAction::Registration,
                full_name,
                id,
            ));
        }
        Ok(handle)
    }
}

fn apply_info(entity: &mut RepositoryEntity, info: &RepoInfo) {
    let data = &mut entity.data;
    if data.id.is_none() && !info.id.is_empty() {
        data.id = Some(info.id.clone());
    }
    data.description.clone_from(&info.description);
    data.topics.clone_from(&info.topics);
    data.stargazers_count = info.stargazers_count;
    data.archived = info.archived;
    if !info.default_branch.is_empty() {
        data.default_branch = Some(info.default_branch.clone());
    }
    if let Some(pushed_at) = info.pushed_at {
        data.last_updated = pushed_at.to_rfc3339();
    }
}

fn apply_releases(entity: &mut RepositoryEntity, releases: Vec<Release>, limit: u32) {
    let show_beta = entity.data.show_beta;
    let mut releases: Vec<Release> = releases
        .into_iter()
        .filter(|r| !r.draft && (show_beta || !r.prerelease))
        .collect();
    releases.truncate(usize::try_from(limit).unwrap_or(usize::MAX));

    entity.data.releases = !releases.is_empty();
    entity.releases.last_release = releases.first().map(|r| r.tag_name.clone());
    entity.releases.last_release_object_downloads =
        releases.first().map_or(0, Release::download_count);
    entity.releases.objects = releases;
}

/// Ref content is read from.
fn select_ref(entity: &RepositoryEntity) -> String {
    let default_branch = entity.data.default_branch.as_deref().unwrap_or("main");
    if let Some(tag) = &entity.data.selected_tag {
        if tag != default_branch {
            return format!("tags/{tag}");
        }
        return default_branch.to_string();
    }
    if let Some(release) = &entity.releases.last_release {
        return format!("tags/{release}");
    }
    default_branch.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RemoteLocation;
    use crate::ports::{MockRemoteClientPort, RemoteError};
    use crate::testing::{FakeRemote, FakeRepository, TestHarness};
    use serde_json::json;
    use std::sync::Arc;

    fn widget() -> FakeRepository {
        FakeRepository::new("101", "owner/widget")
            .with_manifest(&json!({"name": "Widget"}))
            .with_file("dist/widget.js", "console.log(1)")
            .with_release("1.0.0", "widget.js")
    }

    #[tokio::test]
    async fn test_validate_plugin() {
        let harness = TestHarness::new();
        harness.remote.add(widget());
        let service = harness.core().repositories().clone();

        let mut entity = RepositoryEntity::new("owner/widget", Category::Plugin);
        assert!(service.validate_repository(&mut entity).await.unwrap());

        assert_eq!(entity.id(), Some("101"));
        assert_eq!(entity.manifest.name.as_deref(), Some("Widget"));
        assert_eq!(entity.content.remote, Some(RemoteLocation::path("dist")));
        assert_eq!(entity.releases.last_release.as_deref(), Some("1.0.0"));
        assert_eq!(entity.git_ref.as_deref(), Some("tags/1.0.0"));
        assert_eq!(entity.data.last_commit.as_deref(), Some("0123456"));
    }

    #[tokio::test]
    async fn test_validate_collects_errors() {
        let harness = TestHarness::new();
        let mut archived = FakeRepository::new("5", "owner/old");
        archived.info.archived = true;
        harness.remote.add(archived);
        harness
            .remote
            .add(FakeRepository::new("6", "owner/empty").with_file("README.md", "hi"));
        let service = harness.core().repositories().clone();

        let mut missing = RepositoryEntity::new("owner/missing", Category::Plugin);
        assert!(!service.validate_repository(&mut missing).await.unwrap());
        assert_eq!(missing.validate.errors(), ["Repository does not exist."]);

        let mut old = RepositoryEntity::new("owner/old", Category::Plugin);
        assert!(!service.validate_repository(&mut old).await.unwrap());
        assert_eq!(old.validate.errors(), ["Repository is archived."]);
        assert!(harness.core().state().common().archived_repositories.contains(&"owner/old".to_string()));

        let mut empty = RepositoryEntity::new("owner/empty", Category::Plugin);
        assert!(!service.validate_repository(&mut empty).await.unwrap());
        assert_eq!(
            empty.validate.errors(),
            ["owner/empty Repository structure for main is not compliant"]
        );

        // Errors are derived fresh on every pass.
        harness.remote.add(
            FakeRepository::new("6", "owner/empty").with_file("empty.js", "x"),
        );
        assert!(service.validate_repository(&mut empty).await.unwrap());
        assert!(empty.validate.errors().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_manifest_is_a_validation_error() {
        let harness = TestHarness::new();
        harness.remote.add(
            FakeRepository::new("7", "owner/widget")
                .with_file(MANIFEST_FILE, "not json")
                .with_file("widget.js", "x"),
        );
        let service = harness.core().repositories().clone();

        let mut entity = RepositoryEntity::new("owner/widget", Category::Plugin);
        assert!(!service.validate_repository(&mut entity).await.unwrap());
        assert!(entity.validate.errors()[0].contains("hacs.json is invalid"));
    }

    #[tokio::test]
    async fn test_integration_domain_from_manifest() {
        let harness = TestHarness::new();
        harness.remote.add(
            FakeRepository::new("8", "owner/weather")
                .with_manifest(&json!({"name": "Weather"}))
                .with_file(
                    "custom_components/weather/manifest.json",
                    json!({"domain": "weather_plus"}).to_string(),
                )
                .with_file("custom_components/weather/sensor.py", ""),
        );
        let service = harness.core().repositories().clone();

        let mut entity = RepositoryEntity::new("owner/weather", Category::Integration);
        assert!(service.validate_repository(&mut entity).await.unwrap());
        assert_eq!(entity.data.domain.as_deref(), Some("weather_plus"));
    }

    #[tokio::test]
    async fn test_transport_errors_propagate() {
        let mut remote = MockRemoteClientPort::new();
        remote
            .expect_get_repository()
            .returning(|_| Err(RemoteError::RateLimited));
        let harness = TestHarness::with_remote(Arc::new(remote));
        let service = harness.core().repositories().clone();

        let mut entity = RepositoryEntity::new("owner/widget", Category::Plugin);
        let err = service.validate_repository(&mut entity).await.unwrap_err();
        assert_eq!(err, RemoteError::RateLimited);
    }

    #[tokio::test]
    async fn test_prereleases_and_release_limit() {
        let harness = TestHarness::new();
        let mut repository = widget();
        for tag in ["2.0.0b1", "0.9.0", "0.8.0", "0.7.0", "0.6.0", "0.5.0"] {
            repository = repository.with_release(tag, "widget.js");
        }
        repository.releases.insert(0, repository.releases[1].clone());
        repository.releases[0].tag_name = "3.0.0".into();
        repository.releases[0].draft = true;
        repository.releases[2].prerelease = true;
        harness.remote.add(repository);
        let service = harness.core().repositories().clone();

        let mut entity = RepositoryEntity::new("owner/widget", Category::Plugin);
        service.validate_repository(&mut entity).await.unwrap();
        assert_eq!(
            entity.releases.published_tags(),
            ["1.0.0", "0.9.0", "0.8.0", "0.7.0", "0.6.0"]
        );

        entity.data.show_beta = true;
        service.validate_repository(&mut entity).await.unwrap();
        assert_eq!(entity.releases.published_tags()[1], "2.0.0b1");
    }

    #[tokio::test]
    async fn test_update_skips_unchanged_etag() {
        let harness = TestHarness::new();
        harness.remote.add(widget());
        let core = harness.core();
        let handle = core
            .repositories()
            .register_repository("owner/widget", Category::Plugin, false, None)
            .await
            .unwrap();

        let service = core.repositories();
        assert_eq!(
            service.update_repository(&handle, false, false).await.unwrap(),
            UpdateOutcome::Updated
        );
        assert_eq!(handle.lock().await.data.etag_repository.as_deref(), Some("etag-101"));
        assert!(core.registry().get_by_id("101").is_some());

        assert_eq!(
            service.update_repository(&handle, false, false).await.unwrap(),
            UpdateOutcome::Skipped
        );
        assert_eq!(
            service.update_repository(&handle, false, true).await.unwrap(),
            UpdateOutcome::Updated
        );
    }

    #[tokio::test]
    async fn test_update_precheck_respects_disabled_and_quota() {
        let harness = TestHarness::new();
        harness.remote.add(widget());
        let core = harness.core();
        let handle = core
            .repositories()
            .register_repository("owner/widget", Category::Plugin, false, None)
            .await
            .unwrap();

        core.state().disable(crate::domain::DisabledReason::RateLimit);
        let outcome = core.repositories().update_repository(&handle, false, false).await;
        assert_eq!(outcome, Ok(UpdateOutcome::Skipped));
        core.state().enable();

        core.gate().set_remaining(900);
        let outcome = core.repositories().update_repository(&handle, false, false).await;
        assert_eq!(outcome, Ok(UpdateOutcome::Skipped));
        assert_eq!(harness.remote.calls(), 0);
    }

    #[tokio::test]
    async fn test_update_dispatches_for_installed() {
        let harness = TestHarness::new();
        harness.remote.add(widget());
        let core = harness.core();
        let handle = core
            .repositories()
            .register_repository("owner/widget", Category::Plugin, false, Some("101".into()))
            .await
            .unwrap();
        handle.lock().await.set_installed(Some("0.9.0".into()), None);
        harness.events.clear();

        core.repositories()
            .update_repository(&handle, false, true)
            .await
            .unwrap();

        assert_eq!(
            harness.events.events(),
            vec![AppEvent::repository(
                RepositoryAction::Update,
                "owner/widget",
                Some("101".into())
            )]
        );
        assert!(handle.lock().await.pending_update());
    }

    #[tokio::test]
    async fn test_register_repository() {
        let harness = TestHarness::new();
        harness.remote.add(widget());
        let core = harness.core();
        let service = core.repositories();

        let handle = service
            .register_repository("owner/widget", Category::Plugin, true, None)
            .await
            .unwrap();
        assert_eq!(handle.lock().await.id(), Some("101"));
        assert!(core.registry().get_by_id("101").is_some());
        assert_eq!(
            harness.events.events(),
            vec![AppEvent::repository(
                RepositoryAction::Registration,
                "owner/widget",
                Some("101".into())
            )]
        );

        let err = service
            .register_repository("OWNER/widget", Category::Plugin, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Registry(RegistryError::AlreadyRegistered(_))));

        let err = service
            .register_repository("owner/missing", Category::Plugin, true, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
        assert!(!core.registry().is_registered("owner/missing"));
    }

    #[tokio::test]
    async fn test_register_follows_renames_and_ignores() {
        let harness = TestHarness::new();
        let core = harness.core();
        let mut common = core.state().common();
        common
            .renamed_repositories
            .insert("owner/old-name".into(), "owner/new-name".into());
        common.ignored_repositories.push("owner/blocked".into());
        core.state().set_common(common);

        let handle = core
            .repositories()
            .register_repository("owner/old-name", Category::Theme, false, None)
            .await
            .unwrap();
        assert_eq!(handle.lock().await.full_name(), "owner/new-name");

        let err = core
            .repositories()
            .register_repository("owner/blocked", Category::Theme, false, None)
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_remote_fake_counts_calls() {
        let remote = FakeRemote::new();
        remote.add(widget());
        let harness = TestHarness::with_remote(Arc::new(remote.clone()));
        let mut entity = RepositoryEntity::new("owner/widget", Category::Plugin);
        harness
            .core()
            .repositories()
            .validate_repository(&mut entity)
            .await
            .unwrap();
        assert!(remote.calls() >= 4);
    }
}
