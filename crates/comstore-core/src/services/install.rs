//! Install and uninstall.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use super::RepositoryService;
use crate::domain::{RemoteLocation, RepositoryEntity};
use crate::events::{AppEvent, RepositoryAction};
use crate::ports::{ContentError, CoreError};
use crate::registry::SharedEntity;

/// Result of [`RepositoryService::install_repository`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Content was written. Carries the installed version or commit.
    Installed(String),
    /// The requested version is already installed.
    AlreadyInstalled,
}

impl RepositoryService {
    /// Install `version`, or the available version when `None`.
    ///
    /// Installing the version that is already installed does nothing.
    pub async fn install_repository(
        &self,
        handle: &SharedEntity,
        version: Option<&str>,
    ) -> Result<InstallOutcome, CoreError> {
        if let Some(reason) = self.ctx.state.disabled_reason() {
            return Err(CoreError::Disabled(reason));
        }

        let mut entity = handle.lock().await;
        if let Some(version) = version {
            if entity.data.installed && entity.data.installed_version.as_deref() == Some(version) {
                return Ok(InstallOutcome::AlreadyInstalled);
            }
            if entity.releases.last_release.as_deref() == Some(version) {
                entity.data.selected_tag = None;
            } else {
                entity.data.selected_tag = Some(version.to_string());
            }
        } else if entity.data.installed && !entity.pending_update() {
            return Ok(InstallOutcome::AlreadyInstalled);
        }

        let valid = self
            .ctx
            .gate
            .run(self.validate_repository(&mut entity))
            .await?;
        if !valid {
            return Err(CoreError::Validation(entity.validate.errors().join(", ")));
        }
        if entity.manifest.zip_release {
            return Err(CoreError::Validation(format!(
                "{} Zip release content cannot be installed",
                entity.string()
            )));
        }

        let local = entity.local_path(&self.ctx.config).ok_or_else(|| {
            CoreError::Validation(format!("{} Local path is unknown", entity.string()))
        })?;
        if !self.ctx.is_safe_path(&local) {
            return Err(ContentError::UnsafePath(local).into());
        }

        let files = self.fetch_files(&entity, &local).await?;
        if !entity.content.single && !entity.first_install {
            self.ctx.ports.content.remove(&local).await?;
        }
        for (target, bytes) in &files {
            self.ctx.ports.content.write_file(target, bytes).await?;
        }

        let installed = mark_installed(&mut entity, local);
        info!(
            repository = %entity.string(),
            version = %installed,
            files = files.len(),
            "Repository installed"
        );
        self.ctx.emit(AppEvent::repository(
            RepositoryAction::Install,
            entity.full_name(),
            entity.data.id.clone(),
        ));

        let full_name = entity.full_name().to_string();
        let id = entity.data.id.clone();
        drop(entity);
        self.sync_id(&full_name, id.as_deref()).await;
        Ok(InstallOutcome::Installed(installed))
    }

    /// Remove installed content and reset install state.
    pub async fn uninstall_repository(&self, handle: &SharedEntity) -> Result<(), CoreError> {
        let mut entity = handle.lock().await;
        if entity.is_self() {
            return Err(CoreError::Validation(format!(
                "{} cannot be uninstalled",
                entity.string()
            )));
        }
        if !entity.data.installed {
            return Ok(());
        }

        let local = entity
            .content
            .local
            .clone()
            .or_else(|| entity.local_path(&self.ctx.config));
        if let Some(local) = local {
            if !self.ctx.is_safe_path(&local) {
                return Err(ContentError::UnsafePath(local).into());
            }
            let target = match (&entity.data.file_name, entity.content.single) {
                (Some(file), true) => local.join(file),
                _ => local,
            };
            self.ctx.ports.content.remove(&target).await?;
        }

        entity.clear_installed();
        entity.data.selected_tag = None;
        info!(repository = %entity.string(), "Repository uninstalled");
        self.ctx.emit(AppEvent::repository(
            RepositoryAction::Uninstall,
            entity.full_name(),
            entity.data.id.clone(),
        ));
        Ok(())
    }

    /// Download every file to install, paired with its local target.
    async fn fetch_files(
        &self,
        entity: &RepositoryEntity,
        local: &Path,
    ) -> Result<Vec<(PathBuf, Vec<u8>)>, CoreError> {
        let remote = &self.ctx.ports.remote;
        let git_ref = entity.git_ref.as_deref().unwrap_or("main");
        let location = entity.content.remote.as_ref().ok_or_else(|| {
            CoreError::Validation(format!("{} Remote content is unresolved", entity.string()))
        })?;

        let mut files = Vec::new();
        match location {
            RemoteLocation::Release => {
                let file_name = entity.data.file_name.as_deref().unwrap_or_default();
                let asset = entity
                    .releases
                    .objects
                    .first()
                    .and_then(|r| r.assets.iter().find(|a| a.name == file_name))
                    .ok_or_else(|| {
                        CoreError::Validation(format!(
                            "{} Release asset {file_name} not found",
                            entity.string()
                        ))
                    })?;
                let bytes = self
                    .ctx
                    .gate
                    .run(remote.download(&asset.download_url))
                    .await?;
                files.push((self.target(local, file_name)?, bytes));
            }
            RemoteLocation::Path(_) if entity.content.single => {
                let file_name = entity.data.file_name.as_deref().unwrap_or_default();
                let path = location.join(file_name).unwrap_or_default();
                let bytes = self
                    .ctx
                    .gate
                    .run(remote.get_contents(entity.full_name(), &path, git_ref))
                    .await?;
                files.push((self.target(local, file_name)?, bytes));
            }
            RemoteLocation::Path(dir) => {
                let prefix = if dir.is_empty() {
                    String::new()
                } else {
                    format!("{dir}/")
                };
                for entry in entity.tree.iter().filter(|e| !e.is_directory) {
                    let Some(relative) = entry.full_path.strip_prefix(&prefix) else {
                        continue;
                    };
                    let bytes = self
                        .ctx
                        .gate
                        .run(remote.get_contents(entity.full_name(), &entry.full_path, git_ref))
                        .await?;
                    files.push((self.target(local, relative)?, bytes));
                }
            }
        }
        debug!(repository = %entity.string(), files = files.len(), "Content fetched");
        Ok(files)
    }

    fn target(&self, local: &Path, relative: &str) -> Result<PathBuf, CoreError> {
        let target = local.join(relative);
        if relative.is_empty() || !self.ctx.is_safe_path(&target) {
            return Err(ContentError::UnsafePath(target).into());
        }
        Ok(target)
    }

}

fn mark_installed(entity: &mut RepositoryEntity, local: PathBuf) -> String {
    let tagged = entity.data.releases || entity.data.selected_tag.is_some();
    let (version, commit) = if tagged {
        (Some(entity.ref_display().to_string()), None)
    } else {
        (None, entity.data.last_commit.clone())
    };
    let installed = version
        .clone()
        .or_else(|| commit.clone())
        .unwrap_or_default();

    if !entity.set_installed(version, commit) {
        entity.set_installed(None, Some(String::from("unknown")));
    }
    entity.content.local = Some(local);
    if entity.category().requires_restart() {
        entity.pending_restart = true;
    }
    installed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Category;
    use crate::testing::{FakeRepository, TestHarness, asset_url};
    use serde_json::json;

    #[tokio::test]
    async fn test_install_release_asset() {
        let harness = TestHarness::new();
        harness.remote.add(
            FakeRepository::new("1", "owner/widget")
                .with_manifest(&json!({"name": "Widget"}))
                .with_release("1.2.0", "widget.js"),
        );
        harness
            .remote
            .add_download(&asset_url("owner/widget", "1.2.0", "widget.js"), "bundle");
        let core = harness.core();
        let handle = core
            .repositories()
            .register_repository("owner/widget", Category::Plugin, false, None)
            .await
            .unwrap();

        let outcome = core.repositories().install_repository(&handle, None).await.unwrap();
        assert_eq!(outcome, InstallOutcome::Installed("1.2.0".into()));
        assert_eq!(
            harness.content.file("/config/www/community/widget/widget.js"),
            Some(b"bundle".to_vec())
        );

        let entity = handle.lock().await;
        assert!(entity.data.installed);
        assert!(!entity.data.new);
        assert_eq!(entity.data.installed_version.as_deref(), Some("1.2.0"));
        assert!(!entity.pending_update());
        drop(entity);

        assert!(harness.events.events().contains(&AppEvent::repository(
            RepositoryAction::Install,
            "owner/widget",
            Some("1".into())
        )));

        let again = core.repositories().install_repository(&handle, None).await.unwrap();
        assert_eq!(again, InstallOutcome::AlreadyInstalled);
        let again = core
            .repositories()
            .install_repository(&handle, Some("1.2.0"))
            .await
            .unwrap();
        assert_eq!(again, InstallOutcome::AlreadyInstalled);
    }

    #[tokio::test]
    async fn test_install_integration_directory() {
        let harness = TestHarness::new();
        harness.remote.add(
            FakeRepository::new("2", "owner/weather")
                .with_manifest(&json!({"name": "Weather"}))
                .with_file(
                    "custom_components/weather/manifest.json",
                    json!({"domain": "weather"}).to_string(),
                )
                .with_file("custom_components/weather/sensor.py", "print()")
                .with_file("custom_components/weather/translations/en.json", "{}")
                .with_file("README.md", "readme"),
        );
        let core = harness.core();
        let handle = core
            .repositories()
            .register_repository("owner/weather", Category::Integration, false, None)
            .await
            .unwrap();

        let outcome = core.repositories().install_repository(&handle, None).await.unwrap();
        assert_eq!(outcome, InstallOutcome::Installed("0123456".into()));

        assert_eq!(
            harness.content.paths(),
            vec![
                PathBuf::from("/config/custom_components/weather/manifest.json"),
                PathBuf::from("/config/custom_components/weather/sensor.py"),
                PathBuf::from("/config/custom_components/weather/translations/en.json"),
            ]
        );
        let entity = handle.lock().await;
        assert!(entity.pending_restart);
        assert_eq!(entity.data.installed_commit.as_deref(), Some("0123456"));
    }

    #[tokio::test]
    async fn test_install_refused_when_disabled() {
        let harness = TestHarness::new();
        let core = harness.core();
        let handle = core
            .repositories()
            .register_repository("owner/widget", Category::Plugin, false, None)
            .await
            .unwrap();
        core.state().disable(crate::domain::DisabledReason::Removed);

        let err = core.repositories().install_repository(&handle, None).await.unwrap_err();
        assert!(matches!(err, CoreError::Disabled(_)));
    }

    #[tokio::test]
    async fn test_uninstall() {
        let harness = TestHarness::new();
        harness.remote.add(
            FakeRepository::new("3", "owner/dark")
                .with_manifest(&json!({"name": "Dark"}))
                .with_file("themes/dark.yaml", "dark: {}"),
        );
        let core = harness.core();
        let handle = core
            .repositories()
            .register_repository("owner/dark", Category::Theme, false, None)
            .await
            .unwrap();
        core.repositories().install_repository(&handle, None).await.unwrap();
        assert!(harness.content.file("/config/themes/dark.yaml").is_some());

        core.repositories().uninstall_repository(&handle).await.unwrap();
        assert!(harness.content.paths().is_empty());
        assert!(!handle.lock().await.data.installed);
    }

    #[tokio::test]
    async fn test_self_cannot_be_uninstalled() {
        let harness = TestHarness::new();
        let core = harness.core();
        let handle = core
            .repositories()
            .register_repository(
                crate::domain::SELF_REPOSITORY,
                Category::Integration,
                false,
                None,
            )
            .await
            .unwrap();
        handle.lock().await.set_installed(Some("1.0.0".into()), None);

        let err = core.repositories().uninstall_repository(&handle).await.unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }
}
