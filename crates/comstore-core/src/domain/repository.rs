//! Repository entity.
//!
//! One entity per tracked package. Persisted data lives in
//! [`RepositoryData`]; everything else is rebuilt on each reconciliation
//! pass and never written to the store.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use super::content::{RemoteLocation, ResolvedContent};
use super::{Category, Manifest, Release, TreeEntry};
use crate::config::Configuration;

/// Full name of the tool's own integration repository.
pub const SELF_REPOSITORY: &str = "hacs/integration";

/// Persisted repository fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryData {
    /// Stable id, absent until the first successful registration.
    pub id: Option<String>,
    pub full_name: String,
    pub description: String,
    pub authors: Vec<String>,
    pub topics: Vec<String>,
    /// Integration domain.
    pub domain: Option<String>,
    pub stargazers_count: u64,
    pub etag_repository: Option<String>,
    /// Remote push timestamp, as reported.
    pub last_updated: String,
    pub last_commit: Option<String>,
    pub installed_commit: Option<String>,
    pub installed_version: Option<String>,
    /// User pinned version.
    pub selected_tag: Option<String>,
    pub show_beta: bool,
    pub hide: bool,
    pub installed: bool,
    pub new: bool,
    pub archived: bool,
    /// Whether the repository publishes releases.
    pub releases: bool,
    pub default_branch: Option<String>,
    /// Installable file name, for single-file categories.
    pub file_name: Option<String>,
    pub last_fetched: Option<DateTime<Utc>>,
}

impl RepositoryData {
    fn new(full_name: &str) -> Self {
        Self {
            id: None,
            full_name: full_name.to_string(),
            description: String::new(),
            authors: Vec::new(),
            topics: Vec::new(),
            domain: None,
            stargazers_count: 0,
            etag_repository: None,
            last_updated: String::new(),
            last_commit: None,
            installed_commit: None,
            installed_version: None,
            selected_tag: None,
            show_beta: false,
            hide: false,
            installed: false,
            new: true,
            archived: false,
            releases: false,
            default_branch: None,
            file_name: None,
            last_fetched: None,
        }
    }
}

/// Release information gathered during the last pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReleasesState {
    /// Latest usable release tag.
    pub last_release: Option<String>,
    pub last_release_object_downloads: u64,
    /// Releases newest first, limited to the configured release limit.
    pub objects: Vec<Release>,
}

impl ReleasesState {
    pub fn published_tags(&self) -> Vec<&str> {
        self.objects.iter().map(|r| r.tag_name.as_str()).collect()
    }

    /// The release object behind [`Self::last_release`].
    pub fn last_release_object(&self) -> Option<&Release> {
        let tag = self.last_release.as_deref()?;
        self.objects.iter().find(|r| r.tag_name == tag)
    }
}

/// Local and remote content locations.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContentState {
    /// Active local install path. Only set when it exists and is safe.
    pub local: Option<PathBuf>,
    /// Resolved remote location. `None` means unresolved.
    pub remote: Option<RemoteLocation>,
    /// Only the single resolved file is installed.
    pub single: bool,
}

/// Errors found by the last validate pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    errors: Vec<String>,
}

impl ValidationResult {
    pub fn success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    pub fn push(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Drop every error from the previous pass.
    pub fn reset(&mut self) {
        self.errors.clear();
    }
}

/// One tracked package.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEntity {
    category: Category,
    pub data: RepositoryData,
    pub manifest: Manifest,
    pub releases: ReleasesState,
    pub content: ContentState,
    pub validate: ValidationResult,
    pub tree: Vec<TreeEntry>,
    /// Ref content is read from, for example `tags/1.2.0` or `main`.
    pub git_ref: Option<String>,
    pub first_install: bool,
    pub pending_restart: bool,
}

impl RepositoryEntity {
    pub fn new(full_name: impl AsRef<str>, category: Category) -> Self {
        Self {
            category,
            data: RepositoryData::new(full_name.as_ref()),
            manifest: Manifest::default(),
            releases: ReleasesState::default(),
            content: ContentState::default(),
            validate: ValidationResult::default(),
            tree: Vec::new(),
            git_ref: None,
            first_install: true,
            pending_restart: false,
        }
    }

    pub const fn category(&self) -> Category {
        self.category
    }

    pub fn id(&self) -> Option<&str> {
        self.data.id.as_deref()
    }

    pub fn full_name(&self) -> &str {
        &self.data.full_name
    }

    /// Repository part of the full name.
    pub fn name(&self) -> &str {
        self.data
            .full_name
            .rsplit('/')
            .next()
            .unwrap_or(&self.data.full_name)
    }

    /// Log prefix, `<category/owner/repo>`.
    pub fn string(&self) -> String {
        format!("<{}/{}>", self.category, self.data.full_name)
    }

    pub fn is_self(&self) -> bool {
        self.data.full_name.eq_ignore_ascii_case(SELF_REPOSITORY)
    }

    /// Display form of the ref without the `tags/` prefix.
    pub fn ref_display(&self) -> &str {
        self.git_ref
            .as_deref()
            .map_or("", |r| r.strip_prefix("tags/").unwrap_or(r))
    }

    /// Mark installed. At least one of `version` or `commit` must be set.
    pub fn set_installed(&mut self, version: Option<String>, commit: Option<String>) -> bool {
        if version.is_none() && commit.is_none() {
            return false;
        }
        self.data.installed = true;
        self.data.installed_version = version;
        self.data.installed_commit = commit;
        self.data.new = false;
        self.first_install = false;
        true
    }

    pub fn clear_installed(&mut self) {
        self.data.installed = false;
        self.data.installed_version = None;
        self.data.installed_commit = None;
        self.content.local = None;
        self.pending_restart = false;
    }

    /// `installed` implies a version or a commit.
    pub const fn install_state_consistent(&self) -> bool {
        !self.data.installed
            || self.data.installed_version.is_some()
            || self.data.installed_commit.is_some()
    }

    /// Apply a content resolution result.
    pub fn apply_resolution(&mut self, resolved: Option<ResolvedContent>) {
        match resolved {
            Some(resolved) => {
                self.content.remote = Some(resolved.location);
                self.content.single = resolved.single;
                if resolved.file_name.is_some() {
                    self.data.file_name = resolved.file_name;
                }
                if resolved.domain.is_some() {
                    self.data.domain = resolved.domain;
                }
            }
            None => {
                self.content.remote = None;
                self.content.single = false;
            }
        }
    }

    /// Where this entity's content is installed under `config`.
    ///
    /// Integrations need a known domain.
    pub fn local_path(&self, config: &Configuration) -> Option<PathBuf> {
        let base = self.category.install_dir(config);
        match self.category {
            Category::Integration => self.data.domain.as_ref().map(|d| base.join(d)),
            Category::PythonScript | Category::Template | Category::Theme => Some(base),
            Category::Plugin | Category::AppDaemon | Category::NetDaemon => {
                Some(base.join(self.name()))
            }
        }
    }

    /// Whether the resolved local path is an existing directory or file.
    pub fn local_content_exists(&self, config: &Configuration) -> bool {
        self.local_path(config).as_deref().is_some_and(Path::exists)
    }

    /// Version the user gets when updating.
    pub fn display_available_version(&self) -> Option<&str> {
        if let Some(tag) = &self.data.selected_tag {
            return Some(tag.as_str());
        }
        if self.data.releases {
            return self.releases.last_release.as_deref();
        }
        self.data.last_commit.as_deref()
    }

    pub fn display_installed_version(&self) -> Option<&str> {
        self.data
            .installed_version
            .as_deref()
            .or(self.data.installed_commit.as_deref())
    }

    /// Derived: installed and behind the available version.
    pub fn pending_update(&self) -> bool {
        if !self.data.installed {
            return false;
        }
        if self.data.releases || self.data.selected_tag.is_some() {
            return match (
                self.data.installed_version.as_deref(),
                self.display_available_version(),
            ) {
                (Some(installed), Some(available)) => installed != available,
                (None, Some(_)) => true,
                _ => false,
            };
        }
        match (&self.data.installed_commit, &self.data.last_commit) {
            (Some(installed), Some(last)) => installed != last,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_entity_defaults() {
        let entity = RepositoryEntity::new("owner/lovelace-widget", Category::Plugin);
        assert_eq!(entity.id(), None);
        assert_eq!(entity.name(), "lovelace-widget");
        assert_eq!(entity.string(), "<plugin/owner/lovelace-widget>");
        assert!(entity.data.new);
        assert!(entity.validate.success());
        assert!(entity.install_state_consistent());
    }

    #[test]
    fn test_set_installed_requires_version_or_commit() {
        let mut entity = RepositoryEntity::new("owner/x", Category::Theme);
        assert!(!entity.set_installed(None, None));
        assert!(!entity.data.installed);

        assert!(entity.set_installed(None, Some("abc1234".into())));
        assert!(entity.data.installed);
        assert!(!entity.data.new);
        assert!(entity.install_state_consistent());

        entity.clear_installed();
        assert!(!entity.data.installed);
        assert_eq!(entity.display_installed_version(), None);
    }

    #[test]
    fn test_validation_reset() {
        let mut validation = ValidationResult::default();
        validation.push("broken");
        assert!(!validation.success());
        validation.reset();
        assert!(validation.success());
        assert!(validation.errors().is_empty());
    }

    #[test]
    fn test_pending_update_by_release() {
        let mut entity = RepositoryEntity::new("owner/x", Category::Plugin);
        entity.data.releases = true;
        entity.releases.last_release = Some("2.0.0".into());
        assert!(!entity.pending_update());

        entity.set_installed(Some("1.0.0".into()), None);
        assert!(entity.pending_update());

        entity.data.installed_version = Some("2.0.0".into());
        assert!(!entity.pending_update());

        entity.data.selected_tag = Some("1.5.0".into());
        assert!(entity.pending_update());
    }

    #[test]
    fn test_pending_update_by_commit() {
        let mut entity = RepositoryEntity::new("owner/x", Category::PythonScript);
        entity.data.last_commit = Some("bbbbbbb".into());
        entity.set_installed(None, Some("aaaaaaa".into()));
        assert!(entity.pending_update());

        entity.data.installed_commit = Some("bbbbbbb".into());
        assert!(!entity.pending_update());
    }

    #[test]
    fn test_self_detection_is_case_insensitive() {
        assert!(RepositoryEntity::new("HACS/Integration", Category::Integration).is_self());
        assert!(!RepositoryEntity::new("hacs/frontend", Category::Plugin).is_self());
    }

    #[test]
    fn test_local_path() {
        let config = Configuration::with_root("/config");
        let plugin = RepositoryEntity::new("owner/widget", Category::Plugin);
        assert_eq!(
            plugin.local_path(&config),
            Some(PathBuf::from("/config/www/community/widget"))
        );

        let mut integration = RepositoryEntity::new("owner/weather", Category::Integration);
        assert_eq!(integration.local_path(&config), None);
        integration.data.domain = Some("weather_plus".into());
        assert_eq!(
            integration.local_path(&config),
            Some(PathBuf::from("/config/custom_components/weather_plus"))
        );
    }

    #[test]
    fn test_apply_resolution() {
        let mut entity = RepositoryEntity::new("owner/widget", Category::Plugin);
        entity.apply_resolution(Some(ResolvedContent {
            location: RemoteLocation::Release,
            file_name: Some("widget.js".into()),
            domain: None,
            single: true,
        }));
        assert_eq!(entity.content.remote, Some(RemoteLocation::Release));
        assert!(entity.content.single);
        assert_eq!(entity.data.file_name.as_deref(), Some("widget.js"));

        entity.apply_resolution(None);
        assert_eq!(entity.content.remote, None);
    }
}
