//! Persisted projection of a repository entity.
//!
//! Fields equal to their documented default are omitted on write and
//! assumed on read, which keeps the `repositories` document small and
//! diffable. Reading is lenient about the shapes older writers produced.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::{Category, Manifest, RepositoryEntity};

/// One entry of the `repositories` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub full_name: String,
    pub category: Category,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    /// Downloads of the latest release.
    #[serde(default, skip_serializing_if = "is_zero")]
    pub downloads: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag_repository: Option<String>,
    #[serde(
        default,
        deserialize_with = "string_or_number",
        skip_serializing_if = "String::is_empty"
    )]
    pub last_updated: String,
    #[serde(default = "default_true", skip_serializing_if = "is_true")]
    pub new: bool,
    #[serde(default, skip_serializing_if = "is_zero")]
    pub stargazers_count: u64,
    /// Older name of `stargazers_count`, read only.
    #[serde(default, skip_serializing)]
    pub stars: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    #[serde(default, deserialize_with = "lenient_manifest")]
    pub repository_manifest: Manifest,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub hide: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub installed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installed_commit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_release_tag: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub releases: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_tag: Option<String>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub show_beta: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_installed: Option<String>,
    /// Epoch seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_fetched: Option<f64>,
}

impl RepositoryRecord {
    /// Project an entity.
    pub fn from_entity(entity: &RepositoryEntity) -> Self {
        let data = &entity.data;
        Self {
            full_name: data.full_name.clone(),
            category: entity.category(),
            authors: data.authors.clone(),
            description: data.description.clone(),
            downloads: entity.releases.last_release_object_downloads,
            etag_repository: data.etag_repository.clone(),
            last_updated: data.last_updated.clone(),
            new: data.new,
            stargazers_count: data.stargazers_count,
            stars: None,
            topics: data.topics.clone(),
            repository_manifest: entity.manifest.clone(),
            domain: data.domain.clone(),
            hide: data.hide,
            installed: data.installed,
            last_commit: data.last_commit.clone(),
            installed_commit: data.installed_commit.clone(),
            last_release_tag: entity.releases.last_release.clone(),
            releases: data.releases,
            selected_tag: data.selected_tag.clone(),
            show_beta: data.show_beta,
            version_installed: data.installed_version.clone(),
            last_fetched: data.last_fetched.map(to_epoch_seconds),
        }
    }

    /// Copy every persisted field into `entity`.
    pub fn apply_to(&self, entity: &mut RepositoryEntity) {
        let data = &mut entity.data;
        data.authors.clone_from(&self.authors);
        data.description.clone_from(&self.description);
        data.last_updated.clone_from(&self.last_updated);
        data.etag_repository.clone_from(&self.etag_repository);
        data.topics.clone_from(&self.topics);
        data.domain.clone_from(&self.domain);
        data.stargazers_count = if self.stargazers_count > 0 {
            self.stargazers_count
        } else {
            self.stars.unwrap_or(0)
        };
        data.releases = self.releases;
        data.hide = self.hide;
        data.installed = self.installed;
        data.new = self.new;
        data.selected_tag.clone_from(&self.selected_tag);
        data.show_beta = self.show_beta;
        data.last_commit.clone_from(&self.last_commit);
        data.installed_version.clone_from(&self.version_installed);
        data.installed_commit.clone_from(&self.installed_commit);
        data.last_fetched = self.last_fetched.and_then(from_epoch_seconds);

        entity.releases.last_release_object_downloads = self.downloads;
        entity
            .releases
            .last_release
            .clone_from(&self.last_release_tag);
        entity.manifest = self.repository_manifest.clone();
    }
}

#[allow(clippy::cast_precision_loss)]
fn to_epoch_seconds(instant: DateTime<Utc>) -> f64 {
    instant.timestamp_millis() as f64 / 1000.0
}

#[allow(clippy::cast_possible_truncation)]
fn from_epoch_seconds(seconds: f64) -> Option<DateTime<Utc>> {
    if !seconds.is_finite() {
        return None;
    }
    DateTime::from_timestamp_millis((seconds * 1000.0).round() as i64)
}

const fn is_zero(value: &u64) -> bool {
    *value == 0
}

const fn is_true(value: &bool) -> bool {
    *value
}

const fn is_false(value: &bool) -> bool {
    !*value
}

const fn default_true() -> bool {
    true
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) if n.as_f64() == Some(0.0) => String::new(),
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

fn lenient_manifest<'de, D>(deserializer: D) -> Result<Manifest, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(Manifest::from_value(&value).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults_omitted_on_write() {
        let entity = RepositoryEntity::new("owner/widget", Category::Plugin);
        let value = serde_json::to_value(RepositoryRecord::from_entity(&entity)).unwrap();
        assert_eq!(
            value,
            json!({
                "full_name": "owner/widget",
                "category": "plugin",
                "repository_manifest": {
                    "content_in_root": false,
                    "zip_release": false,
                    "hide_default_branch": false,
                    "render_readme": false
                }
            })
        );
    }

    #[test]
    fn test_defaults_assumed_on_read() {
        let record: RepositoryRecord =
            serde_json::from_value(json!({"full_name": "owner/x", "category": "theme"})).unwrap();
        assert!(record.new);
        assert!(!record.installed);
        assert_eq!(record.downloads, 0);
        assert_eq!(record.repository_manifest, Manifest::default());
    }

    #[test]
    fn test_lenient_legacy_shapes() {
        let record: RepositoryRecord = serde_json::from_value(json!({
            "full_name": "owner/x",
            "category": "lovelace",
            "last_updated": 0,
            "stars": 12,
            "repository_manifest": "broken",
            "some_future_field": [1, 2, 3]
        }))
        .unwrap();

        assert_eq!(record.category, Category::Plugin);
        assert_eq!(record.last_updated, "");
        assert_eq!(record.repository_manifest, Manifest::default());

        let mut entity = RepositoryEntity::new("owner/x", Category::Plugin);
        record.apply_to(&mut entity);
        assert_eq!(entity.data.stargazers_count, 12);
    }

    #[test]
    fn test_installed_entity_round_trip() {
        let mut entity = RepositoryEntity::new("owner/weather", Category::Integration);
        entity.data.id = Some("99".into());
        entity.data.description = "Weather".into();
        entity.data.domain = Some("weather".into());
        entity.data.releases = true;
        entity.data.last_fetched = DateTime::from_timestamp(1_700_000_000, 0);
        entity.releases.last_release = Some("2.0.0".into());
        entity.releases.last_release_object_downloads = 40;
        entity.set_installed(Some("1.0.0".into()), None);

        let record = RepositoryRecord::from_entity(&entity);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["version_installed"], "1.0.0");
        assert_eq!(value["installed"], true);
        assert_eq!(value["last_fetched"], 1_700_000_000.0);
        assert_eq!(value["downloads"], 40);

        let parsed: RepositoryRecord = serde_json::from_value(value).unwrap();
        let mut restored = RepositoryEntity::new("owner/weather", Category::Integration);
        parsed.apply_to(&mut restored);

        assert_eq!(restored.data.installed_version.as_deref(), Some("1.0.0"));
        assert_eq!(restored.data.last_fetched, entity.data.last_fetched);
        assert_eq!(restored.releases.last_release.as_deref(), Some("2.0.0"));
        assert!(!restored.data.new);
        assert!(restored.install_state_consistent());
    }
}
