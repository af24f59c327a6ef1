//! Repository manifest (`hacs.json`) model.
//!
//! The manifest is a small declarative descriptor that repository authors
//! place in the repository root. Every field has a default, unknown fields
//! are ignored, and a broken descriptor becomes a validation error on the
//! owning entity instead of a failure of the reconciliation pass.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;

use super::Category;

/// File name of the manifest in a repository root.
pub const MANIFEST_FILE: &str = "hacs.json";

/// Parsed repository manifest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    /// Display name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Explicit installable file name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,

    /// Content lives in the repository root instead of a category directory.
    pub content_in_root: bool,

    /// Content is shipped as a zip release asset named by `filename`.
    pub zip_release: bool,

    pub hide_default_branch: bool,

    /// Render the README as the info page.
    pub render_readme: bool,

    /// Countries the repository is offered in. Empty means everywhere.
    #[serde(deserialize_with = "string_or_list", skip_serializing_if = "Vec::is_empty")]
    pub country: Vec<String>,

    /// Minimum host platform version.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub homeassistant: Option<String>,

    /// Minimum version of this tool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hacs: Option<String>,

    /// Directory kept across upgrades.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub persistent_directory: Option<String>,
}

/// Manifest parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ManifestError {
    #[error("Manifest is not a JSON object")]
    NotAnObject,

    #[error("Invalid manifest: {0}")]
    Invalid(String),
}

impl Manifest {
    /// Parse a manifest from its JSON form.
    ///
    /// `null` yields the default manifest.
    pub fn from_value(value: &Value) -> Result<Self, ManifestError> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Object(_) => {
                Self::deserialize(value).map_err(|e| ManifestError::Invalid(e.to_string()))
            }
            _ => Err(ManifestError::NotAnObject),
        }
    }

    /// Parse a manifest from raw file content.
    pub fn from_slice(bytes: &[u8]) -> Result<Self, ManifestError> {
        let value: Value =
            serde_json::from_slice(bytes).map_err(|e| ManifestError::Invalid(e.to_string()))?;
        Self::from_value(&value)
    }

    /// JSON form of this manifest. Parsing it again yields an equal value.
    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Manifest fields that `category` needs but this manifest lacks.
    pub fn missing_fields(&self, category: Category) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.name.as_deref().is_none_or(str::is_empty) {
            missing.push("name");
        }
        if category == Category::Template && self.filename.is_none() {
            missing.push("filename");
        }
        if self.zip_release && self.filename.is_none() {
            missing.push("filename");
        }
        missing.dedup();
        missing
    }

    /// Whether the repository is offered in `country`.
    pub fn available_in(&self, country: &str) -> bool {
        country == crate::config::COUNTRY_ALL
            || self.country.is_empty()
            || self.country.iter().any(|c| c.eq_ignore_ascii_case(country))
    }
}

fn string_or_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
        Nothing(()),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(value) => vec![value.to_uppercase()],
        OneOrMany::Many(values) => values.into_iter().map(|v| v.to_uppercase()).collect(),
        OneOrMany::Nothing(()) => Vec::new(),
    })
}
