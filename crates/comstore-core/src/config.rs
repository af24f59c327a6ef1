//! Configuration domain types and validation.
//!
//! The host hands over two JSON maps: the stored config entry and the
//! user options. Options override config values key by key. The merged
//! result is validated once here and never re-checked by the engine.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::Category;

/// Default number of releases offered for version selection.
pub const DEFAULT_RELEASE_LIMIT: u32 = 5;

/// Country value meaning "no restriction".
pub const COUNTRY_ALL: &str = "ALL";

/// Runtime configuration for one running instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Configuration {
    /// Access token for the remote code host.
    pub token: Option<String>,

    /// Root of the host platform configuration directory.
    pub config_root: PathBuf,

    /// Track `AppDaemon` apps.
    pub appdaemon: bool,
    /// Install path for `AppDaemon` apps, relative to `config_root`.
    pub appdaemon_path: String,

    /// Track `NetDaemon` apps.
    pub netdaemon: bool,
    /// Install path for `NetDaemon` apps, relative to `config_root`.
    pub netdaemon_path: String,

    /// Track python scripts.
    pub python_script: bool,
    /// Install path for python scripts, relative to `config_root`.
    pub python_script_path: String,

    /// Track themes.
    pub theme: bool,
    /// Install path for themes, relative to `config_root`.
    pub theme_path: String,

    /// Install path for frontend plugins, relative to `config_root`.
    pub plugin_path: String,

    /// Install path for templates, relative to `config_root`.
    pub template_path: String,

    /// Enables experimental categories (templates).
    pub experimental: bool,

    /// Two letter country code or `ALL`.
    pub country: String,

    /// Number of releases to keep for version selection (1-100).
    pub release_limit: u32,

    pub sidepanel_title: String,
    pub sidepanel_icon: String,

    pub debug: bool,
    pub dev: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            token: None,
            config_root: PathBuf::from("."),
            appdaemon: false,
            appdaemon_path: "appdaemon/apps/".to_string(),
            netdaemon: false,
            netdaemon_path: "netdaemon/apps/".to_string(),
            python_script: false,
            python_script_path: "python_scripts/".to_string(),
            theme: false,
            theme_path: "themes/".to_string(),
            plugin_path: "www/community/".to_string(),
            template_path: "custom_templates/".to_string(),
            experimental: false,
            country: COUNTRY_ALL.to_string(),
            release_limit: DEFAULT_RELEASE_LIMIT,
            sidepanel_title: "Community".to_string(),
            sidepanel_icon: "mdi:alpha-c-box".to_string(),
            debug: false,
            dev: false,
        }
    }
}

impl Configuration {
    /// Default configuration rooted at `config_root`.
    pub fn with_root(config_root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: config_root.into(),
            ..Self::default()
        }
    }

    /// Build a configuration from the config entry and options maps.
    ///
    /// `options` may be `null` (no options saved yet). A boolean `options`
    /// value comes from a broken config entry and is rejected.
    pub fn from_maps(config: &Value, options: &Value) -> Result<Self, ConfigError> {
        let mut merged = Map::new();

        match config {
            Value::Object(map) => merged.extend(map.clone()),
            Value::Null => {}
            _ => return Err(ConfigError::InvalidConfig),
        }

        match options {
            Value::Object(map) => merged.extend(map.clone()),
            Value::Null => {}
            Value::Bool(_) => return Err(ConfigError::InvalidOptions),
            _ => return Err(ConfigError::InvalidConfig),
        }

        let configuration: Self = serde_json::from_value(Value::Object(merged))
            .map_err(|e| ConfigError::Parse(e.to_string()))?;
        validate_configuration(&configuration)?;
        Ok(configuration)
    }

    /// Categories that the engine tracks with this configuration.
    ///
    /// Integrations and plugins are always on.
    pub fn enabled_categories(&self) -> Vec<Category> {
        let mut categories = vec![Category::Integration, Category::Plugin];
        if self.appdaemon {
            categories.push(Category::AppDaemon);
        }
        if self.netdaemon {
            categories.push(Category::NetDaemon);
        }
        if self.python_script {
            categories.push(Category::PythonScript);
        }
        if self.theme {
            categories.push(Category::Theme);
        }
        if self.experimental {
            categories.push(Category::Template);
        }
        categories
    }

    /// Whether `category` is tracked.
    pub fn is_enabled(&self, category: Category) -> bool {
        self.enabled_categories().contains(&category)
    }

    /// Directory holding the persisted documents.
    pub fn storage_dir(&self) -> PathBuf {
        self.config_root.join(".storage")
    }
}

/// Configuration errors. These fail at load time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Configuration is not a JSON object")]
    InvalidConfig,

    #[error("Configuration options must be a map, got a boolean")]
    InvalidOptions,

    #[error("Could not parse configuration: {0}")]
    Parse(String),

    #[error("Release limit must be between 1 and 100, got {0}")]
    InvalidReleaseLimit(u32),

    #[error("Country must be ALL or a two letter code, got {0:?}")]
    InvalidCountry(String),

    #[error("Path for {field} must be relative to the configuration root: {value}")]
    InvalidPath {
        field: &'static str,
        value: String,
    },
}

/// Validate configuration values.
pub fn validate_configuration(config: &Configuration) -> Result<(), ConfigError> {
    if !(1..=100).contains(&config.release_limit) {
        return Err(ConfigError::InvalidReleaseLimit(config.release_limit));
    }

    let country = config.country.as_str();
    if country != COUNTRY_ALL
        && !(country.len() == 2 && country.chars().all(|c| c.is_ascii_uppercase()))
    {
        return Err(ConfigError::InvalidCountry(config.country.clone()));
    }

    for (field, value) in [
        ("appdaemon_path", &config.appdaemon_path),
        ("netdaemon_path", &config.netdaemon_path),
        ("python_script_path", &config.python_script_path),
        ("theme_path", &config.theme_path),
        ("plugin_path", &config.plugin_path),
        ("template_path", &config.template_path),
    ] {
        if !is_relative_subpath(value) {
            return Err(ConfigError::InvalidPath {
                field,
                value: value.clone(),
            });
        }
    }

    Ok(())
}

fn is_relative_subpath(value: &str) -> bool {
    let path = Path::new(value);
    !value.trim().is_empty()
        && path.is_relative()
        && path
            .components()
            .all(|c| matches!(c, std::path::Component::Normal(_)))
}
