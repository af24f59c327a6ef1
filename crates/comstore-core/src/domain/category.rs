//! Content categories.
//!
//! The category of a repository decides where its content is installed,
//! which manifest fields it needs and how its installable files are found.
//! It is fixed when the entity is constructed.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::Configuration;

/// Closed set of content categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    /// `AppDaemon` apps.
    #[serde(rename = "appdaemon")]
    AppDaemon,
    /// Custom integrations (`custom_components/<domain>`).
    #[serde(rename = "integration")]
    Integration,
    /// Frontend plugins. Older documents call these `lovelace`.
    #[serde(rename = "plugin", alias = "lovelace")]
    Plugin,
    /// `NetDaemon` apps.
    #[serde(rename = "netdaemon")]
    NetDaemon,
    /// Single-file python scripts.
    #[serde(rename = "python_script")]
    PythonScript,
    /// Frontend themes.
    #[serde(rename = "theme")]
    Theme,
    /// Jinja templates.
    #[serde(rename = "template")]
    Template,
}

/// A category string that is not part of the closed set.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown category: {0}")]
pub struct ParseCategoryError(pub String);

impl Category {
    /// Every category, in display order.
    pub const ALL: [Self; 7] = [
        Self::AppDaemon,
        Self::Integration,
        Self::Plugin,
        Self::NetDaemon,
        Self::PythonScript,
        Self::Theme,
        Self::Template,
    ];

    /// Canonical wire name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AppDaemon => "appdaemon",
            Self::Integration => "integration",
            Self::Plugin => "plugin",
            Self::NetDaemon => "netdaemon",
            Self::PythonScript => "python_script",
            Self::Theme => "theme",
            Self::Template => "template",
        }
    }

    /// Directory under the configuration root that holds content of this category.
    pub fn install_dir(self, config: &Configuration) -> PathBuf {
        let relative = match self {
            Self::AppDaemon => config.appdaemon_path.as_str(),
            Self::Integration => "custom_components",
            Self::Plugin => config.plugin_path.as_str(),
            Self::NetDaemon => config.netdaemon_path.as_str(),
            Self::PythonScript => config.python_script_path.as_str(),
            Self::Theme => config.theme_path.as_str(),
            Self::Template => config.template_path.as_str(),
        };
        config.config_root.join(relative.trim_end_matches('/'))
    }

    /// Whether a restart of the host platform is needed after installing.
    #[must_use]
    pub const fn requires_restart(self) -> bool {
        matches!(self, Self::Integration)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = ParseCategoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "appdaemon" => Ok(Self::AppDaemon),
            "integration" => Ok(Self::Integration),
            "plugin" | "lovelace" => Ok(Self::Plugin),
            "netdaemon" => Ok(Self::NetDaemon),
            "python_script" => Ok(Self::PythonScript),
            "theme" => Ok(Self::Theme),
            "template" => Ok(Self::Template),
            other => Err(ParseCategoryError(other.to_string())),
        }
    }
}
