//! CLI bootstrap - the composition root.
//!
//! This module is the only place where the CLI wires concrete adapters:
//! - JSON document store, content writer, bundled defaults and constraint
//!   checks (via comstore-fs)
//! - an offline remote client, since the CLI only inspects persisted state
//! - core services (via comstore-core)

use std::path::{Path, PathBuf};
use std::sync::Arc;

use comstore_core::{AppCore, Configuration, Ports, RestoreMode};
use comstore_fs::{BundledDefaults, FsConstraints, FsContentWriter, JsonFileStore};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::CliError;
use crate::offline::OfflineRemote;
use crate::parser::Cli;

/// Where the configuration comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CliConfig {
    pub config_root: PathBuf,
    pub entry: Option<PathBuf>,
    pub token: Option<String>,
}

impl CliConfig {
    /// Resolve from parsed arguments. Without `--config` the default
    /// `~/.homeassistant` directory is used.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let config_root = cli
            .config_root
            .clone()
            .or_else(default_config_root)
            .ok_or(CliError::NoConfigRoot)?;
        Ok(Self {
            config_root,
            entry: cli.entry.clone(),
            token: cli.token.clone(),
        })
    }

    /// Build the validated configuration.
    ///
    /// The entry file's `data` map is the config, its `options` map the
    /// options. The configuration root and token given on the command line
    /// override whatever the entry holds.
    pub async fn load(&self) -> Result<Configuration, CliError> {
        let (data, options) = match &self.entry {
            Some(path) => read_entry(path).await?,
            None => (Value::Null, Value::Null),
        };

        let mut config = match data {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => return Err(comstore_core::ConfigError::InvalidConfig.into()),
        };
        config.insert(
            "config_root".to_string(),
            Value::String(self.config_root.to_string_lossy().into_owned()),
        );
        if let Some(token) = &self.token {
            config.insert("token".to_string(), Value::String(token.clone()));
        }

        Ok(Configuration::from_maps(&Value::Object(config), &options)?)
    }
}

fn default_config_root() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".homeassistant"))
}

async fn read_entry(path: &Path) -> Result<(Value, Value), CliError> {
    let io_error = |message: String| CliError::Io {
        path: path.display().to_string(),
        message,
    };
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| io_error(e.to_string()))?;
    let mut entry: Value = serde_json::from_slice(&bytes).map_err(|e| io_error(e.to_string()))?;

    let Some(map) = entry.as_object_mut() else {
        return Err(comstore_core::ConfigError::InvalidConfig.into());
    };
    let data = map.remove("data").unwrap_or(Value::Null);
    let options = map.remove("options").unwrap_or(Value::Null);
    Ok((data, options))
}

/// Composed context handed to command handlers.
#[derive(Debug, Clone)]
pub struct CliContext {
    pub app: AppCore,
}

impl CliContext {
    pub const fn app(&self) -> &AppCore {
        &self.app
    }

    /// Restore persisted state into the registry as it was saved.
    ///
    /// The CLI is not the running integration, so its own record keeps the
    /// persisted version.
    pub async fn restore(&self) -> Result<(), CliError> {
        if self.app.data().restore_with(RestoreMode::Inspect).await {
            Ok(())
        } else {
            Err(CliError::Restore)
        }
    }
}

/// Wire the filesystem adapters around `config`.
pub fn bootstrap(config: Configuration) -> CliContext {
    debug!(root = %config.config_root.display(), "Bootstrapping");
    let ports = Ports::new(
        Arc::new(OfflineRemote),
        Arc::new(JsonFileStore::new(config.storage_dir())),
        Arc::new(FsContentWriter::new()),
    )
    .with_defaults(Arc::new(BundledDefaults::embedded()))
    .with_constraints(Arc::new(FsConstraints::new(&config.config_root)));

    CliContext {
        app: AppCore::new(config, env!("CARGO_PKG_VERSION"), ports),
    }
}
