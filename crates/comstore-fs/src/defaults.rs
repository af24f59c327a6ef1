//! Default repository list seeded on fresh installs.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use comstore_core::ports::{DefaultRepositoriesPort, StoreError};
use serde_json::Value;
use thiserror::Error;

/// List shipped with the binary.
const EMBEDDED_DEFAULTS: &str = include_str!("../data/default.repositories");

/// Errors reading a default list.
#[derive(Debug, Error)]
pub enum DefaultsError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Default repository list is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Default repository list must be an object keyed by repository id")]
    Shape,
}

impl From<DefaultsError> for StoreError {
    fn from(err: DefaultsError) -> Self {
        match err {
            DefaultsError::Read { .. } => Self::Storage(err.to_string()),
            DefaultsError::Parse(_) | DefaultsError::Shape => Self::Serialization(err.to_string()),
        }
    }
}

#[derive(Debug, Clone)]
enum Source {
    Embedded,
    File(PathBuf),
}

/// Default repository list, either embedded or read from a file.
#[derive(Debug, Clone)]
pub struct BundledDefaults {
    source: Source,
}

impl BundledDefaults {
    pub const fn embedded() -> Self {
        Self {
            source: Source::Embedded,
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            source: Source::File(path.into()),
        }
    }

    async fn read(&self) -> Result<Value, DefaultsError> {
        let value: Value = match &self.source {
            Source::Embedded => serde_json::from_str(EMBEDDED_DEFAULTS)?,
            Source::File(path) => parse_file(path).await?,
        };
        if value.is_object() {
            Ok(value)
        } else {
            Err(DefaultsError::Shape)
        }
    }
}

impl Default for BundledDefaults {
    fn default() -> Self {
        Self::embedded()
    }
}

async fn parse_file(path: &Path) -> Result<Value, DefaultsError> {
    let bytes = tokio::fs::read(path).await.map_err(|source| DefaultsError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(serde_json::from_slice(&bytes)?)
}

#[async_trait]
impl DefaultRepositoriesPort for BundledDefaults {
    async fn load_defaults(&self) -> Result<Value, StoreError> {
        Ok(self.read().await?)
    }
}
