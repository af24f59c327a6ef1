//! JSON document store on the local filesystem.
//!
//! Every document lives in its own file under the storage directory,
//! wrapped in a small envelope:
//!
//! ```json
//! { "version": 1, "key": "hacs.repositories", "data": { ... } }
//! ```
//!
//! Saves replace the file atomically. Documents are independent, so a
//! crash between two saves leaves each file internally consistent.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use comstore_core::ports::{GLOBAL_DOCUMENT, StoreError, StorePort};
use serde_json::{Value, json};
use tracing::debug;

use crate::atomic::write_atomic;

/// Envelope format version.
const STORAGE_VERSION: u64 = 1;

/// Document store rooted at a storage directory.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Store keeping its files in `dir`. The directory is created on the
    /// first save.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name used for `key`.
    ///
    /// The global document is `hacs`; every other key is stored as
    /// `hacs.<key>`.
    pub fn file_name(key: &str) -> String {
        if key == GLOBAL_DOCUMENT {
            key.to_string()
        } else {
            format!("{GLOBAL_DOCUMENT}.{key}")
        }
    }

    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(Self::file_name(key))
    }
}

#[async_trait]
impl StorePort for JsonFileStore {
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError> {
        let path = self.path_for(key);
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(path = %path.display(), "No stored document");
                return Ok(None);
            }
            Err(e) => {
                return Err(StoreError::Storage(format!(
                    "Failed to read {}: {e}",
                    path.display()
                )));
            }
        };

        let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
            StoreError::Serialization(format!("{} is not valid JSON: {e}", path.display()))
        })?;
        Ok(Some(unwrap_envelope(value)))
    }

    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        let path = self.path_for(key);
        let document = json!({
            "version": STORAGE_VERSION,
            "key": Self::file_name(key),
            "data": value,
        });
        let bytes = serde_json::to_vec_pretty(&document)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, &bytes))
            .await
            .map_err(|e| StoreError::Storage(format!("Write task failed: {e}")))?
            .map_err(|e| {
                StoreError::Storage(format!("Failed to write {}: {e}", path.display()))
            })?;
        debug!(path = %path.display(), "Document saved");
        Ok(())
    }
}

/// Documents written without an envelope are returned as they are.
fn unwrap_envelope(value: Value) -> Value {
    match value {
        Value::Object(mut map) if map.contains_key("key") && map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
