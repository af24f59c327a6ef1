//! Durable document store port.
//!
//! The store holds JSON documents by key. Each `save` replaces the whole
//! document; saves of different keys are independent.

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

/// Key of the global lists document.
pub const GLOBAL_DOCUMENT: &str = "hacs";

/// Key of the per-repository records document.
pub const REPOSITORIES_DOCUMENT: &str = "repositories";

/// Domain-specific errors for store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing medium failed.
    #[error("Storage error: {0}")]
    Storage(String),

    /// The stored document is not valid JSON, or does not fit its shape.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Key/value store for JSON documents.
#[async_trait]
pub trait StorePort: Send + Sync {
    /// Load a document. `None` when it was never saved.
    async fn load(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replace a document atomically.
    async fn save(&self, key: &str, value: &Value) -> Result<(), StoreError>;
}

/// Source of the bundled default repository list used on fresh installs.
///
/// The list has the same shape as the `repositories` document.
#[async_trait]
pub trait DefaultRepositoriesPort: Send + Sync {
    async fn load_defaults(&self) -> Result<Value, StoreError>;
}

/// Empty default list.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDefaults;

#[async_trait]
impl DefaultRepositoriesPort for NoDefaults {
    async fn load_defaults(&self) -> Result<Value, StoreError> {
        Ok(Value::Object(serde_json::Map::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_ports_are_object_safe() {
        fn _assert_store(_: Arc<dyn StorePort>) {}
        fn _assert_defaults(_: Arc<dyn DefaultRepositoriesPort>) {}
    }

    #[tokio::test]
    async fn test_no_defaults_is_empty_object() {
        let value = NoDefaults.load_defaults().await.unwrap();
        assert_eq!(value, serde_json::json!({}));
    }
}
