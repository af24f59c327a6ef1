//! Content writer port.
//!
//! Install mechanics are limited to "write these bytes atomically at this
//! path" and "remove this path".

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;

/// Errors from content writes.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("Failed to write {path}: {message}")]
    Write { path: PathBuf, message: String },

    #[error("Failed to remove {path}: {message}")]
    Remove { path: PathBuf, message: String },

    /// The target is outside the managed directories.
    #[error("Refusing unsafe path: {0}")]
    UnsafePath(PathBuf),
}

/// Writes installable content to the local filesystem.
#[async_trait]
pub trait ContentWriterPort: Send + Sync {
    /// Write `bytes` to `target`, creating parent directories. The file is
    /// either fully written or untouched.
    async fn write_file(&self, target: &Path, bytes: &[u8]) -> Result<(), ContentError>;

    /// Remove a file or directory tree. Missing targets are not an error.
    async fn remove(&self, target: &Path) -> Result<(), ContentError>;
}
