//! Content writer for installed repository files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use comstore_core::ports::{ContentError, ContentWriterPort};
use tracing::debug;

use crate::atomic::write_atomic;

/// Writes content to the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsContentWriter;

impl FsContentWriter {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl ContentWriterPort for FsContentWriter {
    async fn write_file(&self, target: &Path, bytes: &[u8]) -> Result<(), ContentError> {
        let path = target.to_path_buf();
        let bytes = bytes.to_vec();
        let result = tokio::task::spawn_blocking({
            let path = path.clone();
            move || write_atomic(&path, &bytes)
        })
        .await;

        match result {
            Ok(Ok(())) => {
                debug!(path = %path.display(), "Content written");
                Ok(())
            }
            Ok(Err(e)) => Err(write_error(path, &e)),
            Err(e) => Err(write_error(path, &e)),
        }
    }

    async fn remove(&self, target: &Path) -> Result<(), ContentError> {
        let metadata = match tokio::fs::symlink_metadata(target).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(remove_error(target, &e)),
        };

        let result = if metadata.is_dir() {
            tokio::fs::remove_dir_all(target).await
        } else {
            tokio::fs::remove_file(target).await
        };
        match result {
            Ok(()) => {
                debug!(path = %target.display(), "Content removed");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(remove_error(target, &e)),
        }
    }
}

fn write_error(path: PathBuf, error: &dyn std::fmt::Display) -> ContentError {
    ContentError::Write {
        path,
        message: error.to_string(),
    }
}

fn remove_error(path: &Path, error: &std::io::Error) -> ContentError {
    ContentError::Remove {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}
