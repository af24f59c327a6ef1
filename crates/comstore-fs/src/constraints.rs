//! Host-side startup constraints.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use comstore_core::ports::ConstraintCheckPort;
use tracing::debug;

/// Directory left behind by the legacy updater. Both cannot manage the
/// same configuration directory.
pub const LEGACY_UPDATER_DIR: &str = "custom_components/custom_updater";

/// Constraint checks against the configuration directory.
#[derive(Debug, Clone)]
pub struct FsConstraints {
    config_root: PathBuf,
}

impl FsConstraints {
    pub fn new(config_root: impl Into<PathBuf>) -> Self {
        Self {
            config_root: config_root.into(),
        }
    }

    pub fn config_root(&self) -> &Path {
        &self.config_root
    }
}

#[async_trait]
impl ConstraintCheckPort for FsConstraints {
    async fn check(&self) -> Result<(), String> {
        let legacy = self.config_root.join(LEGACY_UPDATER_DIR);
        match tokio::fs::try_exists(&legacy).await {
            Ok(true) => Err(format!(
                "This cannot be used together with the legacy updater, remove {}",
                legacy.display()
            )),
            Ok(false) => {
                debug!(root = %self.config_root.display(), "Constraints satisfied");
                Ok(())
            }
            Err(e) => Err(format!("Could not inspect {}: {e}", legacy.display())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_legacy_updater_fails_check() {
        let dir = tempfile::tempdir().unwrap();
        let constraints = FsConstraints::new(dir.path());
        assert!(constraints.check().await.is_ok());

        std::fs::create_dir_all(dir.path().join(LEGACY_UPDATER_DIR)).unwrap();
        let err = constraints.check().await.unwrap_err();
        assert!(err.contains("custom_updater"));
    }
}
