//! Registers the running integration itself during setup.

use async_trait::async_trait;
use comstore_core::Stage;
use tracing::debug;

use super::{Task, TaskContext, TaskDescriptor};
use crate::error::TaskError;

#[derive(Debug, Clone, Copy, Default)]
pub struct LoadSelfRepository;

#[async_trait]
impl Task for LoadSelfRepository {
    fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor::new("load_self_repository").in_stages(&[Stage::Setup])
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let handle = ctx.core.load_self_repository().await?;
        let entity = handle.lock().await;
        debug!(
            repository = entity.string(),
            version = entity.data.installed_version.as_deref(),
            "Own repository loaded"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueManager;
    use comstore_core::SELF_REPOSITORY;
    use comstore_core::testing::{TEST_VERSION, TestHarness};

    #[tokio::test]
    async fn test_registers_self_as_installed() {
        let harness = TestHarness::new();
        let ctx = TaskContext {
            core: harness.core().clone(),
            queue: QueueManager::new(),
        };

        LoadSelfRepository.execute(&ctx).await.unwrap();
        LoadSelfRepository.execute(&ctx).await.unwrap();

        let handle = harness.core().registry().get_by_full_name(SELF_REPOSITORY).unwrap();
        let entity = handle.lock().await;
        assert!(entity.data.installed);
        assert_eq!(entity.data.installed_version.as_deref(), Some(TEST_VERSION));
        assert_eq!(harness.core().registry().len(), 1);
    }
}
