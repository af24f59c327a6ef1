//! Queues updates for repositories that are tracked but not installed.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use super::{Task, TaskContext, TaskDescriptor, enqueue_update};
use crate::error::TaskError;

const INTERVAL: Duration = Duration::from_secs(25 * 60 * 60);

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateAllRepositories;

#[async_trait]
impl Task for UpdateAllRepositories {
    fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor::new("update_all_repositories").every(INTERVAL)
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let core = &ctx.core;
        let config = core.config();

        let mut queued = 0;
        for handle in core.registry().list_all() {
            let wanted = {
                let entity = handle.lock().await;
                !entity.data.installed && config.is_enabled(entity.category())
            };
            if wanted {
                enqueue_update(ctx, handle);
                queued += 1;
            }
        }
        debug!(queued, "Updates queued for all repositories");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueManager;
    use comstore_core::testing::TestHarness;
    use comstore_core::{AppCore, Category, Configuration, Ports, RepositoryEntity};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_queues_only_uninstalled_in_enabled_categories() {
        let harness = TestHarness::new();
        let remote = Arc::new(harness.remote.clone());
        let ports = Ports::new(
            remote,
            Arc::new(harness.store.clone()),
            Arc::new(harness.content.clone()),
        );
        // Themes are off by default.
        let core = AppCore::new(Configuration::with_root("/config"), "1.0.0", ports);
        let registry = core.registry();
        registry
            .register(RepositoryEntity::new("owner/card", Category::Plugin))
            .unwrap();
        registry
            .register(RepositoryEntity::new("owner/dark", Category::Theme))
            .unwrap();
        let installed = registry
            .register(RepositoryEntity::new("owner/weather", Category::Integration))
            .unwrap();
        installed
            .lock()
            .await
            .set_installed(None, Some("abc1234".into()));

        let ctx = TaskContext {
            core,
            queue: QueueManager::new(),
        };
        UpdateAllRepositories.execute(&ctx).await.unwrap();
        assert_eq!(ctx.queue.pending_tasks(), 1);
    }
}
