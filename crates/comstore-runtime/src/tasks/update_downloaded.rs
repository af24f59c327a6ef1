//! Queues updates for every installed repository.

use std::time::Duration;

use async_trait::async_trait;
use comstore_core::Stage;
use tracing::debug;

use super::{Task, TaskContext, TaskDescriptor, enqueue_update};
use crate::error::TaskError;

const INTERVAL: Duration = Duration::from_secs(2 * 60 * 60);

#[derive(Debug, Clone, Copy, Default)]
pub struct UpdateDownloadedRepositories;

#[async_trait]
impl Task for UpdateDownloadedRepositories {
    fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor::new("update_downloaded_repositories")
            .in_stages(&[Stage::Startup])
            .every(INTERVAL)
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let core = &ctx.core;
        let categories = core.config().enabled_categories();
        let startup = core.state().startup();

        let mut queued = 0;
        for handle in core.registry().list_installed(&categories).await {
            // Updating the running integration before the platform is up
            // would replace code that is still loading.
            if startup && handle.lock().await.is_self() {
                debug!("Skipping own repository during startup");
                continue;
            }
            enqueue_update(ctx, handle);
            queued += 1;
        }
        debug!(queued, "Updates queued for installed repositories");
        Ok(())
    }
}
