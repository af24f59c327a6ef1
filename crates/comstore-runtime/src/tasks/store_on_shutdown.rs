//! Flushes the registry when the platform stops.

use async_trait::async_trait;
use comstore_core::{DisabledReason, EventChannel};
use tracing::debug;

use super::{Task, TaskContext, TaskDescriptor};
use crate::error::TaskError;

#[derive(Debug, Clone, Copy, Default)]
pub struct StoreDataOnShutdown;

#[async_trait]
impl Task for StoreDataOnShutdown {
    fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor::new("store_data_on_shutdown")
            .on_events(&[EventChannel::Shutdown])
            .when_disabled()
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let data = ctx.core.data();
        // A failed restore leaves a partial registry that must not replace
        // what is on disk.
        if ctx.core.state().disabled_reason() == Some(DisabledReason::Restore) {
            debug!("Restore failed earlier, not writing data on shutdown");
            return Ok(());
        }
        data.force_write().await?;
        Ok(())
    }
}
