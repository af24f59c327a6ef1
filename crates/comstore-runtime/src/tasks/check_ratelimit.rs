//! Re-enables a system that was disabled by the rate limit.

use std::time::Duration;

use async_trait::async_trait;
use comstore_core::DisabledReason;
use tracing::{debug, info};

use super::{Task, TaskContext, TaskDescriptor};
use crate::error::TaskError;

const INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, Default)]
pub struct CheckRatelimit;

#[async_trait]
impl Task for CheckRatelimit {
    fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor::new("check_ratelimit")
            .every(INTERVAL)
            .when_disabled()
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let core = &ctx.core;
        if core.state().disabled_reason() != Some(DisabledReason::RateLimit) {
            return Ok(());
        }

        let budget = core.rate_budget().await?;
        if budget == 0 {
            debug!(remaining = core.gate().remaining(), "Still rate limited");
        } else {
            info!(budget, "Rate limit cleared");
            core.enable();
        }
        Ok(())
    }
}
