//! Drains the execution queue within the rate budget.

use std::time::Duration;

use async_trait::async_trait;
use comstore_core::Stage;
use tracing::{debug, info};

use super::{Task, TaskContext, TaskDescriptor};
use crate::error::TaskError;

const INTERVAL: Duration = Duration::from_secs(10 * 60);

#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessQueue;

#[async_trait]
impl Task for ProcessQueue {
    fn descriptor(&self) -> TaskDescriptor {
        TaskDescriptor::new("process_queue")
            .in_stages(&[Stage::Running])
            .every(INTERVAL)
    }

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError> {
        let queue = &ctx.queue;
        if !queue.has_pending_tasks() {
            debug!("Nothing in the queue");
            return Ok(());
        }
        if queue.running() {
            debug!("Queue is already running");
            return Ok(());
        }

        let budget = ctx.core.rate_budget().await?;
        if budget == 0 {
            info!(
                pending = queue.pending_tasks(),
                "Rate budget exhausted, the queue resumes on the next run"
            );
            return Ok(());
        }

        let state = ctx.core.state();
        state.set_background_task(true);
        let limit = usize::try_from(budget).unwrap_or(usize::MAX);
        let ran = queue.execute(Some(limit)).await;
        state.set_background_task(false);
        debug!(ran, pending = queue.pending_tasks(), "Queue processed");

        ctx.core.data().write(false).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueManager;
    use comstore_core::testing::{FakeRepository, TestHarness};
    use comstore_core::{Category, REPOSITORIES_DOCUMENT};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn context(harness: &TestHarness) -> TaskContext {
        TaskContext {
            core: harness.core().clone(),
            queue: QueueManager::new(),
        }
    }

    #[tokio::test]
    async fn test_runs_queued_updates_and_writes() {
        let harness = TestHarness::new();
        harness.remote.add(FakeRepository::new("8", "owner/card"));
        let handle = harness
            .core()
            .repositories()
            .register_repository("owner/card", Category::Plugin, false, None)
            .await
            .unwrap();
        let ctx = context(&harness);
        super::super::enqueue_update(&ctx, Arc::clone(&handle));

        ProcessQueue.execute(&ctx).await.unwrap();
        assert_eq!(ctx.queue.pending_tasks(), 0);
        assert!(handle.lock().await.data.last_fetched.is_some());
        assert!(harness.store.get(REPOSITORIES_DOCUMENT).is_some());
        assert!(!harness.core().state().status().background_task);
    }

    #[tokio::test]
    async fn test_budget_limits_batch() {
        let harness = TestHarness::new();
        // (1015 - 1000) / 15 == 1
        harness.remote.set_remaining(Ok(1015));
        let ctx = context(&harness);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let counter = Arc::clone(&counter);
            ctx.queue.add(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        ProcessQueue.execute(&ctx).await.unwrap();
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.queue.pending_tasks(), 2);

        harness.remote.set_remaining(Ok(900));
        ProcessQueue.execute(&ctx).await.unwrap();
        assert_eq!(ctx.queue.pending_tasks(), 2);
    }

    #[tokio::test]
    async fn test_empty_queue_does_not_touch_remote() {
        let harness = TestHarness::new();
        ProcessQueue.execute(&context(&harness)).await.unwrap();
        assert_eq!(harness.remote.calls(), 0);
        assert_eq!(harness.store.save_count(), 0);
    }
}
