//! Drives tasks by stage, interval and event.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use comstore_core::{EventChannel, Stage};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::tasks::{RegisteredTask, TaskManager};

/// Outcome of [`Scheduler::run_stage`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageReport {
    pub ran: usize,
    pub failed: usize,
}

/// Runs registered tasks at the right moments.
///
/// Periodic tasks get one background loop each once [`Self::start`] is
/// called. A stopped scheduler stays stopped.
#[derive(Debug)]
pub struct Scheduler {
    tasks: Arc<TaskManager>,
    cancel_token: CancellationToken,
    loops: Mutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    pub fn new(tasks: Arc<TaskManager>) -> Self {
        Self {
            tasks,
            cancel_token: CancellationToken::new(),
            loops: Mutex::new(Vec::new()),
        }
    }

    pub const fn tasks(&self) -> &Arc<TaskManager> {
        &self.tasks
    }

    /// Spawn the periodic loops. Returns how many were started; calling
    /// again while they run starts nothing.
    pub fn start(&self) -> usize {
        if self.cancel_token.is_cancelled() {
            warn!("Scheduler was stopped, not starting");
            return 0;
        }
        let mut loops = self.loops.lock().unwrap_or_else(PoisonError::into_inner);
        if !loops.is_empty() {
            return 0;
        }

        for (task, period) in self.tasks.periodic() {
            debug!(task = task.name(), period_secs = period.as_secs(), "Scheduling task");
            loops.push(tokio::spawn(run_periodic(
                task.clone(),
                period,
                self.cancel_token.clone(),
            )));
        }
        loops.len()
    }

    /// Whether periodic loops are active.
    pub fn is_running(&self) -> bool {
        !self.cancel_token.is_cancelled()
            && !self
                .loops
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .is_empty()
    }

    /// Run every task bound to `stage`, one after another.
    ///
    /// A failing task does not stop the stage. Failures are logged by the
    /// task wrapper and counted in the report.
    pub async fn run_stage(&self, stage: Stage) -> StageReport {
        let mut report = StageReport::default();
        for task in self.tasks.for_stage(stage) {
            report.ran += 1;
            if task.execute_task().await.is_err() {
                report.failed += 1;
            }
        }
        if report.failed > 0 {
            warn!(%stage, failed = report.failed, "Stage tasks failed");
        }
        report
    }

    /// Run every task listening on `channel`. Returns how many ran.
    pub async fn dispatch_event(&self, channel: EventChannel) -> usize {
        let tasks = self.tasks.for_event(channel);
        debug!(?channel, tasks = tasks.len(), "Dispatching event to tasks");
        for task in &tasks {
            let _ = task.execute_task().await;
        }
        tasks.len()
    }

    /// Cancel the periodic loops and wait for them. A task body that is
    /// running finishes first.
    pub async fn stop(&self) {
        self.cancel_token.cancel();
        let loops: Vec<JoinHandle<()>> = self
            .loops
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in loops {
            if let Err(e) = handle.await {
                warn!(error = %e, "Scheduled task loop ended abnormally");
            }
        }
        debug!("Scheduler stopped");
    }
}

async fn run_periodic(task: RegisteredTask, period: Duration, cancel_token: CancellationToken) {
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let _ = task.execute_task().await;
            }
            () = cancel_token.cancelled() => {
                debug!(task = task.name(), "Scheduled task cancelled");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TaskError;
    use crate::queue::QueueManager;
    use crate::tasks::{Task, TaskContext, TaskDescriptor};
    use async_trait::async_trait;
    use comstore_core::testing::TestHarness;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        runs: Arc<AtomicUsize>,
        descriptor: TaskDescriptor,
    }

    #[async_trait]
    impl Task for Counting {
        fn descriptor(&self) -> TaskDescriptor {
            self.descriptor.clone()
        }

        async fn execute(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn scheduler_with(harness: &TestHarness, descriptor: TaskDescriptor) -> (Scheduler, Arc<AtomicUsize>) {
        let runs = Arc::new(AtomicUsize::new(0));
        let mut manager = TaskManager::new(harness.core().clone(), QueueManager::new());
        manager.register(Arc::new(Counting {
            runs: Arc::clone(&runs),
            descriptor,
        }));
        (Scheduler::new(Arc::new(manager)), runs)
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_task_runs_on_interval() {
        let harness = TestHarness::new();
        let (scheduler, runs) = scheduler_with(
            &harness,
            TaskDescriptor::new("tick").every(Duration::from_secs(60)),
        );

        assert_eq!(scheduler.start(), 1);
        assert_eq!(scheduler.start(), 0);
        assert!(scheduler.is_running());

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 0);
        tokio::time::sleep(Duration::from_secs(71)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        scheduler.stop().await;
        assert!(!scheduler.is_running());
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.start(), 0);
    }

    #[tokio::test]
    async fn test_stage_and_event_dispatch() {
        let harness = TestHarness::new();
        let (scheduler, runs) = scheduler_with(
            &harness,
            TaskDescriptor::new("flush")
                .in_stages(&[Stage::Startup])
                .on_events(&[EventChannel::Shutdown]),
        );

        assert_eq!(scheduler.run_stage(Stage::Setup).await.ran, 0);
        assert_eq!(
            scheduler.run_stage(Stage::Startup).await,
            StageReport { ran: 1, failed: 0 }
        );
        assert_eq!(scheduler.dispatch_event(EventChannel::Config).await, 0);
        assert_eq!(scheduler.dispatch_event(EventChannel::Shutdown).await, 1);
        assert_eq!(runs.load(Ordering::SeqCst), 2);
    }

    struct Failing;

    #[async_trait]
    impl Task for Failing {
        fn descriptor(&self) -> TaskDescriptor {
            TaskDescriptor::new("failing").in_stages(&[Stage::Setup])
        }

        async fn execute(&self, _ctx: &TaskContext) -> Result<(), TaskError> {
            Err(TaskError::UnknownTask("missing".into()))
        }
    }

    #[tokio::test]
    async fn test_stage_report_counts_failures() {
        let harness = TestHarness::new();
        let runs = Arc::new(AtomicUsize::new(0));
        let mut manager = TaskManager::new(harness.core().clone(), QueueManager::new());
        manager.register(Arc::new(Failing));
        manager.register(Arc::new(Counting {
            runs: Arc::clone(&runs),
            descriptor: TaskDescriptor::new("ok").in_stages(&[Stage::Setup]),
        }));
        let scheduler = Scheduler::new(Arc::new(manager));

        assert_eq!(
            scheduler.run_stage(Stage::Setup).await,
            StageReport { ran: 2, failed: 1 }
        );
        assert_eq!(runs.load(Ordering::SeqCst), 1);
    }
}
