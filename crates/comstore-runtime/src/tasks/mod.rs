//! Named background tasks.
//!
//! Every task carries a [`TaskDescriptor`] saying when it runs: in a
//! startup stage, on a fixed interval, on an event, or any mix of those.
//! The [`TaskManager`] holds the tasks in registration order and makes
//! sure one task name never has two invocations running at once.

mod check_ratelimit;
mod load_self;
mod process_queue;
mod store_on_shutdown;
mod update_all;
mod update_downloaded;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use comstore_core::{AppCore, EventChannel, SharedEntity, Stage};
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use crate::error::TaskError;
use crate::queue::QueueManager;

pub use check_ratelimit::CheckRatelimit;
pub use load_self::LoadSelfRepository;
pub use process_queue::ProcessQueue;
pub use store_on_shutdown::StoreDataOnShutdown;
pub use update_all::UpdateAllRepositories;
pub use update_downloaded::UpdateDownloadedRepositories;

// ========== Descriptor ==========

/// When a task runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDescriptor {
    pub name: &'static str,
    pub stages: &'static [Stage],
    pub interval: Option<Duration>,
    pub events: &'static [EventChannel],
    /// Run even while the system is disabled.
    pub runs_when_disabled: bool,
}

impl TaskDescriptor {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            stages: &[],
            interval: None,
            events: &[],
            runs_when_disabled: false,
        }
    }

    #[must_use]
    pub const fn in_stages(mut self, stages: &'static [Stage]) -> Self {
        self.stages = stages;
        self
    }

    #[must_use]
    pub const fn every(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }

    #[must_use]
    pub const fn on_events(mut self, events: &'static [EventChannel]) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub const fn when_disabled(mut self) -> Self {
        self.runs_when_disabled = true;
        self
    }
}

// ========== Task ==========

/// What a task body gets to work with.
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub core: AppCore,
    pub queue: QueueManager,
}

/// A background task.
#[async_trait]
pub trait Task: Send + Sync {
    fn descriptor(&self) -> TaskDescriptor;

    async fn execute(&self, ctx: &TaskContext) -> Result<(), TaskError>;
}

/// How an invocation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskRun {
    Completed,
    /// The system is disabled and the task does not run while disabled.
    Skipped,
}

/// A task registered with a [`TaskManager`].
#[derive(Clone)]
pub struct RegisteredTask {
    descriptor: TaskDescriptor,
    task: Arc<dyn Task>,
    lock: Arc<Mutex<()>>,
    ctx: TaskContext,
    running: Arc<AtomicUsize>,
}

impl std::fmt::Debug for RegisteredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTask")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

impl RegisteredTask {
    pub const fn descriptor(&self) -> &TaskDescriptor {
        &self.descriptor
    }

    pub const fn name(&self) -> &'static str {
        self.descriptor.name
    }

    /// Run the task body.
    ///
    /// A second invocation of the same task waits until the first one
    /// finishes. Failures are logged here and returned.
    pub async fn execute_task(&self) -> Result<TaskRun, TaskError> {
        let _exclusive = self.lock.lock().await;
        let name = self.descriptor.name;

        if self.ctx.core.state().disabled() && !self.descriptor.runs_when_disabled {
            debug!(task = name, "System is disabled, skipping task");
            return Ok(TaskRun::Skipped);
        }

        let _running = RunningGuard::enter(&self.running);
        let started = Instant::now();
        debug!(task = name, "Task started");

        match self.task.execute(&self.ctx).await {
            Ok(()) => {
                debug!(
                    task = name,
                    elapsed_ms = started.elapsed().as_millis(),
                    "Task completed"
                );
                Ok(TaskRun::Completed)
            }
            Err(e) => {
                error!(task = name, error = %e, "Task failed");
                Err(e)
            }
        }
    }
}

struct RunningGuard<'a>(&'a AtomicUsize);

impl<'a> RunningGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

// ========== Manager ==========

/// Ordered registry of tasks by name.
#[derive(Debug)]
pub struct TaskManager {
    ctx: TaskContext,
    tasks: IndexMap<&'static str, RegisteredTask>,
    running: Arc<AtomicUsize>,
}

impl TaskManager {
    /// Empty manager. Call [`Self::load`] to add the built-in tasks.
    pub fn new(core: AppCore, queue: QueueManager) -> Self {
        Self {
            ctx: TaskContext { core, queue },
            tasks: IndexMap::new(),
            running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Register the built-in tasks. Loading again replaces them.
    pub fn load(&mut self) {
        self.register(Arc::new(LoadSelfRepository));
        self.register(Arc::new(UpdateDownloadedRepositories));
        self.register(Arc::new(UpdateAllRepositories));
        self.register(Arc::new(ProcessQueue));
        self.register(Arc::new(CheckRatelimit));
        self.register(Arc::new(StoreDataOnShutdown));
        debug!(tasks = self.tasks.len(), "Tasks loaded");
    }

    /// Add a task, replacing any task with the same name.
    pub fn register(&mut self, task: Arc<dyn Task>) {
        let descriptor = task.descriptor();
        let registered = RegisteredTask {
            descriptor: descriptor.clone(),
            task,
            lock: Arc::new(Mutex::new(())),
            ctx: self.ctx.clone(),
            running: Arc::clone(&self.running),
        };
        self.tasks.insert(descriptor.name, registered);
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredTask> {
        self.tasks.get(name)
    }

    /// Run the task called `name`.
    pub async fn execute_task(&self, name: &str) -> Result<TaskRun, TaskError> {
        let task = self
            .get(name)
            .ok_or_else(|| TaskError::UnknownTask(name.to_string()))?;
        task.execute_task().await
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.tasks.keys().copied().collect()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Task bodies executing right now.
    pub fn running(&self) -> usize {
        self.running.load(Ordering::SeqCst)
    }

    pub fn for_stage(&self, stage: Stage) -> Vec<&RegisteredTask> {
        self.tasks
            .values()
            .filter(|t| t.descriptor.stages.contains(&stage))
            .collect()
    }

    pub fn for_event(&self, channel: EventChannel) -> Vec<&RegisteredTask> {
        self.tasks
            .values()
            .filter(|t| t.descriptor.events.contains(&channel))
            .collect()
    }

    pub fn periodic(&self) -> Vec<(&RegisteredTask, Duration)> {
        self.tasks
            .values()
            .filter_map(|t| t.descriptor.interval.map(|interval| (t, interval)))
            .collect()
    }

    pub const fn context(&self) -> &TaskContext {
        &self.ctx
    }
}

/// Queue an update for `handle`. Failures are logged by the job.
pub(crate) fn enqueue_update(ctx: &TaskContext, handle: SharedEntity) {
    let repositories = ctx.core.repositories().clone();
    ctx.queue.add(async move {
        if let Err(e) = repositories.update_repository(&handle, false, false).await {
            let full_name = handle.lock().await.full_name().to_string();
            warn!(full_name, error = %e, "Queued update failed");
        }
    });
}
