//! Staged setup and lifecycle of one running instance.
//!
//! ```text
//! setup()               SETUP       quota, constraints, restore, setup tasks
//! on_platform_started() STARTUP     startup tasks (own repository skipped)
//!                       RUNNING     queue processing, periodic loops started
//!                       BACKGROUND
//! shutdown()                        shutdown tasks, loops stopped
//! ```
//!
//! A failed gate in `setup` disables the system with a reason and stops
//! there: the startup listener is not registered, so the platform-started
//! hook refuses to run. The host may call `setup` again later. A setup
//! stopped by the rate limit is retried every [`SETUP_RETRY_INTERVAL`]
//! until the quota returns or the runtime shuts down.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use comstore_core::{
    AppCore, AppEvent, DisabledReason, EventChannel, RemoteError, SELF_REPOSITORY, Stage,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::SetupError;
use crate::queue::QueueManager;
use crate::scheduler::Scheduler;
use crate::tasks::TaskManager;

/// Delay before a rate limited setup is tried again.
pub const SETUP_RETRY_INTERVAL: Duration = Duration::from_secs(15 * 60);

#[derive(Debug)]
struct Inner {
    core: AppCore,
    queue: QueueManager,
    scheduler: Scheduler,
    startup_listener: AtomicBool,
    platform_started: AtomicBool,
    retry: Mutex<Option<JoinHandle<()>>>,
    cancel_token: CancellationToken,
}

/// One running instance: core, queue, tasks and scheduler.
///
/// Clones share the same instance.
#[derive(Debug, Clone)]
pub struct Runtime {
    inner: Arc<Inner>,
}

impl Runtime {
    /// Runtime with the built-in tasks loaded.
    pub fn new(core: AppCore) -> Self {
        let queue = QueueManager::new();
        let mut tasks = TaskManager::new(core.clone(), queue.clone());
        tasks.load();
        Self::with_tasks(core, queue, tasks)
    }

    /// Runtime over a prepared task manager. `tasks` must share `queue`.
    pub fn with_tasks(core: AppCore, queue: QueueManager, tasks: TaskManager) -> Self {
        Self {
            inner: Arc::new(Inner {
                core,
                queue,
                scheduler: Scheduler::new(Arc::new(tasks)),
                startup_listener: AtomicBool::new(false),
                platform_started: AtomicBool::new(false),
                retry: Mutex::new(None),
                cancel_token: CancellationToken::new(),
            }),
        }
    }

    pub fn core(&self) -> &AppCore {
        &self.inner.core
    }

    pub fn queue(&self) -> &QueueManager {
        &self.inner.queue
    }

    pub fn tasks(&self) -> &TaskManager {
        self.inner.scheduler.tasks()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.inner.scheduler
    }

    /// Whether a successful setup is waiting for the platform to start.
    pub fn has_startup_listener(&self) -> bool {
        self.inner.startup_listener.load(Ordering::SeqCst)
    }

    /// Whether a rate limited setup is waiting to be retried.
    pub fn retry_pending(&self) -> bool {
        self.inner
            .retry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    // ========== Setup ==========

    /// Run the setup gates in order: token, quota, constraints, restore.
    ///
    /// The first failing gate disables the system with its reason and
    /// aborts. On success the setup-stage tasks run and the startup
    /// listener is registered. A rate limit failure schedules a retry.
    pub async fn setup(&self) -> Result<(), SetupError> {
        let result = self.setup_once().await;
        if matches!(result, Err(SetupError::RateLimit)) {
            self.schedule_retry();
        }
        result
    }

    async fn setup_once(&self) -> Result<(), SetupError> {
        let core = self.core();
        core.enable();
        core.state().set_running(true);
        core.set_stage(Stage::Setup);
        info!(version = core.version(), "Setting up");

        if let Err(e) = self.run_gates().await {
            match e.disabled_reason() {
                Some(reason) => core.disable(reason),
                None => error!(error = %e, "Setup failed, try again later"),
            }
            return Err(e);
        }

        let report = self.scheduler().run_stage(Stage::Setup).await;
        if report.failed > 0 {
            let e = SetupError::SetupTasks {
                failed: report.failed,
            };
            error!(error = %e, "Setup failed, try again later");
            return Err(e);
        }
        self.inner.startup_listener.store(true, Ordering::SeqCst);
        info!("Setup complete, waiting for the platform to start");
        Ok(())
    }

    async fn run_gates(&self) -> Result<(), SetupError> {
        let core = self.core();
        let budget = match core.rate_budget().await {
            Ok(budget) => budget,
            Err(RemoteError::Auth(message)) => {
                error!(%message, "The remote token is not valid");
                return Err(SetupError::InvalidToken(message));
            }
            Err(e) => return Err(SetupError::Remote(e)),
        };
        if budget == 0 {
            error!("The remote account is rate limited, resuming when the limit clears");
            return Err(SetupError::RateLimit);
        }
        debug!(budget, "Repositories that can be updated");

        core.check_constraints()
            .await
            .map_err(SetupError::Constraints)?;

        if !core.data().restore().await {
            if let Some(handle) = core.registry().get_by_full_name(SELF_REPOSITORY) {
                handle.lock().await.pending_restart = true;
            }
            return Err(SetupError::Restore);
        }
        Ok(())
    }

    fn schedule_retry(&self) {
        if self.inner.cancel_token.is_cancelled() {
            return;
        }
        let mut retry = self
            .inner
            .retry
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if retry.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        info!(
            retry_in_secs = SETUP_RETRY_INTERVAL.as_secs(),
            "Setup will be retried"
        );
        *retry = Some(tokio::spawn(self.clone().retry_setup()));
    }

    async fn retry_setup(self) {
        loop {
            tokio::select! {
                () = tokio::time::sleep(SETUP_RETRY_INTERVAL) => {}
                () = self.inner.cancel_token.cancelled() => {
                    debug!("Setup retry cancelled");
                    return;
                }
            }
            if self.core().state().disabled_reason() != Some(DisabledReason::RateLimit) {
                debug!("No longer rate limited, dropping setup retry");
                return;
            }

            match self.setup_once().await {
                Ok(()) => break,
                Err(SetupError::RateLimit) => {}
                Err(e) => {
                    warn!(error = %e, "Setup retry failed");
                    return;
                }
            }
        }

        if self.inner.platform_started.load(Ordering::SeqCst) {
            if let Err(e) = self.on_platform_started().await {
                warn!(error = %e, "Could not start after setup retry");
            }
        }
    }

    // ========== Startup ==========

    /// The host platform finished starting.
    ///
    /// Runs the startup, running and background stages in order and starts
    /// the periodic loops. Fires once per successful setup; when setup
    /// succeeds later on a retry, the stages run right after it.
    pub async fn on_platform_started(&self) -> Result<(), SetupError> {
        self.inner.platform_started.store(true, Ordering::SeqCst);
        if !self.inner.startup_listener.swap(false, Ordering::SeqCst) {
            return Err(SetupError::NotSetUp);
        }
        let core = self.core();
        let scheduler = self.scheduler();
        let state = core.state();

        state.set_startup(true);
        core.set_stage(Stage::Startup);
        scheduler.run_stage(Stage::Startup).await;
        state.set_startup(false);

        core.set_stage(Stage::Running);
        scheduler.run_stage(Stage::Running).await;
        let loops = scheduler.start();
        debug!(loops, "Periodic tasks scheduled");

        core.set_stage(Stage::Background);
        scheduler.run_stage(Stage::Background).await;
        Ok(())
    }

    // ========== Shutdown ==========

    /// Flush state and stop every background activity.
    pub async fn shutdown(&self) {
        info!("Shutting down");
        self.inner.cancel_token.cancel();
        let retry = self
            .inner
            .retry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = retry {
            if let Err(e) = handle.await {
                warn!(error = %e, "Setup retry ended abnormally");
            }
        }

        let core = self.core();
        self.inner.startup_listener.store(false, Ordering::SeqCst);
        core.emit(AppEvent::Shutdown);
        self.scheduler().dispatch_event(EventChannel::Shutdown).await;
        self.scheduler().stop().await;
        self.inner.queue.clear();
        core.gate().close();
        core.state().set_running(false);
    }
}
