//! `AppCore` - the primary application facade.
//!
//! This is the composition root for core services. The runtime and the
//! CLI receive an `AppCore` instance and use it to reach the registry, the
//! shared state and the services. There are no globals: everything one
//! running instance owns hangs off this struct.

use std::path::Path;
use std::sync::Arc;

use tracing::{info, warn};

use super::{Context, DataService, Ports, RepositoryService};
use crate::config::Configuration;
use crate::domain::{Category, DisabledReason, SELF_REPOSITORY, Stage};
use crate::events::AppEvent;
use crate::gate::{GateConfig, RateGate, fetch_updates_for};
use crate::ports::{CoreError, RemoteResult};
use crate::registry::{Registry, RegistryError, SharedEntity};
use crate::state::SharedState;

/// The core application facade.
///
/// # Example
///
/// ```ignore
/// let ports = Ports::new(remote, store, content).with_events(bus);
/// let core = AppCore::new(config, env!("CARGO_PKG_VERSION"), ports);
///
/// if core.data().restore().await {
///     let count = core.registry().len();
/// }
/// ```
#[derive(Debug, Clone)]
pub struct AppCore {
    ctx: Context,
    repositories: RepositoryService,
    data: DataService,
}

impl AppCore {
    /// Create a new `AppCore` with the default gate tuning.
    pub fn new(config: Configuration, version: &str, ports: Ports) -> Self {
        Self::with_gate(config, version, ports, GateConfig::default())
    }

    pub fn with_gate(config: Configuration, version: &str, ports: Ports, gate: GateConfig) -> Self {
        let ctx = Context::new(config, version, ports, gate);
        let repositories = RepositoryService::new(ctx.clone());
        let data = DataService::new(ctx.clone(), repositories.clone());
        Self {
            ctx,
            repositories,
            data,
        }
    }

    pub const fn context(&self) -> &Context {
        &self.ctx
    }

    pub fn config(&self) -> &Configuration {
        &self.ctx.config
    }

    pub fn version(&self) -> &str {
        &self.ctx.version
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.ctx.registry
    }

    pub fn state(&self) -> &Arc<SharedState> {
        &self.ctx.state
    }

    pub fn gate(&self) -> &Arc<RateGate> {
        &self.ctx.gate
    }

    /// Access the repository service.
    pub const fn repositories(&self) -> &RepositoryService {
        &self.repositories
    }

    /// Access the data service.
    pub const fn data(&self) -> &DataService {
        &self.data
    }

    pub fn emit(&self, event: AppEvent) {
        self.ctx.emit(event);
    }

    // ========== System state ==========

    /// Disable the system and tell observers why.
    pub fn disable(&self, reason: DisabledReason) {
        warn!(%reason, "Disabling");
        self.ctx.state.disable(reason);
        self.ctx.emit(AppEvent::Disabled { reason });
    }

    pub fn enable(&self) {
        if self.ctx.state.disabled() {
            info!("Enabling");
        }
        self.ctx.state.enable();
    }

    /// Advance to `stage`. Returns `false` when `stage` is not ahead.
    pub fn set_stage(&self, stage: Stage) -> bool {
        if !self.ctx.state.advance_stage(stage) {
            return false;
        }
        info!(%stage, "Stage changed");
        self.ctx.emit(AppEvent::StageChanged { stage });
        true
    }

    /// Ask the host for the remaining quota, record it and return the
    /// number of repository updates it allows.
    ///
    /// An invalid token surfaces as [`crate::ports::RemoteError::Auth`].
    pub async fn rate_budget(&self) -> RemoteResult<u64> {
        let remaining = self.ctx.ports.remote.rate_limit_remaining().await?;
        self.ctx.gate.set_remaining(remaining);
        Ok(fetch_updates_for(remaining))
    }

    /// Run the host constraint check.
    pub async fn check_constraints(&self) -> Result<(), String> {
        self.ctx.ports.constraints.check().await
    }

    /// Whether `path` exists on the local filesystem.
    pub async fn check_local_path(&self, path: &Path) -> bool {
        tokio::fs::try_exists(path).await.unwrap_or(false)
    }

    /// Make sure the running integration is registered and marked
    /// installed at the running version.
    pub async fn load_self_repository(&self) -> Result<SharedEntity, CoreError> {
        let handle = match self.ctx.registry.get_by_full_name(SELF_REPOSITORY) {
            Some(handle) => handle,
            None => match self
                .repositories
                .register_repository(SELF_REPOSITORY, Category::Integration, false, None)
                .await
            {
                Ok(handle) => handle,
                Err(CoreError::Registry(RegistryError::AlreadyRegistered(name))) => self
                    .ctx
                    .registry
                    .get_by_full_name(&name)
                    .ok_or(RegistryError::NotFound(name))?,
                Err(e) => return Err(e),
            },
        };

        {
            let mut entity = handle.lock().await;
            entity.set_installed(Some(self.ctx.version.to_string()), None);
            entity.data.domain.get_or_insert_with(|| "hacs".to_string());
        }
        Ok(handle)
    }
}
