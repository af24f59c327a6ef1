//! Core services - the reconciliation logic layer.
//!
//! Services orchestrate between ports and domain logic. They never know
//! about concrete adapters; everything external arrives through [`Ports`].

mod app_core;
mod data;
mod install;
mod record;
mod repository;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, warn};

pub use app_core::AppCore;
pub use data::{DataService, RestoreMode, WriteScope};
pub use install::InstallOutcome;
pub use record::RepositoryRecord;
pub use repository::{RepositoryService, UpdateOutcome};

use crate::config::Configuration;
use crate::domain::RepositoryEntity;
use crate::events::AppEvent;
use crate::gate::{GateConfig, RateGate};
use crate::ports::{
    AppEventEmitter, ConstraintCheckPort, ContentWriterPort, DefaultRepositoriesPort,
    ManagedDirectories, NoConstraints, NoDefaults, NoopEmitter, PathSafety, RemoteClientPort,
    StorePort,
};
use crate::registry::Registry;
use crate::state::SharedState;

/// Container for every port the core consumes.
///
/// Adapters build one of these at their composition root. Optional ports
/// default to inert implementations.
#[derive(Clone)]
pub struct Ports {
    pub remote: Arc<dyn RemoteClientPort>,
    pub store: Arc<dyn StorePort>,
    pub content: Arc<dyn ContentWriterPort>,
    pub defaults: Arc<dyn DefaultRepositoriesPort>,
    pub events: Arc<dyn AppEventEmitter>,
    pub constraints: Arc<dyn ConstraintCheckPort>,
    /// Path safety policy. `None` uses the managed install directories.
    pub path_safety: Option<Arc<dyn PathSafety>>,
}

impl Ports {
    pub fn new(
        remote: Arc<dyn RemoteClientPort>,
        store: Arc<dyn StorePort>,
        content: Arc<dyn ContentWriterPort>,
    ) -> Self {
        Self {
            remote,
            store,
            content,
            defaults: Arc::new(NoDefaults),
            events: Arc::new(NoopEmitter::new()),
            constraints: Arc::new(NoConstraints),
            path_safety: None,
        }
    }

    #[must_use]
    pub fn with_defaults(mut self, defaults: Arc<dyn DefaultRepositoriesPort>) -> Self {
        self.defaults = defaults;
        self
    }

    #[must_use]
    pub fn with_events(mut self, events: Arc<dyn AppEventEmitter>) -> Self {
        self.events = events;
        self
    }

    #[must_use]
    pub fn with_constraints(mut self, constraints: Arc<dyn ConstraintCheckPort>) -> Self {
        self.constraints = constraints;
        self
    }

    #[must_use]
    pub fn with_path_safety(mut self, path_safety: Arc<dyn PathSafety>) -> Self {
        self.path_safety = Some(path_safety);
        self
    }
}

/// Shared state of one running instance, handed to every service.
#[derive(Clone)]
pub struct Context {
    pub config: Arc<Configuration>,
    /// Running version of this tool.
    pub version: Arc<str>,
    pub ports: Ports,
    pub path_safety: Arc<dyn PathSafety>,
    pub registry: Arc<Registry>,
    pub state: Arc<SharedState>,
    pub gate: Arc<RateGate>,
}

impl Context {
    pub fn new(config: Configuration, version: &str, ports: Ports, gate: GateConfig) -> Self {
        let path_safety = ports
            .path_safety
            .clone()
            .unwrap_or_else(|| Arc::new(ManagedDirectories::from_config(&config)));
        Self {
            config: Arc::new(config),
            version: Arc::from(version),
            ports,
            path_safety,
            registry: Arc::new(Registry::new()),
            state: Arc::new(SharedState::new()),
            gate: Arc::new(RateGate::new(gate)),
        }
    }

    /// Fire-and-forget dispatch.
    pub fn emit(&self, event: AppEvent) {
        self.ports.events.emit(event);
    }

    /// Whether `candidate` may be used as a local content path.
    pub fn is_safe_path(&self, candidate: &Path) -> bool {
        self.path_safety
            .is_safe(&self.config.config_root, candidate)
    }

    /// Local content path of `entity`, if it exists and is safe.
    pub async fn existing_local_path(&self, entity: &RepositoryEntity) -> Option<PathBuf> {
        let path = entity.local_path(&self.config)?;
        if !self.is_safe_path(&path) {
            warn!(repository = %entity.string(), path = %path.display(), "Unsafe local path ignored");
            return None;
        }
        match tokio::fs::try_exists(&path).await {
            Ok(true) => Some(path),
            Ok(false) => None,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Could not check local path");
                None
            }
        }
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("version", &self.version)
            .field("registry", &self.registry.len())
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}
