//! Core of the comstore reconciliation engine.
//!
//! Holds the domain model (repository entities, manifests, categories),
//! the ports the engine consumes, the rate gate, the registry, the shared
//! state and the services that validate, update, install, restore and
//! write repositories. Nothing in here knows about a concrete HTTP client,
//! filesystem layout or scheduler; adapters live in sibling crates.
#![deny(unused_crate_dependencies)]

pub mod config;
pub mod domain;
pub mod events;
pub mod gate;
pub mod ports;
pub mod registry;
pub mod services;
pub mod state;

#[cfg(any(test, feature = "test-utils"))]
pub mod testing;

// Re-export commonly used types for convenience
pub use config::{COUNTRY_ALL, ConfigError, Configuration, DEFAULT_RELEASE_LIMIT};
pub use domain::{
    Category, CommonLists, DisabledReason, Manifest, ManifestError, Release, RemoteLocation,
    RemoteTree, RepoInfo, RepositoryEntity, SELF_REPOSITORY, Stage, Status, SystemState,
    TreeEntry, render_template,
};
pub use events::{AppEvent, EventChannel, RepositoryAction};
pub use gate::{GateClosed, GateConfig, RateGate, RateLimitClassify, fetch_updates_for};
pub use ports::{
    AppEventEmitter, ConstraintCheckPort, ContentError, ContentWriterPort, CoreError,
    DefaultRepositoriesPort, EventBus, GLOBAL_DOCUMENT, ManagedDirectories, NoConstraints,
    NoDefaults, NoopEmitter, PathSafety, REPOSITORIES_DOCUMENT, RemoteClientPort, RemoteError,
    RemoteResult, StoreError, StorePort,
};
pub use registry::{Registry, RegistryError, SharedEntity};
pub use services::{
    AppCore, Context, DataService, InstallOutcome, Ports, RepositoryRecord, RepositoryService,
    RestoreMode, UpdateOutcome, WriteScope,
};
pub use state::SharedState;

// Silence unused dev-dependency warnings
#[cfg(test)]
use tokio_test as _;
