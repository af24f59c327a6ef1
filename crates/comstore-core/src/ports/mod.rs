//! Port definitions (trait abstractions) for external systems.
//!
//! Ports define the interfaces that the core expects from infrastructure.
//! They contain no implementation details and use only domain types.
//!
//! # Design Rules
//!
//! - No HTTP or filesystem types in any signature beyond `Path`
//! - Adapters classify their own failures into the port error enums
//! - Event dispatch is fire-and-forget

pub mod constraints;
pub mod content;
pub mod event_emitter;
pub mod path_safety;
pub mod remote;
pub mod store;

use thiserror::Error;

pub use constraints::{ConstraintCheckPort, NoConstraints};
pub use content::{ContentError, ContentWriterPort};
pub use event_emitter::{AppEventEmitter, EventBus, NoopEmitter};
pub use path_safety::{ManagedDirectories, PathSafety};
pub use remote::{RemoteClientPort, RemoteError, RemoteResult};
#[cfg(test)]
pub use remote::MockRemoteClientPort;
pub use store::{
    DefaultRepositoriesPort, GLOBAL_DOCUMENT, NoDefaults, REPOSITORIES_DOCUMENT, StoreError,
    StorePort,
};

use crate::config::ConfigError;
use crate::domain::DisabledReason;
use crate::registry::RegistryError;

/// Core error type for semantic domain errors.
///
/// Adapters map this to their own error types (CLI exit codes, etc.).
#[derive(Debug, Error)]
pub enum CoreError {
    /// Remote operation failed.
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Store operation failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Content write failed.
    #[error(transparent)]
    Content(#[from] ContentError),

    /// Registry operation failed.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Configuration error.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The repository failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The system is disabled.
    #[error("System is disabled: {0}")]
    Disabled(DisabledReason),
}
