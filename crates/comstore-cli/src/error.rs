//! CLI-specific error types and mappings.

use comstore_core::{ConfigError, CoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Could not read {path}: {message}")]
    Io { path: String, message: String },

    #[error("Could not restore the store, see the log for details")]
    Restore,

    #[error("Repository is not tracked: {0}")]
    UnknownRepository(String),

    #[error("No configuration directory given and no home directory found")]
    NoConfigRoot,
}

impl CliError {
    /// Exit code, following sysexits.h where one fits.
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::Core(_) | Self::Restore | Self::UnknownRepository(_) => 1,
            Self::Io { .. } => 74,
            Self::Config(_) | Self::NoConfigRoot => 78,
        }
    }
}
