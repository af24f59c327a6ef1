//! Error types for tasks and setup.

use comstore_core::{CoreError, DisabledReason, RemoteError};
use thiserror::Error;

/// A background task failed. The next scheduled run retries.
#[derive(Debug, Error)]
pub enum TaskError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Unknown task: {0}")]
    UnknownTask(String),
}

/// Setup did not complete.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("The remote token is not valid: {0}")]
    InvalidToken(String),

    #[error("The remote quota is exhausted, setup resumes when it is cleared")]
    RateLimit,

    #[error("Constraint check failed: {0}")]
    Constraints(String),

    #[error("Could not restore persisted data")]
    Restore,

    /// Setup could not talk to the remote. Nothing is disabled; try again later.
    #[error(transparent)]
    Remote(RemoteError),

    /// A setup-stage task failed. Nothing is disabled; try again later.
    #[error("{failed} setup task(s) failed")]
    SetupTasks { failed: usize },

    /// `on_platform_started` was called without a successful setup.
    #[error("Setup has not completed")]
    NotSetUp,
}

impl SetupError {
    /// Reason the system is disabled with after this failure.
    pub const fn disabled_reason(&self) -> Option<DisabledReason> {
        match self {
            Self::InvalidToken(_) => Some(DisabledReason::InvalidToken),
            Self::RateLimit => Some(DisabledReason::RateLimit),
            Self::Constraints(_) => Some(DisabledReason::Constraints),
            Self::Restore => Some(DisabledReason::Restore),
            Self::Remote(_) | Self::SetupTasks { .. } | Self::NotSetUp => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_reasons() {
        assert_eq!(
            SetupError::RateLimit.disabled_reason(),
            Some(DisabledReason::RateLimit)
        );
        assert_eq!(
            SetupError::Constraints("legacy updater".into()).disabled_reason(),
            Some(DisabledReason::Constraints)
        );
        assert_eq!(
            SetupError::Remote(RemoteError::network("offline")).disabled_reason(),
            None
        );
    }
}
