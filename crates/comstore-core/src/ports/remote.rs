//! Remote code-host port.
//!
//! The HTTP client itself lives outside the core. Adapters classify their
//! failures into [`RemoteError`]; the core only reacts to that
//! classification and never imposes timeouts of its own.

use async_trait::async_trait;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

use crate::domain::{Release, RemoteTree, RepoInfo};
use crate::gate::{GateClosed, RateLimitClassify};

/// Errors from remote code-host operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The repository or path does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The host refused the call because the quota is exhausted.
    #[error("Rate limit exceeded, try again later")]
    RateLimited,

    /// The token is missing or invalid.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Network or connectivity error.
    #[error("Network error: {0}")]
    Network(String),

    /// The host answered with something that could not be understood.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// No client is configured.
    #[error("Remote unavailable: {0}")]
    Unavailable(String),

    /// The rate gate was closed while the call was waiting.
    #[error(transparent)]
    GateClosed(#[from] GateClosed),
}

impl RemoteError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl RateLimitClassify for RemoteError {
    fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// Result type alias for remote operations.
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Capabilities the core consumes from the code host.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RemoteClientPort: Send + Sync {
    /// Repository metadata.
    async fn get_repository(&self, full_name: &str) -> RemoteResult<RepoInfo>;

    /// Releases, newest first.
    async fn get_releases(&self, full_name: &str) -> RemoteResult<Vec<Release>>;

    /// File tree at `git_ref`.
    async fn get_tree(&self, full_name: &str, git_ref: &str) -> RemoteResult<RemoteTree>;

    /// Raw content of one file at `git_ref`.
    async fn get_contents(&self, full_name: &str, path: &str, git_ref: &str)
    -> RemoteResult<Vec<u8>>;

    /// Download a release asset.
    async fn download(&self, url: &str) -> RemoteResult<Vec<u8>>;

    /// Remaining calls in the current quota window.
    ///
    /// An invalid token is reported as [`RemoteError::Auth`].
    async fn rate_limit_remaining(&self) -> RemoteResult<u64>;
}
