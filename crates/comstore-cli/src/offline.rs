//! Remote client used by the inspection commands.
//!
//! The CLI works on persisted state only; no HTTP client is wired in. Every
//! call fails with [`RemoteError::Unavailable`].

use async_trait::async_trait;
use comstore_core::{Release, RemoteClientPort, RemoteError, RemoteResult, RemoteTree, RepoInfo};

#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineRemote;

impl OfflineRemote {
    fn unavailable<T>() -> RemoteResult<T> {
        Err(RemoteError::Unavailable(
            "no remote client is configured for the CLI".to_string(),
        ))
    }
}

#[async_trait]
impl RemoteClientPort for OfflineRemote {
    async fn get_repository(&self, _full_name: &str) -> RemoteResult<RepoInfo> {
        Self::unavailable()
    }

    async fn get_releases(&self, _full_name: &str) -> RemoteResult<Vec<Release>> {
        Self::unavailable()
    }

    async fn get_tree(&self, _full_name: &str, _git_ref: &str) -> RemoteResult<RemoteTree> {
        Self::unavailable()
    }

    async fn get_contents(
        &self,
        _full_name: &str,
        _path: &str,
        _git_ref: &str,
    ) -> RemoteResult<Vec<u8>> {
        Self::unavailable()
    }

    async fn download(&self, _url: &str) -> RemoteResult<Vec<u8>> {
        Self::unavailable()
    }

    async fn rate_limit_remaining(&self) -> RemoteResult<u64> {
        Self::unavailable()
    }
}
