//! Remote repository metadata as reported by the code host.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Repository metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoInfo {
    /// Stable numeric id, as a string.
    pub id: String,
    /// `owner/repo`, in the casing the host reports.
    pub full_name: String,
    pub description: String,
    pub default_branch: String,
    pub archived: bool,
    pub topics: Vec<String>,
    pub stargazers_count: u64,
    /// Last push, as reported.
    pub pushed_at: Option<DateTime<Utc>>,
    /// Entity tag of the metadata response. Changes when the repository changes.
    pub etag: Option<String>,
}

/// A published release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub tag_name: String,
    pub prerelease: bool,
    pub draft: bool,
    pub published_at: Option<DateTime<Utc>>,
    pub assets: Vec<ReleaseAsset>,
}

impl Release {
    /// Total downloads across assets.
    pub fn download_count(&self) -> u64 {
        self.assets.iter().map(|a| a.download_count).sum()
    }
}

/// A file attached to a release.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseAsset {
    pub name: String,
    pub download_count: u64,
    pub download_url: String,
}

/// One entry of the repository file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    /// Path relative to the repository root, `/` separated.
    pub full_path: String,
    pub is_directory: bool,
}

impl TreeEntry {
    pub fn file(full_path: impl Into<String>) -> Self {
        Self {
            full_path: full_path.into(),
            is_directory: false,
        }
    }

    pub fn directory(full_path: impl Into<String>) -> Self {
        Self {
            full_path: full_path.into(),
            is_directory: true,
        }
    }

    /// Last path segment.
    pub fn filename(&self) -> &str {
        self.full_path
            .rsplit_once('/')
            .map_or(self.full_path.as_str(), |(_, name)| name)
    }

    /// Everything before the last segment, empty for root entries.
    pub fn parent(&self) -> &str {
        self.full_path
            .rsplit_once('/')
            .map_or("", |(parent, _)| parent)
    }
}

/// File tree at a given ref.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteTree {
    /// Commit the tree was read at.
    pub sha: String,
    pub entries: Vec<TreeEntry>,
}
