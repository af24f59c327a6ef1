//! Path safety checks.
//!
//! Local content paths come from remote data (repository names, domains),
//! so every path is checked before it is used as an install target.

use std::path::{Component, Path, PathBuf};

use crate::config::Configuration;
use crate::domain::Category;

/// Decides whether a candidate path may be used under a base path.
pub trait PathSafety: Send + Sync {
    fn is_safe(&self, base: &Path, candidate: &Path) -> bool;
}

/// Accepts paths that stay inside one of the managed install directories.
///
/// The check is lexical: `..` components are rejected outright and the
/// candidate must be a managed directory or lie below one.
#[derive(Debug, Clone)]
pub struct ManagedDirectories {
    managed: Vec<PathBuf>,
}

impl ManagedDirectories {
    /// Managed directories for every category under `config`.
    pub fn from_config(config: &Configuration) -> Self {
        let mut managed: Vec<PathBuf> = Category::ALL
            .iter()
            .filter_map(|c| normalize(&c.install_dir(config)))
            .collect();
        managed.sort();
        managed.dedup();
        Self { managed }
    }

    pub fn managed(&self) -> &[PathBuf] {
        &self.managed
    }
}

impl PathSafety for ManagedDirectories {
    fn is_safe(&self, base: &Path, candidate: &Path) -> bool {
        if candidate
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return false;
        }
        let Some(normalized) = normalize(candidate) else {
            return false;
        };
        if !normalize(base).is_some_and(|base| normalized.starts_with(base)) {
            return false;
        }
        self.managed
            .iter()
            .any(|dir| normalized.starts_with(dir))
    }
}

fn normalize(path: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => return None,
            other => normalized.push(other),
        }
    }
    Some(normalized)
}
