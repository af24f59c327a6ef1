//! Remote content resolution.
//!
//! Each category has its own rules for where the installable content lives
//! in a repository. Resolution is a pure function of the manifest, the
//! latest releases and the file tree, so it can be re-run on every update.

use serde::{Deserialize, Serialize};

use super::{Category, Manifest, Release, TreeEntry};

/// Where installable content is fetched from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteLocation {
    /// An asset of the latest release.
    Release,
    /// A directory of the tree. Empty means the repository root.
    Path(String),
}

impl RemoteLocation {
    #[must_use]
    pub fn root() -> Self {
        Self::Path(String::new())
    }

    #[must_use]
    pub fn path(path: impl Into<String>) -> Self {
        Self::Path(path.into())
    }

    /// Path of `file` inside this location. `None` for release assets.
    pub fn join(&self, file: &str) -> Option<String> {
        match self {
            Self::Release => None,
            Self::Path(dir) if dir.is_empty() => Some(file.to_string()),
            Self::Path(dir) => Some(format!("{dir}/{file}")),
        }
    }
}

/// Outcome of a successful resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedContent {
    pub location: RemoteLocation,
    /// Single installable file, when the category has one.
    pub file_name: Option<String>,
    /// Integration domain discovered from the tree.
    pub domain: Option<String>,
    /// Only `file_name` is installed.
    pub single: bool,
}

impl ResolvedContent {
    fn directory(location: RemoteLocation) -> Self {
        Self {
            location,
            file_name: None,
            domain: None,
            single: false,
        }
    }

    /// A single file. Files in a release or at the root are installed
    /// alone; files in a directory bring the rest of that directory along.
    fn file(location: RemoteLocation, file_name: impl Into<String>) -> Self {
        let single = !matches!(&location, RemoteLocation::Path(dir) if !dir.is_empty());
        Self {
            location,
            file_name: Some(file_name.into()),
            domain: None,
            single,
        }
    }
}

/// Candidate plugin file names, in priority order.
pub fn plugin_candidates(name: &str, manifest: &Manifest) -> Vec<String> {
    if let Some(filename) = &manifest.filename {
        return vec![filename.clone()];
    }
    vec![
        format!("{}.js", name.replace("lovelace-", "")),
        format!("{name}.js"),
        format!("{name}.umd.js"),
        format!("{name}-bundle.js"),
    ]
}

/// Resolve the installable plugin file.
///
/// Locations are scanned as `release`, `dist/`, root (root only with
/// `content_in_root`). Within a location the first matching candidate is
/// taken. A later location that matches replaces an earlier match, so a
/// file in `dist/` is preferred over a release asset and a root file over
/// both.
pub fn resolve_plugin_content(
    name: &str,
    manifest: &Manifest,
    releases: &[Release],
    tree: &[TreeEntry],
) -> Option<ResolvedContent> {
    let candidates = plugin_candidates(name, manifest);
    let locations = if manifest.content_in_root {
        vec![RemoteLocation::root()]
    } else {
        vec![
            RemoteLocation::Release,
            RemoteLocation::path("dist"),
            RemoteLocation::root(),
        ]
    };

    let mut resolved = None;
    for location in locations {
        let found = match &location {
            RemoteLocation::Release => {
                let Some(asset) = releases.first().and_then(|r| r.assets.first()) else {
                    continue;
                };
                candidates.iter().find(|c| **c == asset.name)
            }
            RemoteLocation::Path(_) => candidates.iter().find(|candidate| {
                location
                    .join(candidate)
                    .is_some_and(|path| tree.iter().any(|e| e.full_path == path))
            }),
        };

        if let Some(candidate) = found {
            let file_name = candidate.rsplit('/').next().unwrap_or(candidate).to_string();
            resolved = Some(ResolvedContent::file(location, file_name));
        }
    }
    resolved
}

/// Resolve installable content for any category.
pub fn resolve_content(
    category: Category,
    name: &str,
    manifest: &Manifest,
    releases: &[Release],
    tree: &[TreeEntry],
) -> Option<ResolvedContent> {
    if category == Category::Plugin {
        return resolve_plugin_content(name, manifest, releases, tree);
    }

    if manifest.zip_release {
        let filename = manifest.filename.as_deref()?;
        let latest = releases.first()?;
        return latest
            .assets
            .iter()
            .any(|a| a.name == filename)
            .then(|| ResolvedContent::directory(RemoteLocation::Release));
    }

    let root = manifest.content_in_root;
    let files = || tree.iter().filter(|e| !e.is_directory);

    match category {
        Category::Integration => {
            if root {
                return files()
                    .any(|e| e.full_path == "manifest.json")
                    .then(|| ResolvedContent::directory(RemoteLocation::root()));
            }
            let entry = files().find(|e| {
                e.filename() == "manifest.json"
                    && e.parent().starts_with("custom_components/")
                    && e.parent().matches('/').count() == 1
            })?;
            let domain = entry.parent().trim_start_matches("custom_components/");
            Some(ResolvedContent {
                domain: Some(domain.to_string()),
                ..ResolvedContent::directory(RemoteLocation::path(entry.parent()))
            })
        }
        Category::Theme => single_file_in(tree, root, "themes", ".yaml"),
        Category::PythonScript => single_file_in(tree, root, "python_scripts", ".py"),
        Category::NetDaemon => {
            let dir = if root { "" } else { "apps" };
            files()
                .any(|e| e.full_path.starts_with(dir) && e.full_path.ends_with(".cs"))
                .then(|| ResolvedContent::directory(RemoteLocation::path(dir)))
        }
        Category::AppDaemon => {
            if root {
                return Some(ResolvedContent::directory(RemoteLocation::root()));
            }
            let app = tree
                .iter()
                .find(|e| e.is_directory && e.parent() == "apps")?;
            Some(ResolvedContent::directory(RemoteLocation::path(
                app.full_path.clone(),
            )))
        }
        Category::Template => {
            let filename = manifest.filename.as_deref()?;
            files()
                .any(|e| e.full_path == filename)
                .then(|| ResolvedContent::file(RemoteLocation::root(), filename))
        }
        Category::Plugin => None,
    }
}

fn single_file_in(
    tree: &[TreeEntry],
    content_in_root: bool,
    dir: &str,
    extension: &str,
) -> Option<ResolvedContent> {
    let dir = if content_in_root { "" } else { dir };
    let entry = tree
        .iter()
        .find(|e| !e.is_directory && e.parent() == dir && e.full_path.ends_with(extension))?;
    Some(ResolvedContent {
        single: true,
        ..ResolvedContent::file(RemoteLocation::path(dir), entry.filename())
    })
}
