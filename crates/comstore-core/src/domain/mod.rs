//! Domain types for the repository catalog.
//!
//! These are pure value types with no infrastructure dependencies.

mod category;
pub mod content;
mod manifest;
mod release;
mod repository;
mod state;
mod template;

pub use category::{Category, ParseCategoryError};
pub use content::{RemoteLocation, ResolvedContent, resolve_content, resolve_plugin_content};
pub use manifest::{MANIFEST_FILE, Manifest, ManifestError};
pub use release::{Release, ReleaseAsset, RemoteTree, RepoInfo, TreeEntry};
pub use repository::{
    ContentState, ReleasesState, RepositoryData, RepositoryEntity, SELF_REPOSITORY,
    ValidationResult,
};
pub use state::{CommonLists, DisabledReason, Stage, Status, SystemState};
pub use template::render_template;
