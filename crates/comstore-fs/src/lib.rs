//! Filesystem adapters for comstore.
//!
//! - [`JsonFileStore`] keeps each document as one JSON file under
//!   `<config>/.storage/`.
//! - [`FsContentWriter`] writes installable content atomically.
//! - [`BundledDefaults`] supplies the default repository list for fresh
//!   installs.
//! - [`FsConstraints`] checks host-side preconditions.
#![deny(unused_crate_dependencies)]

mod atomic;
mod constraints;
mod content;
mod defaults;
mod store;

pub use constraints::{FsConstraints, LEGACY_UPDATER_DIR};
pub use content::FsContentWriter;
pub use defaults::BundledDefaults;
pub use store::JsonFileStore;

// Silence unused dev-dependency warnings
#[cfg(test)]
use tokio_test as _;
