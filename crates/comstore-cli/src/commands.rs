//! Available commands.

use std::path::PathBuf;

use clap::Subcommand;
use comstore_core::Category;

#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Commands {
    /// List tracked repositories from the persisted store
    List {
        /// Only show this category
        #[arg(short, long)]
        category: Option<Category>,
        /// Only show installed repositories
        #[arg(short, long)]
        installed: bool,
    },

    /// Restore the store and print a summary of its state
    Summary,

    /// Rewrite the store in its normalized form
    Compact,

    /// Report whether a path exists, relative to the configuration directory
    CheckPath {
        path: PathBuf,
    },

    /// Validate the configuration and show what it enables
    ValidateConfig,

    /// Show the background tasks and when they run
    Tasks,

    /// Render an info page template against a tracked repository
    Render {
        /// Repository full name, `owner/name`
        full_name: String,
        /// Template file
        file: PathBuf,
    },
}
