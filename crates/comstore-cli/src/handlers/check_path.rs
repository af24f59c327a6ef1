//! Check-path command handler.

use std::path::{Path, PathBuf};

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// `path` as given when absolute, otherwise below the configuration root.
pub fn resolve(ctx: &CliContext, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        ctx.app().config().config_root.join(path)
    }
}

/// Execute the check-path command. Returns whether the path exists.
pub async fn execute(ctx: &CliContext, path: &Path) -> Result<bool, CliError> {
    let resolved = resolve(ctx, path);
    let exists = ctx.app().check_local_path(&resolved).await;
    if exists {
        println!("{} exists", resolved.display());
    } else {
        println!("{} does not exist", resolved.display());
    }
    Ok(exists)
}
