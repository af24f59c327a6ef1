//! Compact command handler.
//!
//! Restores the store and writes it back, which drops duplicate global
//! entries and fields that hold their default value. Every record is kept,
//! whatever categories the configuration enables.

use comstore_core::WriteScope;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Execute the compact command.
pub async fn execute(ctx: &CliContext) -> Result<(), CliError> {
    ctx.restore().await?;
    ctx.app().data().write_scoped(true, WriteScope::All).await?;
    println!(
        "Wrote {} repositories to {}",
        ctx.app().registry().len(),
        ctx.app().config().storage_dir().display()
    );
    Ok(())
}
