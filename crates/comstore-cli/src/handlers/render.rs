//! Render command handler.

use std::path::Path;

use comstore_core::render_template;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Render the template in `file` against the tracked repository
/// `full_name`.
pub async fn render(ctx: &CliContext, full_name: &str, file: &Path) -> Result<String, CliError> {
    let content = tokio::fs::read_to_string(file)
        .await
        .map_err(|e| CliError::Io {
            path: file.display().to_string(),
            message: e.to_string(),
        })?;

    ctx.restore().await?;
    let handle = ctx
        .app()
        .registry()
        .get_by_full_name(full_name)
        .ok_or_else(|| CliError::UnknownRepository(full_name.to_string()))?;
    let entity = handle.lock().await;
    Ok(render_template(&content, &entity))
}

/// Execute the render command.
pub async fn execute(ctx: &CliContext, full_name: &str, file: &Path) -> Result<(), CliError> {
    println!("{}", render(ctx, full_name, file).await?);
    Ok(())
}
