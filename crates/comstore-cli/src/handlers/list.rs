//! List command handler.

use comstore_core::{Category, RepositoryEntity};

use crate::bootstrap::CliContext;
use crate::error::CliError;
use crate::handlers::truncate;

/// One line of the listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Row {
    pub id: String,
    pub full_name: String,
    pub category: Category,
    pub installed: Option<String>,
    pub available: Option<String>,
    pub pending_update: bool,
}

impl Row {
    fn from_entity(entity: &RepositoryEntity) -> Self {
        Self {
            id: entity.id().unwrap_or("--").to_string(),
            full_name: entity.full_name().to_string(),
            category: entity.category(),
            installed: entity
                .data
                .installed
                .then(|| entity.display_installed_version().map(str::to_string))
                .flatten(),
            available: entity.display_available_version().map(str::to_string),
            pending_update: entity.pending_update(),
        }
    }
}

/// Rows for the repositories matching the filters, sorted by full name.
pub async fn rows(ctx: &CliContext, category: Option<Category>, installed_only: bool) -> Vec<Row> {
    let mut rows: Vec<Row> = ctx
        .app()
        .registry()
        .snapshot()
        .await
        .iter()
        .filter(|e| category.is_none_or(|c| e.category() == c))
        .filter(|e| !installed_only || e.data.installed)
        .map(Row::from_entity)
        .collect();
    rows.sort_by(|a, b| a.full_name.to_lowercase().cmp(&b.full_name.to_lowercase()));
    rows
}

/// Execute the list command.
pub async fn execute(
    ctx: &CliContext,
    category: Option<Category>,
    installed_only: bool,
) -> Result<(), CliError> {
    ctx.restore().await?;
    let rows = rows(ctx, category, installed_only).await;

    if rows.is_empty() {
        println!("No repositories found.");
        return Ok(());
    }

    println!("Found {} repository(ies):\n", rows.len());
    println!(
        "{:<12} {:<40} {:<14} {:<12} {:<12} Update",
        "ID", "Repository", "Category", "Installed", "Available"
    );
    println!("{}", "-".repeat(100));
    for row in rows {
        println!(
            "{:<12} {:<40} {:<14} {:<12} {:<12} {}",
            truncate(&row.id, 12),
            truncate(&row.full_name, 39),
            row.category,
            truncate(row.installed.as_deref().unwrap_or("--"), 12),
            truncate(row.available.as_deref().unwrap_or("--"), 12),
            if row.pending_update { "yes" } else { "" }
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bootstrap::bootstrap;
    use comstore_core::{Configuration, REPOSITORIES_DOCUMENT, StorePort};
    use comstore_fs::JsonFileStore;
    use serde_json::json;

    #[tokio::test]
    async fn test_rows_filter_and_sort() {
        let dir = tempfile::tempdir().unwrap();
        let config = Configuration::with_root(dir.path());
        JsonFileStore::new(config.storage_dir())
            .save(
                REPOSITORIES_DOCUMENT,
                &json!({
                    "3": {"full_name": "owner/zeta-card", "category": "plugin"},
                    "1": {"full_name": "owner/alpha", "category": "integration",
                          "installed": true, "version_installed": "1.4.0"},
                    "2": {"full_name": "owner/beta-card", "category": "plugin"}
                }),
            )
            .await
            .unwrap();
        let ctx = bootstrap(config);
        ctx.restore().await.unwrap();

        let plugins = rows(&ctx, Some(Category::Plugin), false).await;
        let names: Vec<&str> = plugins.iter().map(|r| r.full_name.as_str()).collect();
        assert_eq!(names, vec!["owner/beta-card", "owner/zeta-card"]);

        let installed = rows(&ctx, None, true).await;
        let alpha = installed
            .iter()
            .find(|r| r.full_name == "owner/alpha")
            .unwrap();
        assert_eq!(alpha.installed.as_deref(), Some("1.4.0"));
        assert_eq!(alpha.id, "1");
    }
}
