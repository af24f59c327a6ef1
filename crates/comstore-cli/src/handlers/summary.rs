//! Summary command handler.

use comstore_core::Category;

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Counts shown by `summary`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Summary {
    pub new: bool,
    pub total: usize,
    pub installed: usize,
    pub pending_updates: usize,
    pub per_category: Vec<(Category, usize)>,
    pub archived: usize,
    pub ignored: usize,
    pub renamed: usize,
}

pub async fn summarize(ctx: &CliContext) -> Summary {
    let app = ctx.app();
    let entities = app.registry().snapshot().await;
    let common = app.state().common();

    let per_category = Category::ALL
        .into_iter()
        .map(|c| (c, entities.iter().filter(|e| e.category() == c).count()))
        .filter(|(_, count)| *count > 0)
        .collect();

    Summary {
        new: app.state().is_new(),
        total: entities.len(),
        installed: entities.iter().filter(|e| e.data.installed).count(),
        pending_updates: entities.iter().filter(|e| e.pending_update()).count(),
        per_category,
        archived: common.archived_repositories.len(),
        ignored: common.ignored_repositories.len(),
        renamed: common.renamed_repositories.len(),
    }
}

/// Execute the summary command.
pub async fn execute(ctx: &CliContext) -> Result<(), CliError> {
    ctx.restore().await?;
    let summary = summarize(ctx).await;

    if summary.new {
        println!("No persisted data found, showing the bundled default list.");
    }
    println!("Repositories:    {}", summary.total);
    for (category, count) in &summary.per_category {
        println!("  {category:<14} {count}");
    }
    println!("Installed:       {}", summary.installed);
    println!("Pending updates: {}", summary.pending_updates);
    println!("Archived:        {}", summary.archived);
    println!("Ignored:         {}", summary.ignored);
    println!("Renamed:         {}", summary.renamed);
    Ok(())
}
