//! Validate-config command handler.

use crate::bootstrap::CliContext;
use crate::error::CliError;

/// Execute the validate-config command.
///
/// Loading the configuration already validated it; this prints what it
/// resolves to and runs the host constraint check.
pub async fn execute(ctx: &CliContext) -> Result<(), CliError> {
    let app = ctx.app();
    let config = app.config();

    println!("Configuration root: {}", config.config_root.display());
    println!("Storage:            {}", config.storage_dir().display());
    println!(
        "Token:              {}",
        if config.token.is_some() { "set" } else { "not set" }
    );
    println!("Country:            {}", config.country);
    println!("Release limit:      {}", config.release_limit);
    let categories: Vec<&str> = config
        .enabled_categories()
        .iter()
        .map(|c| c.as_str())
        .collect();
    println!("Categories:         {}", categories.join(", "));

    match app.check_constraints().await {
        Ok(()) => println!("Constraints:        ok"),
        Err(reason) => println!("Constraints:        failed ({reason})"),
    }
    Ok(())
}
