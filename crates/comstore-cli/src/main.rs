//! CLI entry point.
//!
//! Arguments are parsed, logging is set up, the adapters are wired in
//! bootstrap and the command is dispatched to its handler.

use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use comstore_cli::{Cli, CliConfig, CliError, Commands, bootstrap, handlers};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let Some(command) = cli.command.clone() else {
        Cli::command().print_help()?;
        return Ok(ExitCode::SUCCESS);
    };

    match run(&cli, command).await {
        Ok(code) => Ok(code),
        Err(e) => {
            eprintln!("Error: {e}");
            Ok(ExitCode::from(u8::try_from(e.exit_code()).unwrap_or(1)))
        }
    }
}

async fn run(cli: &Cli, command: Commands) -> Result<ExitCode, CliError> {
    let config = CliConfig::from_cli(cli)?.load().await?;
    let ctx = bootstrap(config);

    match command {
        Commands::List {
            category,
            installed,
        } => handlers::list::execute(&ctx, category, installed).await?,
        Commands::Summary => handlers::summary::execute(&ctx).await?,
        Commands::Compact => handlers::compact::execute(&ctx).await?,
        Commands::CheckPath { path } => {
            if !handlers::check_path::execute(&ctx, &path).await? {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::ValidateConfig => handlers::validate_config::execute(&ctx).await?,
        Commands::Tasks => handlers::tasks::execute(&ctx),
        Commands::Render { full_name, file } => {
            handlers::render::execute(&ctx, &full_name, &file).await?;
        }
    }
    Ok(ExitCode::SUCCESS)
}
