//! Main CLI parser and top-level argument handling.

use std::path::PathBuf;

use clap::Parser;

use crate::commands::Commands;

/// Command-line interface for inspecting a community store.
#[derive(Debug, Parser)]
#[command(name = "comstore")]
#[command(about = "Inspect and maintain a community store catalog")]
#[command(version)]
pub struct Cli {
    /// Configuration directory of the host platform
    #[arg(long = "config", env = "COMSTORE_CONFIG", global = true)]
    pub config_root: Option<PathBuf>,

    /// JSON file with the config entry (`data` and `options` maps)
    #[arg(long = "entry", env = "COMSTORE_ENTRY", global = true)]
    pub entry: Option<PathBuf>,

    /// Access token for the remote code host
    #[arg(long, env = "COMSTORE_TOKEN", global = true, hide_env_values = true)]
    pub token: Option<String>,

    /// Enable verbose/debug output
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use comstore_core::Category;

    #[test]
    fn test_cli_parser_builds() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_global_args() {
        let cli = Cli::parse_from([
            "comstore",
            "--config",
            "/srv/config",
            "--verbose",
            "list",
            "--category",
            "plugin",
            "--installed",
        ]);
        assert!(cli.verbose);
        assert_eq!(cli.config_root, Some(PathBuf::from("/srv/config")));
        assert_eq!(
            cli.command,
            Some(Commands::List {
                category: Some(Category::Plugin),
                installed: true,
            })
        );
    }

    #[test]
    fn test_check_path_and_unknown_category() {
        let cli = Cli::parse_from(["comstore", "check-path", "www/community/card"]);
        assert_eq!(
            cli.command,
            Some(Commands::CheckPath {
                path: PathBuf::from("www/community/card")
            })
        );

        let err = Cli::try_parse_from(["comstore", "list", "--category", "widget"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
