//! Command line interface

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use sui_update::version::VERSION_LINE;

#[derive(Parser, Debug)]
#[command(name = "sui-update")]
#[command(about = "Router firmware update endpoint (CGI)", long_about = None)]
#[command(version = VERSION_LINE)]
pub struct Cli {
    /// Config file (default: $SUI_UPDATE_CONFIG, then /etc/sui/update.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Anti-forgery token echoed in every JSON response
    #[arg(long, global = true, default_value = "")]
    pub xsrf: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Check for, download, or apply a firmware update. Request body on stdin.
    Update,

    /// Send the last upgrade log as an attachment
    UpdateLog,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_update() {
        let cli = Cli::try_parse_from(["sui-update", "--xsrf", "tok", "update"]).unwrap();
        assert_eq!(cli.command, Command::Update);
        assert_eq!(cli.xsrf, "tok");
        assert!(cli.config.is_none());
    }

    #[test]
    fn test_parse_update_log_with_config() {
        let cli = Cli::try_parse_from([
            "sui-update",
            "update-log",
            "--config",
            "/tmp/update.toml",
        ])
        .unwrap();
        assert_eq!(cli.command, Command::UpdateLog);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/update.toml")));
    }

    #[test]
    fn test_subcommand_required() {
        assert!(Cli::try_parse_from(["sui-update", "--xsrf", "tok"]).is_err());
    }
}
