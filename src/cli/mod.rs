//! Command-line interface for stager.
//!
//! The CLI is a thin shell over the library: each subcommand module parses
//! its own arguments with clap and delegates to the feed, installer, and
//! session layers. Global flags control logging verbosity and the config
//! file location; everything product-specific lives in the configuration.

pub mod check;
pub mod install;
pub mod list;
pub mod upgrade;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::config::Config;

/// Top-level command-line interface.
///
/// Handles global flags and delegates to subcommands. Subcommand names
/// follow the update lifecycle: `list` and `install` for operator-driven
/// installs, `check-for-update` and `apply-upgrade` for the unattended
/// staged flow.
#[derive(Parser)]
#[command(
    name = "stager",
    about = "Staged-update installer for a managed product distribution",
    version,
    author,
    long_about = "stager resolves available versions from a remote feed, installs them \
                  with backup and fingerprinting, and runs the staged check/apply update \
                  cycle suitable for unattended scheduling."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output (equivalent to `RUST_LOG=debug`).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Suppress all output except errors, for scripts and schedulers.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the configuration file. Defaults to `~/.stager/config.toml`
    /// or the `STAGER_CONFIG_PATH` environment variable.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

/// Available subcommands.
#[derive(Subcommand)]
pub enum Commands {
    /// List the versions the feed currently offers.
    List(list::ListCommand),
    /// Download and install a version into the live directory.
    Install(install::InstallCommand),
    /// Check the feed for a newer build and stage it if found.
    CheckForUpdate(check::CheckCommand),
    /// Swap a previously staged build into the live directory.
    ApplyUpgrade(upgrade::ApplyCommand),
}

impl Cli {
    /// Default log directive implied by the verbosity flags.
    #[must_use]
    pub fn log_directive(&self) -> &'static str {
        if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            "info"
        }
    }

    /// Load configuration and run the selected subcommand.
    pub async fn execute(self) -> Result<()> {
        let config = Config::load_with_optional(self.config).await?;
        match self.command {
            Commands::List(cmd) => cmd.execute(config).await,
            Commands::Install(cmd) => cmd.execute(config).await,
            Commands::CheckForUpdate(cmd) => cmd.execute(config).await,
            Commands::ApplyUpgrade(cmd) => cmd.execute(config).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_subcommands_and_global_flags() {
        let cli = Cli::parse_from(["stager", "list"]);
        assert!(matches!(cli.command, Commands::List(_)));
        assert_eq!(cli.log_directive(), "info");

        let cli = Cli::parse_from(["stager", "-v", "check-for-update"]);
        assert!(matches!(cli.command, Commands::CheckForUpdate(_)));
        assert_eq!(cli.log_directive(), "debug");

        let cli = Cli::parse_from(["stager", "--quiet", "apply-upgrade"]);
        assert!(matches!(cli.command, Commands::ApplyUpgrade(_)));
        assert_eq!(cli.log_directive(), "error");
    }

    #[test]
    fn install_accepts_version_and_options() {
        let cli = Cli::parse_from([
            "stager",
            "install",
            "acme-core-v1.9_0400",
            "--backup",
            "/tmp/backup",
            "--keep-downloaded",
        ]);
        let Commands::Install(cmd) = cli.command else {
            panic!("expected install command");
        };
        assert_eq!(cmd.version.as_deref(), Some("acme-core-v1.9_0400"));
        assert!(cmd.keep_downloaded);
        assert!(cmd.backup.is_some());
    }
}
