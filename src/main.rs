//! stager CLI entry point.
//!
//! Parses command-line arguments, wires up logging, runs the selected
//! command, and maps failures onto the documented exit codes so wrapper
//! scripts and schedulers can tell failure categories apart.

use clap::Parser;
use colored::Colorize;
use stager_cli::cli::Cli;
use stager_cli::core::exit_code_for;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG takes precedence over the verbosity flags.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cli.log_directive()));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();

    // Set up colored output for Windows
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    if let Err(e) = cli.execute().await {
        eprintln!("{} {e:#}", "error:".red().bold());
        std::process::exit(exit_code_for(&e));
    }
}
