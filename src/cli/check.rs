//! The `check-for-update` command: the scheduled half of the staged flow.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::config::Config;
use crate::installer::session::CheckOutcome;
use crate::installer::{HttpTransport, UpdateSession, ZipExtractor};
use crate::lock::OsProcessTerminator;
use crate::utils::platform::Platform;

/// Check the feed for a newer build and stage it if found.
///
/// Meant to run unattended (cron, Task Scheduler). The live install is
/// never modified; a newer build is staged next to the update ledger and
/// waits for `apply-upgrade`.
#[derive(Parser)]
pub struct CheckCommand {}

impl CheckCommand {
    pub async fn execute(self, config: Config) -> Result<()> {
        let platform = Platform::current();
        let session = UpdateSession::new(
            config,
            platform,
            HttpTransport::new(),
            ZipExtractor,
            OsProcessTerminator::new(platform),
        );

        match session.check_for_update().await? {
            CheckOutcome::Disabled => {
                println!("{}", "Unattended updates are disabled in the configuration.".yellow());
            }
            CheckOutcome::AlreadyChecked => {
                println!("A recent update check already ran; nothing to do.");
            }
            CheckOutcome::AlreadyStaged { version } => {
                println!(
                    "{} {} is already staged; run {} to install it.",
                    "Version".bold(),
                    version.bold(),
                    "stager apply-upgrade".cyan()
                );
            }
            CheckOutcome::OnLatest { version } => {
                println!("{} ({}) is the newest build.", "Up to date".green().bold(), version);
            }
            CheckOutcome::Staged { version, location } => {
                println!(
                    "{} {} staged at {}; run {} to install it.",
                    "New version".green().bold(),
                    version.bold(),
                    location.display(),
                    "stager apply-upgrade".cyan()
                );
            }
        }
        Ok(())
    }
}
