//! The `apply-upgrade` command: consume what `check-for-update` staged.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::config::Config;
use crate::installer::{HttpTransport, UpdateSession, ZipExtractor};
use crate::lock::OsProcessTerminator;
use crate::utils::platform::Platform;

/// Swap the staged build into the live directory.
///
/// Requires a prior successful `check-for-update` that staged a newer
/// build. The staged tree replaces the live one; the staging directory
/// and the update ledger are retired afterwards.
#[derive(Parser)]
pub struct ApplyCommand {}

impl ApplyCommand {
    pub async fn execute(self, config: Config) -> Result<()> {
        let platform = Platform::current();
        let session = UpdateSession::new(
            config,
            platform,
            HttpTransport::new(),
            ZipExtractor,
            OsProcessTerminator::new(platform),
        );
        session.apply_upgrade().await?;
        println!("{}", "Upgrade applied.".green().bold());
        Ok(())
    }
}
