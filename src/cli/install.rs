//! The `install` command: operator-driven install of a chosen version.
//!
//! Unlike the staged check/apply flow, `install` replaces the live tree in
//! one sitting. A backup is taken only when `--backup` is given: the
//! command is interactive by nature, and moving the previous tree aside
//! unasked would surprise operators pointing `--target` at scratch
//! directories.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::config::Config;
use crate::constants::VERSION_LATEST;
use crate::feed;
use crate::installer::{HttpTransport, InstallOptions, StagedInstaller, ZipExtractor};
use crate::utils::platform::Platform;

/// Download and install a version into the live directory.
#[derive(Parser)]
pub struct InstallCommand {
    /// Version to install; defaults to the newest the feed offers.
    pub version: Option<String>,

    /// Install into this directory instead of the configured one.
    #[arg(long)]
    pub target: Option<PathBuf>,

    /// Move the previous tree here before installing.
    #[arg(long)]
    pub backup: Option<PathBuf>,

    /// Keep the downloaded archive inside the install directory.
    #[arg(long)]
    pub keep_downloaded: bool,
}

impl InstallCommand {
    pub async fn execute(self, config: Config) -> Result<()> {
        let platform = Platform::current();
        let url = config.require_feed_url()?;
        let transport = HttpTransport::new();
        let catalog = feed::fetch_feed(&transport, url).await?;

        let version = self.version.as_deref().unwrap_or(VERSION_LATEST);
        let target = match self.target {
            Some(target) => target,
            None => config.install_dir(platform)?,
        };
        let options = InstallOptions {
            target: target.clone(),
            backup: self.backup,
            keep_downloaded: self.keep_downloaded || config.keep_downloaded,
        };

        let installer =
            StagedInstaller::new(transport, ZipExtractor, platform, config.spot_checks.clone());
        let outcome = installer.install(&catalog, version, &options).await?;

        println!(
            "{} {} {} {} ({} bytes in {:.1}s)",
            "Installed".green().bold(),
            outcome.version.bold(),
            "into".dimmed(),
            target.display(),
            outcome.download.bytes_written,
            outcome.download.elapsed.as_secs_f64()
        );
        Ok(())
    }
}
