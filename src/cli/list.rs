//! The `list` command: show what the feed offers.

use anyhow::Result;
use clap::Parser;
use colored::Colorize;

use crate::config::Config;
use crate::feed;
use crate::installer::HttpTransport;

/// List available versions, newest first.
#[derive(Parser)]
pub struct ListCommand {
    /// Also print each version's download URL.
    #[arg(long)]
    urls: bool,
}

impl ListCommand {
    pub async fn execute(self, config: Config) -> Result<()> {
        let url = config.require_feed_url()?;
        let catalog = feed::fetch_feed(&HttpTransport::new(), url).await?;

        if catalog.is_empty() {
            println!("{}", "No versions available from the feed.".yellow());
            return Ok(());
        }

        let latest = catalog.latest().map(|e| e.identifier);
        for version in catalog.versions() {
            let marker = if latest.as_deref() == Some(version) {
                " (latest)".green().to_string()
            } else {
                String::new()
            };
            if self.urls {
                let url = catalog.get(version).unwrap_or_default();
                println!("{}{marker}  {}", version.bold(), url.dimmed());
            } else {
                println!("{}{marker}", version.bold());
            }
        }
        Ok(())
    }
}
