//! Configuration for the stager installer.
//!
//! One TOML file at `~/.stager/config.toml` (overridable via the
//! `STAGER_CONFIG_PATH` environment variable) describes the single product
//! this host manages:
//!
//! ```toml
//! product = "acme-core"
//! feed_url = "https://downloads.example.com/releases/index.html"
//! install_dir = "~/products/acme-core"
//! backup_dir = "~/products/acme-core.BAK"
//! keep_downloaded = false
//! auto_update = true
//! spot_checks = ["bin/", "lib/"]
//! ```
//!
//! Every field has a sensible default except `feed_url`, which must be set
//! before `list`, `install`, or `check-for-update` can talk to a feed.
//! `update_from_dir` switches check-for-update into network-install mode:
//! the "feed" becomes a shared directory of pre-staged version directories.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tokio::fs;

use crate::utils::platform::{self, Platform};

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "STAGER_CONFIG_PATH";

fn default_product() -> String {
    "app-core".to_string()
}

fn default_auto_update() -> bool {
    true
}

fn default_spot_checks() -> Vec<String> {
    vec!["bin/".to_string(), "lib/".to_string()]
}

/// User configuration for the managed product installation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name of the managed product. Drives the default directories, the
    /// staging-directory naming pattern, and build-number extraction.
    #[serde(default = "default_product")]
    pub product: String,

    /// Feed URL listing available distribution versions. Required for any
    /// command that resolves a catalog.
    #[serde(default)]
    pub feed_url: Option<String>,

    /// Live install directory. Defaults to the per-platform product base.
    #[serde(default)]
    pub install_dir: Option<String>,

    /// Backup directory for the pre-upgrade safety copy. `None` falls back
    /// to a `.BAK` sibling of the install directory; the check phase
    /// always takes its safe copy. Only the `install` command's
    /// `--backup` flag controls whether a direct install backs up.
    #[serde(default)]
    pub backup_dir: Option<String>,

    /// Keep the downloaded archive inside the install directory instead of
    /// deleting it after extraction.
    #[serde(default)]
    pub keep_downloaded: bool,

    /// Kill switch for unattended update checks.
    #[serde(default = "default_auto_update")]
    pub auto_update: bool,

    /// When set, check-for-update resolves the latest version from this
    /// directory of pre-staged version directories instead of the feed.
    #[serde(default)]
    pub update_from_dir: Option<String>,

    /// Relative path prefixes the post-install spot check looks for.
    #[serde(default = "default_spot_checks")]
    pub spot_checks: Vec<String>,

    /// Override for the staging area root. Defaults to `~/.stager/install`.
    #[serde(default)]
    pub staging_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            product: default_product(),
            feed_url: None,
            install_dir: None,
            backup_dir: None,
            keep_downloaded: false,
            auto_update: default_auto_update(),
            update_from_dir: None,
            spot_checks: default_spot_checks(),
            staging_dir: None,
        }
    }
}

impl Config {
    /// Load the configuration from the default path, falling back to
    /// defaults when no file exists yet.
    pub async fn load() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// Load from an explicit path, or the default path when `None`.
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        match path {
            Some(p) => Self::load_from(&p).await,
            None => Self::load().await,
        }
    }

    /// Load and parse the configuration at `path`.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Serialize and write the configuration to `path`.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config to {}", path.display()))
    }

    /// Default config file location: `$STAGER_CONFIG_PATH` when set,
    /// otherwise `~/.stager/config.toml`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            return Ok(PathBuf::from(path));
        }
        Ok(platform::stager_home()?.join("config.toml"))
    }

    /// The configured feed URL, or a `Configuration` error when unset.
    pub fn require_feed_url(&self) -> Result<&str> {
        self.feed_url.as_deref().filter(|u| !u.trim().is_empty()).ok_or_else(|| {
            crate::core::StagerError::Configuration {
                reason: "feed_url is not configured".to_string(),
            }
            .into()
        })
    }

    /// Resolved live install directory, with `~`/env expansion applied.
    pub fn install_dir(&self, platform: Platform) -> Result<PathBuf> {
        match &self.install_dir {
            Some(dir) => expand_path(dir),
            None => platform::default_install_dir(platform, &self.product),
        }
    }

    /// Resolved backup directory. Always yields a path: the configured one
    /// or the per-platform `<product>.BAK` default.
    pub fn backup_dir(&self, platform: Platform) -> Result<Option<PathBuf>> {
        match &self.backup_dir {
            Some(dir) => Ok(Some(expand_path(dir)?)),
            None => Ok(Some(platform::default_backup_dir(platform, &self.product)?)),
        }
    }

    /// Root of the staging area, holding the lock, the ledger, and the
    /// per-version staging directories: `~/.stager/install/` unless
    /// overridden by `staging_dir`.
    pub fn staging_root(&self) -> Result<PathBuf> {
        match &self.staging_dir {
            Some(dir) => expand_path(dir),
            None => Ok(platform::stager_home()?.join("install")),
        }
    }
}

/// Expand `~/` and environment variables in a configured path.
fn expand_path(raw: &str) -> Result<PathBuf> {
    let expanded = shellexpand::full(raw)
        .with_context(|| format!("Failed to expand path: {raw}"))?;
    Ok(PathBuf::from(expanded.into_owned()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn round_trips_through_toml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");

        let config = Config {
            product: "acme-core".to_string(),
            feed_url: Some("https://downloads.example.com/index.html".to_string()),
            keep_downloaded: true,
            ..Config::default()
        };
        config.save_to(&path).await.unwrap();

        let loaded = Config::load_from(&path).await.unwrap();
        assert_eq!(loaded.product, "acme-core");
        assert_eq!(
            loaded.feed_url.as_deref(),
            Some("https://downloads.example.com/index.html")
        );
        assert!(loaded.keep_downloaded);
        assert!(loaded.auto_update);
    }

    #[tokio::test]
    async fn missing_fields_take_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        tokio::fs::write(&path, "product = \"acme-core\"\n").await.unwrap();

        let loaded = Config::load_from(&path).await.unwrap();
        assert!(loaded.feed_url.is_none());
        assert!(!loaded.keep_downloaded);
        assert!(loaded.auto_update);
        assert_eq!(loaded.spot_checks, vec!["bin/", "lib/"]);
    }

    #[test]
    fn backup_dir_defaults_to_bak_sibling() {
        let config = Config { product: "acme-core".to_string(), ..Config::default() };
        let backup = config.backup_dir(Platform::Linux).unwrap().unwrap();
        assert!(backup.ends_with("products/acme-core.BAK"));

        let config = Config {
            backup_dir: Some("/srv/backups/acme".to_string()),
            ..Config::default()
        };
        let backup = config.backup_dir(Platform::Linux).unwrap().unwrap();
        assert_eq!(backup, PathBuf::from("/srv/backups/acme"));
    }

    #[test]
    fn require_feed_url_rejects_unset_and_blank() {
        let config = Config::default();
        assert!(config.require_feed_url().is_err());

        let config = Config {
            feed_url: Some("   ".to_string()),
            ..Config::default()
        };
        assert!(config.require_feed_url().is_err());

        let config = Config {
            feed_url: Some("https://example.com/v.jsonl".to_string()),
            ..Config::default()
        };
        assert_eq!(
            config.require_feed_url().unwrap(),
            "https://example.com/v.jsonl"
        );
    }
}
