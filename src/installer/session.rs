//! Unattended update session: check, stage, and apply.
//!
//! `check-for-update` runs the full decision chain under the cross-process
//! lock: read the installed fingerprint, resolve the newest available
//! version (from the feed, or from a shared directory of pre-staged
//! versions), honor the ledger's check cadence, and when a newer build
//! exists stage it into its own directory next to the ledger. The live
//! tree is copied to the backup location but NOT touched otherwise.
//!
//! `apply-upgrade` consumes what a previous check staged: it replaces the
//! live tree with the staged one and retires both the staging directory
//! and the ledger.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use regex::Regex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::constants::{LEDGER_FILE, LOCK_FILE};
use crate::core::StagerError;
use crate::feed::{self, VersionCatalog, extract_build_number};
use crate::ledger::{self, UpdateLedger};
use crate::lock::{ProcessTerminator, UpdateLock};
use crate::utils::fs as fsutil;
use crate::utils::platform::Platform;

use super::{ArchiveExtractor, InstallOptions, StagedInstaller, Transport};

/// What a completed update check decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    /// Unattended updates are switched off in the configuration.
    Disabled,
    /// A previous check is still within its validity window.
    AlreadyChecked,
    /// The newest version is already staged and waiting to be applied.
    AlreadyStaged { version: String },
    /// The installed build is the newest available.
    OnLatest { version: String },
    /// A newer version was staged and is ready for `apply-upgrade`.
    Staged { version: String, location: PathBuf },
}

/// One locked update session over a configured product.
#[derive(Debug)]
pub struct UpdateSession<T, E, K> {
    config: Config,
    platform: Platform,
    transport: T,
    extractor: E,
    terminator: K,
}

impl<T, E, K> UpdateSession<T, E, K>
where
    T: Transport,
    E: ArchiveExtractor + Clone,
    K: ProcessTerminator,
{
    pub fn new(config: Config, platform: Platform, transport: T, extractor: E, terminator: K) -> Self {
        Self { config, platform, transport, extractor, terminator }
    }

    fn staging_root(&self) -> Result<PathBuf> {
        self.config.staging_root()
    }

    /// The transport this session talks through.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Check whether a newer build exists and stage it if so.
    ///
    /// Holds the update lock for the whole check. The remote feed is
    /// consulted on every invocation; the ledger's freshness window only
    /// short-circuits the staging decision, never the fetch, so a feed
    /// outage is noticed even between scheduled checks.
    pub async fn check_for_update(&self) -> Result<CheckOutcome> {
        let staging_root = self.staging_root()?;
        fsutil::ensure_dir(&staging_root)?;
        let _lock =
            UpdateLock::acquire(&staging_root.join(LOCK_FILE), &self.terminator).await?;

        let install_dir = self.config.install_dir(self.platform)?;
        let Some(current) = super::fingerprint::read_current_version(&install_dir).await? else {
            bail!(
                "no installed version recorded in {}; cannot compare against the feed",
                install_dir.display()
            );
        };

        if !self.config.auto_update {
            info!("unattended updates are disabled in the configuration");
            return Ok(CheckOutcome::Disabled);
        }

        let latest = self.resolve_latest().await?;
        debug!(current = %current, latest = %latest.identifier, "versions resolved");

        let ledger_path = staging_root.join(LEDGER_FILE);
        if !ledger::needs_fresh_check(&ledger_path, SystemTime::now()).await? {
            if let Some(previous) = UpdateLedger::load(&ledger_path).await? {
                if previous.is_already_staged(&latest.identifier) {
                    info!(version = %latest.identifier, "newest version is already staged");
                    return Ok(CheckOutcome::AlreadyStaged { version: latest.identifier });
                }
            }
            info!("previous update check still stands");
            return Ok(CheckOutcome::AlreadyChecked);
        }

        let current_build = extract_build_number(&current)?;
        let latest_build = extract_build_number(&latest.identifier)?;
        if latest_build <= current_build {
            // No ledger is written here: the ledger records a staging, and
            // its freshness window must not stand between a release
            // published tomorrow and the next scheduled check.
            info!(version = %current, "installed build is current");
            return Ok(CheckOutcome::OnLatest { version: current });
        }

        info!(
            from = %current,
            to = %latest.identifier,
            "newer build available; staging"
        );
        self.purge_stage_dirs(&staging_root, &latest.identifier).await?;

        let stage_dir = staging_root.join(&latest.identifier);
        match &latest.source {
            LatestSource::Feed { catalog } => {
                let installer = StagedInstaller::new(
                    &self.transport,
                    self.extractor.clone(),
                    self.platform,
                    self.config.spot_checks.clone(),
                );
                let options = InstallOptions {
                    target: stage_dir.clone(),
                    backup: None,
                    keep_downloaded: false,
                };
                installer.install(catalog, &latest.identifier, &options).await?;
            }
            LatestSource::Directory { path } => {
                copy_tree(path, &stage_dir).await?;
            }
        }

        // The live tree stays in service; only a copy goes to the backup
        // location so apply-upgrade has something to fall back on.
        let backup = self.config.backup_dir(self.platform)?;
        if let Some(backup) = &backup {
            info!(to = %backup.display(), "copying live install to backup");
            let install_dir = install_dir.clone();
            let backup = backup.clone();
            tokio::task::spawn_blocking(move || -> Result<()> {
                fsutil::remove_dir_if_exists(&backup)?;
                fsutil::copy_dir_all(&install_dir, &backup)
            })
            .await
            .context("spawn_blocking panicked")??;
        }

        self.record_check(&ledger_path, &current, &latest, &stage_dir, backup.as_deref())
            .await?;

        Ok(CheckOutcome::Staged { version: latest.identifier.clone(), location: stage_dir })
    }

    /// Replace the live tree with what a previous check staged.
    ///
    /// The staging directory and the ledger are retired on success. There
    /// is no rollback: once the live tree is removed, a failed copy leaves
    /// the backup from the check phase as the recovery path.
    pub async fn apply_upgrade(&self) -> Result<()> {
        let staging_root = self.staging_root()?;
        let _lock =
            UpdateLock::acquire(&staging_root.join(LOCK_FILE), &self.terminator).await?;

        let ledger_path = staging_root.join(LEDGER_FILE);
        let Some(ledger) = UpdateLedger::load(&ledger_path).await? else {
            bail!("no staged update found; run check-for-update first");
        };
        let stage_dir = PathBuf::from(&ledger.update_location);
        if ledger.update_location.is_empty() || !stage_dir.is_dir() {
            bail!(
                "staged update at '{}' is missing; run check-for-update again",
                ledger.update_location
            );
        }

        let install_dir = self.config.install_dir(self.platform)?;
        info!(
            version = %ledger.latest_version_found,
            into = %install_dir.display(),
            "applying staged upgrade"
        );

        let stage = stage_dir.clone();
        let install = install_dir.clone();
        tokio::task::spawn_blocking(move || -> Result<()> {
            fsutil::remove_dir_if_exists(&install)?;
            fsutil::copy_dir_all(&stage, &install)?;
            fsutil::remove_dir_if_exists(&stage)
        })
        .await
        .context("spawn_blocking panicked")??;

        if let Err(e) = tokio::fs::remove_file(&ledger_path).await {
            warn!(error = %e, "could not remove update status after apply");
        }

        info!(version = %ledger.latest_version_found, "upgrade applied");
        Ok(())
    }

    /// Newest available version, from the shared directory when network
    /// install mode is configured, otherwise from the feed.
    async fn resolve_latest(&self) -> Result<LatestVersion> {
        if let Some(dir) = &self.config.update_from_dir {
            return latest_from_directory(Path::new(dir), &self.config.product);
        }
        let url = self.config.require_feed_url()?;
        let catalog = feed::fetch_feed(&self.transport, url).await?;
        let entry = catalog.latest().ok_or_else(|| StagerError::FeedFormat {
            url: url.to_string(),
            reason: "feed listed no versions".to_string(),
        })?;
        Ok(LatestVersion {
            identifier: entry.identifier,
            source: LatestSource::Feed { catalog },
        })
    }

    /// Remove leftovers of previous staging runs: any directory under the
    /// staging root named like a version of this product, except the one
    /// about to be staged.
    async fn purge_stage_dirs(&self, staging_root: &Path, keep: &str) -> Result<()> {
        let pattern = stage_dir_pattern(&self.config.product)?;
        let mut entries = tokio::fs::read_dir(staging_root)
            .await
            .with_context(|| format!("Failed to read {}", staging_root.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_dir() {
                continue;
            }
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name != keep && pattern.is_match(&name) {
                info!(dir = %name, "removing leftover staging directory");
                let path = entry.path();
                tokio::task::spawn_blocking(move || fsutil::remove_dir_if_exists(&path))
                    .await
                    .context("spawn_blocking panicked")??;
            }
        }
        Ok(())
    }

    /// Write the ledger for a completed staging. Only stagings are
    /// recorded; an on-latest check leaves no ledger behind.
    async fn record_check(
        &self,
        ledger_path: &Path,
        current: &str,
        latest: &LatestVersion,
        stage_dir: &Path,
        backup: Option<&Path>,
    ) -> Result<()> {
        let now = UpdateLedger::timestamp_now();
        let ledger = UpdateLedger {
            last_checked_at: now.clone(),
            current_version_was: current.to_string(),
            latest_version_found: latest.identifier.clone(),
            current_build_number: extract_build_number(current)?,
            latest_build_number: extract_build_number(&latest.identifier)?,
            is_on_latest: false,
            download_url: latest.download_url().unwrap_or_default(),
            update_location: stage_dir.display().to_string(),
            backup_location: backup.map(|p| p.display().to_string()).unwrap_or_default(),
            download_finished_at: now,
        };
        ledger.save(ledger_path).await
    }
}

/// The resolved newest version together with where it comes from.
#[derive(Debug)]
struct LatestVersion {
    identifier: String,
    source: LatestSource,
}

#[derive(Debug)]
enum LatestSource {
    /// Resolved from the remote feed; the catalog carries the URL.
    Feed { catalog: VersionCatalog },
    /// Resolved from a shared directory of pre-staged version trees.
    Directory { path: PathBuf },
}

impl LatestVersion {
    fn download_url(&self) -> Option<String> {
        match &self.source {
            LatestSource::Feed { catalog } => {
                catalog.get(&self.identifier).map(ToOwned::to_owned)
            }
            LatestSource::Directory { path } => Some(path.display().to_string()),
        }
    }
}

/// Directory-name pattern for staged versions of `product`.
fn stage_dir_pattern(product: &str) -> Result<Regex> {
    Regex::new(&format!("^{}-v[0-9]+\\.[0-9]+_[0-9]+$", regex::escape(product)))
        .context("invalid product name for staging pattern")
}

/// Scan a shared directory of pre-staged version trees and pick the one
/// with the highest build number.
fn latest_from_directory(dir: &Path, product: &str) -> Result<LatestVersion> {
    let pattern = stage_dir_pattern(product)?;
    let mut best: Option<(u32, String, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read update directory: {}", dir.display()))?
    {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let name = entry.file_name();
        let name = name.to_string_lossy().into_owned();
        if !pattern.is_match(&name) {
            continue;
        }
        let build = extract_build_number(&name)?;
        if best.as_ref().is_none_or(|(b, _, _)| build > *b) {
            best = Some((build, name, entry.path()));
        }
    }
    let (_, identifier, path) = best.ok_or_else(|| StagerError::VersionNotFound {
        version: format!("{product} (in {})", dir.display()),
    })?;
    Ok(LatestVersion { identifier, source: LatestSource::Directory { path } })
}

/// Copy a version tree into the staging area.
async fn copy_tree(from: &Path, to: &Path) -> Result<()> {
    let from = from.to_path_buf();
    let to = to.to_path_buf();
    tokio::task::spawn_blocking(move || -> Result<()> {
        fsutil::remove_dir_if_exists(&to)?;
        fsutil::copy_dir_all(&from, &to)
    })
    .await
    .context("spawn_blocking panicked")?
}
