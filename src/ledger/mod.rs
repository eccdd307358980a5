//! Update status ledger.
//!
//! One plain-text file, `update.status` under the staging root, records the
//! outcome of the most recent update check as `key=value` lines. It is the
//! contract between `check-for-update` (which writes it after staging a
//! newer version) and `apply-upgrade` (which consumes and then deletes it).
//!
//! Freshness drives the check cadence: a ledger older than seven days is
//! discarded and a full check runs; a younger one means the last check
//! still stands and the current check aborts. Inside the first six hours
//! the repeat is additionally noted in the log.

use std::path::Path;
use std::time::SystemTime;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{debug, error, info};

use crate::constants::{LEDGER_RECENT_AGE, LEDGER_STALE_AGE};

/// Ledger keys, in the order they are written.
const KEYS: [&str; 10] = [
    "lastCheckedAt",
    "currentVersionWas",
    "latestVersionFound",
    "currentBuildNumber",
    "latestBuildNumber",
    "isOnLatest",
    "downloadUrl",
    "updateLocation",
    "backupLocation",
    "downloadFinishedAt",
];

/// Outcome of one completed update check.
///
/// Timestamps are RFC 3339 strings; build numbers are the extracted
/// integers, not the full version identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateLedger {
    /// When the check ran.
    pub last_checked_at: String,
    /// Version installed at check time (from the fingerprint file).
    pub current_version_was: String,
    /// Newest version the feed offered.
    pub latest_version_found: String,
    /// Build number of the installed version.
    pub current_build_number: u32,
    /// Build number of the newest feed version.
    pub latest_build_number: u32,
    /// Whether the installed version already was the newest.
    pub is_on_latest: bool,
    /// Where the newer archive was fetched from.
    pub download_url: String,
    /// Staging directory holding the extracted newer version.
    pub update_location: String,
    /// Where the pre-swap copy of the live install went.
    pub backup_location: String,
    /// When the staging download completed.
    pub download_finished_at: String,
}

impl UpdateLedger {
    /// Current timestamp in the format the ledger stores.
    #[must_use]
    pub fn timestamp_now() -> String {
        Utc::now().to_rfc3339()
    }

    /// Serialize as `key=value` lines in the fixed key order.
    #[must_use]
    pub fn to_contents(&self) -> String {
        let values = [
            self.last_checked_at.clone(),
            self.current_version_was.clone(),
            self.latest_version_found.clone(),
            self.current_build_number.to_string(),
            self.latest_build_number.to_string(),
            self.is_on_latest.to_string(),
            self.download_url.clone(),
            self.update_location.clone(),
            self.backup_location.clone(),
            self.download_finished_at.clone(),
        ];
        KEYS.iter()
            .zip(values)
            .map(|(k, v)| format!("{k}={v}\n"))
            .collect()
    }

    /// Parse ledger contents.
    ///
    /// Values may themselves contain `=`; only the first one splits key
    /// from value. A line with no `=` at all invalidates the whole ledger:
    /// the error is logged and an empty ledger returned, so the next check
    /// proceeds as if nothing were recorded.
    #[must_use]
    pub fn from_contents(contents: &str) -> Self {
        let mut ledger = Self::default();
        for line in contents.lines().filter(|l| !l.trim().is_empty()) {
            let Some((key, value)) = line.split_once('=') else {
                error!(line, "malformed update status line; discarding ledger");
                return Self::default();
            };
            match key {
                "lastCheckedAt" => ledger.last_checked_at = value.to_string(),
                "currentVersionWas" => ledger.current_version_was = value.to_string(),
                "latestVersionFound" => ledger.latest_version_found = value.to_string(),
                "currentBuildNumber" => {
                    ledger.current_build_number = value.parse().unwrap_or_default();
                }
                "latestBuildNumber" => {
                    ledger.latest_build_number = value.parse().unwrap_or_default();
                }
                "isOnLatest" => ledger.is_on_latest = value.parse().unwrap_or_default(),
                "downloadUrl" => ledger.download_url = value.to_string(),
                "updateLocation" => ledger.update_location = value.to_string(),
                "backupLocation" => ledger.backup_location = value.to_string(),
                "downloadFinishedAt" => ledger.download_finished_at = value.to_string(),
                other => debug!(key = other, "ignoring unknown update status key"),
            }
        }
        ledger
    }

    /// Write the ledger to `path`.
    pub async fn save(&self, path: &Path) -> Result<()> {
        tokio::fs::write(path, self.to_contents())
            .await
            .with_context(|| format!("Failed to write update status to {}", path.display()))
    }

    /// Read the ledger at `path`. `Ok(None)` when no ledger exists.
    pub async fn load(path: &Path) -> Result<Option<Self>> {
        match tokio::fs::read_to_string(path).await {
            Ok(contents) => Ok(Some(Self::from_contents(&contents))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read update status from {}", path.display())),
        }
    }

    /// Whether a newer-version staging recorded against `latest` is still
    /// in place: the recorded latest matches (case-insensitively) and the
    /// staged directory still exists.
    #[must_use]
    pub fn is_already_staged(&self, latest: &str) -> bool {
        !self.update_location.is_empty()
            && self.latest_version_found.eq_ignore_ascii_case(latest)
            && Path::new(&self.update_location).is_dir()
    }
}

/// Whether a ledger written at `modified` has expired at `now` (strictly
/// older than seven days).
#[must_use]
pub fn is_expired(modified: SystemTime, now: SystemTime) -> bool {
    match now.duration_since(modified) {
        Ok(age) => age > LEDGER_STALE_AGE,
        Err(_) => false,
    }
}

/// Whether the ledger is young enough that the repeat check is worth a
/// log line (under six hours).
#[must_use]
pub fn is_recent(modified: SystemTime, now: SystemTime) -> bool {
    match now.duration_since(modified) {
        Ok(age) => age < LEDGER_RECENT_AGE,
        Err(_) => true,
    }
}

/// Decide whether the ledger at `path` forces a fresh check.
///
/// Missing ledger: fresh check. Expired ledger: deleted, fresh check.
/// Otherwise the previous check still stands; inside the recent window the
/// repeat is noted in the log.
pub async fn needs_fresh_check(path: &Path, now: SystemTime) -> Result<bool> {
    let metadata = match tokio::fs::metadata(path).await {
        Ok(m) => m,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to stat update status: {}", path.display()));
        }
    };
    let modified = metadata
        .modified()
        .with_context(|| format!("Failed to read mtime of {}", path.display()))?;

    if is_expired(modified, now) {
        debug!(path = %path.display(), "update status expired; discarding");
        tokio::fs::remove_file(path)
            .await
            .with_context(|| format!("Failed to remove expired status: {}", path.display()))?;
        return Ok(true);
    }
    if is_recent(modified, now) {
        info!("an update check already ran within the last few hours");
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn sample() -> UpdateLedger {
        UpdateLedger {
            last_checked_at: "2026-08-27T10:00:00+00:00".to_string(),
            current_version_was: "acme-core-v1.9_0398".to_string(),
            latest_version_found: "acme-core-v1.9_0400".to_string(),
            current_build_number: 398,
            latest_build_number: 400,
            is_on_latest: false,
            download_url: "https://dl/0400.zip?sig=a=b".to_string(),
            update_location: "/tmp/stage/acme-core-v1.9_0400".to_string(),
            backup_location: "/tmp/backup".to_string(),
            download_finished_at: "2026-08-27T10:01:30+00:00".to_string(),
        }
    }

    #[test]
    fn round_trips_through_contents() {
        let ledger = sample();
        let parsed = UpdateLedger::from_contents(&ledger.to_contents());
        assert_eq!(parsed, ledger);
    }

    #[test]
    fn values_may_contain_equals_signs() {
        let parsed = UpdateLedger::from_contents("downloadUrl=https://dl/x.zip?sig=a=b\n");
        assert_eq!(parsed.download_url, "https://dl/x.zip?sig=a=b");
    }

    #[test]
    fn malformed_line_discards_whole_ledger() {
        let contents = "latestVersionFound=acme-core-v1.9_0400\nthis line has no delimiter\n";
        let parsed = UpdateLedger::from_contents(contents);
        assert_eq!(parsed, UpdateLedger::default());
    }

    #[test]
    fn already_staged_requires_match_and_directory() {
        let temp = TempDir::new().unwrap();
        let stage = temp.path().join("acme-core-v1.9_0400");
        std::fs::create_dir(&stage).unwrap();

        let ledger = UpdateLedger {
            latest_version_found: "acme-core-v1.9_0400".to_string(),
            update_location: stage.display().to_string(),
            ..UpdateLedger::default()
        };

        assert!(ledger.is_already_staged("acme-core-v1.9_0400"));
        // Case-insensitive on the version identifier.
        assert!(ledger.is_already_staged("ACME-CORE-V1.9_0400"));
        assert!(!ledger.is_already_staged("acme-core-v1.9_0401"));

        std::fs::remove_dir(&stage).unwrap();
        assert!(!ledger.is_already_staged("acme-core-v1.9_0400"));
    }

    #[test]
    fn expiry_and_recency_windows() {
        let now = SystemTime::now();

        assert!(!is_expired(now - LEDGER_STALE_AGE, now));
        assert!(is_expired(now - LEDGER_STALE_AGE - Duration::from_secs(1), now));

        assert!(is_recent(now - Duration::from_secs(60), now));
        assert!(!is_recent(now - LEDGER_RECENT_AGE, now));
    }

    #[tokio::test]
    async fn missing_ledger_forces_fresh_check() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("update.status");
        assert!(needs_fresh_check(&path, SystemTime::now()).await.unwrap());
        assert!(UpdateLedger::load(&path).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn young_ledger_blocks_and_expired_ledger_is_deleted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("update.status");
        sample().save(&path).await.unwrap();

        // Just written: the previous check stands.
        assert!(!needs_fresh_check(&path, SystemTime::now()).await.unwrap());

        // Viewed from eight days later the same file has expired and is
        // removed on the way out.
        let later = SystemTime::now() + LEDGER_STALE_AGE + Duration::from_secs(3600);
        assert!(needs_fresh_check(&path, later).await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn save_and_load_round_trip() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("update.status");
        let ledger = sample();
        ledger.save(&path).await.unwrap();

        let loaded = UpdateLedger::load(&path).await.unwrap().unwrap();
        assert_eq!(loaded, ledger);
    }
}
