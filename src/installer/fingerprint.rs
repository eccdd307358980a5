//! Install fingerprint and post-install spot check.
//!
//! The fingerprint is a one-line `version.txt` at the root of the install
//! directory naming the installed version. It is written as the last step
//! of every successful install and read back at the start of every update
//! check; an install tree without one cannot be compared against the feed.

use std::path::Path;

use anyhow::{Context, Result};
use tracing::{info, warn};
use walkdir::WalkDir;

use crate::constants::FINGERPRINT_FILE;

/// Record `version` as the installed version of the tree at `install_dir`.
pub async fn write_fingerprint(install_dir: &Path, version: &str) -> Result<()> {
    let path = install_dir.join(FINGERPRINT_FILE);
    tokio::fs::write(&path, format!("{version}\n"))
        .await
        .with_context(|| format!("Failed to write fingerprint to {}", path.display()))
}

/// The installed version recorded in `install_dir`, or `None` when no
/// fingerprint file exists or it holds only whitespace.
pub async fn read_current_version(install_dir: &Path) -> Result<Option<String>> {
    let path = install_dir.join(FINGERPRINT_FILE);
    match tokio::fs::read_to_string(&path).await {
        Ok(contents) => {
            let version = contents.trim();
            Ok((!version.is_empty()).then(|| version.to_string()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to read fingerprint from {}", path.display()))
        }
    }
}

/// Advisory post-install check: walk `install_dir` and log, for each
/// configured relative prefix, whether anything under it exists.
///
/// Never fails the install; a missing prefix only earns a warning.
pub fn spot_check(install_dir: &Path, prefixes: &[String]) {
    for prefix in prefixes {
        let found = WalkDir::new(install_dir)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .find(|entry| {
                entry
                    .path()
                    .strip_prefix(install_dir)
                    .is_ok_and(|rel| rel.to_string_lossy().starts_with(prefix.trim_end_matches('/')))
            });
        match found {
            Some(entry) => info!(prefix, path = %entry.path().display(), "spot check passed"),
            None => warn!(prefix, "spot check found nothing under expected path"),
        }
    }
}
