//! Staged installation pipeline.
//!
//! An install moves through fixed stages: resolve the requested version
//! against the catalog, download its archive, verify the bytes on disk,
//! move the live tree aside (or delete it when no backup is configured),
//! extract the new tree into place, then finalize with executable bits,
//! the version fingerprint, and an advisory spot check.
//!
//! There is deliberately no rollback. Once the live tree has been moved
//! aside the pipeline only moves forward; a failure after that point
//! leaves the backup in place for manual recovery and surfaces the error
//! as-is. Keeping the half-installed state visible beats silently
//! restoring a tree the operator believes was replaced.

pub mod archive;
pub mod fingerprint;
pub mod session;
pub mod transport;


use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::constants::EXECUTABLE_EXTS;
use crate::core::StagerError;
use crate::feed::VersionCatalog;
use crate::utils::fs as fsutil;
use crate::utils::platform::{self, Platform};

pub use archive::{ArchiveExtractor, ZipExtractor};
pub use session::UpdateSession;
pub use transport::{DownloadReport, HttpTransport, Transport};

/// Per-install knobs.
#[derive(Debug, Clone)]
pub struct InstallOptions {
    /// Directory the new version is installed into.
    pub target: PathBuf,
    /// Where the previous tree is moved before the swap. `None` deletes
    /// the previous tree outright.
    pub backup: Option<PathBuf>,
    /// Keep the downloaded archive inside the target after extraction.
    pub keep_downloaded: bool,
}

/// What a completed install reported.
#[derive(Debug, Clone)]
pub struct InstallOutcome {
    /// The concrete version that was installed.
    pub version: String,
    /// Transfer statistics for the archive download.
    pub download: DownloadReport,
}

/// Drives one version from catalog entry to installed tree.
#[derive(Debug)]
pub struct StagedInstaller<T, E> {
    transport: T,
    extractor: E,
    platform: Platform,
    spot_checks: Vec<String>,
}

impl<T: Transport, E: ArchiveExtractor> StagedInstaller<T, E> {
    pub fn new(transport: T, extractor: E, platform: Platform, spot_checks: Vec<String>) -> Self {
        Self { transport, extractor, platform, spot_checks }
    }

    /// Install `version` (exact identifier or the `latest` sentinel) from
    /// `catalog` according to `options`.
    ///
    /// # Errors
    ///
    /// [`StagerError::VersionNotFound`] for an unresolvable version,
    /// [`StagerError::Network`] for transfer failures,
    /// [`StagerError::DownloadIntegrity`] when the archive on disk does
    /// not match the bytes streamed, and filesystem errors from the swap
    /// itself. Failures after the live tree was moved aside do not restore
    /// it.
    pub async fn install(
        &self,
        catalog: &VersionCatalog,
        version: &str,
        options: &InstallOptions,
    ) -> Result<InstallOutcome> {
        let entry = catalog.resolve(version)?;
        info!(version = %entry.identifier, "installing");

        let archive_path = platform::download_path(self.platform, &entry.identifier);
        let report = self.transport.download(&entry.download_url, &archive_path).await?;
        verify_download(&archive_path, report.bytes_written).await?;

        swap_aside(&options.target, options.backup.as_deref()).await?;

        self.extractor.extract(&archive_path, &options.target).await?;
        finalize_permissions(&options.target)?;
        fingerprint::write_fingerprint(&options.target, &entry.identifier).await?;

        if options.keep_downloaded {
            let kept = options.target.join(
                archive_path
                    .file_name()
                    .map_or_else(|| std::ffi::OsString::from("download.zip"), ToOwned::to_owned),
            );
            move_file(&archive_path, &kept).await?;
            debug!(path = %kept.display(), "kept downloaded archive");
        } else if let Err(e) = tokio::fs::remove_file(&archive_path).await {
            warn!(error = %e, "could not remove downloaded archive");
        }

        fingerprint::spot_check(&options.target, &self.spot_checks);

        info!(
            version = %entry.identifier,
            bytes = report.bytes_written,
            secs = report.elapsed.as_secs_f64(),
            "install complete"
        );
        Ok(InstallOutcome { version: entry.identifier, download: report })
    }
}

/// Confirm the archive on disk holds exactly the bytes the transport
/// reported writing.
async fn verify_download(archive_path: &Path, bytes_written: u64) -> Result<()> {
    let metadata = tokio::fs::metadata(archive_path).await.map_err(|_| {
        StagerError::DownloadIntegrity { expected: bytes_written, actual: 0 }
    })?;
    let actual = metadata.len();
    if actual != bytes_written {
        return Err(StagerError::DownloadIntegrity { expected: bytes_written, actual }.into());
    }
    Ok(())
}

/// Move the live tree at `target` out of the way and leave an empty
/// `target` behind.
///
/// With a backup path the old backup is deleted and the live tree moved
/// there whole; without one the live tree is deleted. A missing live tree
/// is fine on a first install.
async fn swap_aside(target: &Path, backup: Option<&Path>) -> Result<()> {
    let target = target.to_path_buf();
    let backup = backup.map(Path::to_path_buf);
    tokio::task::spawn_blocking(move || -> Result<()> {
        match backup {
            Some(backup) => {
                fsutil::remove_dir_if_exists(&backup)?;
                if target.exists() {
                    info!(from = %target.display(), to = %backup.display(), "backing up");
                    move_dir(&target, &backup)?;
                }
            }
            None => {
                fsutil::remove_dir_if_exists(&target)?;
            }
        }
        fsutil::ensure_dir(&target)
    })
    .await
    .context("spawn_blocking panicked")?
}

/// Move a directory, falling back to copy-and-delete when a plain rename
/// crosses filesystems.
fn move_dir(from: &Path, to: &Path) -> Result<()> {
    if let Some(parent) = to.parent() {
        fsutil::ensure_dir(parent)?;
    }
    match std::fs::rename(from, to) {
        Ok(()) => Ok(()),
        Err(_) => {
            fsutil::copy_dir_all(from, to)?;
            fsutil::remove_dir_if_exists(from)
        }
    }
}

/// Move a file, with the same cross-filesystem fallback.
async fn move_file(from: &Path, to: &Path) -> Result<()> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    tokio::fs::copy(from, to)
        .await
        .with_context(|| format!("Failed to copy {} to {}", from.display(), to.display()))?;
    tokio::fs::remove_file(from)
        .await
        .with_context(|| format!("Failed to remove {}", from.display()))
}

/// Mark launcher scripts in the freshly extracted tree executable.
///
/// Zip archives do not reliably carry Unix permission bits across
/// platforms, so scripts are re-marked by extension after extraction.
/// No-op on Windows.
fn finalize_permissions(target: &Path) -> Result<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        for entry in walkdir::WalkDir::new(target)
            .into_iter()
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let is_script = entry
                .path()
                .extension()
                .and_then(std::ffi::OsStr::to_str)
                .is_some_and(|ext| EXECUTABLE_EXTS.contains(&ext));
            if is_script {
                std::fs::set_permissions(entry.path(), std::fs::Permissions::from_mode(0o755))
                    .with_context(|| {
                        format!("Failed to set permissions on {}", entry.path().display())
                    })?;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = target;
        let _ = EXECUTABLE_EXTS;
    }
    Ok(())
}
