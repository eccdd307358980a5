//! Cross-process update lock with zombie recovery.
//!
//! At most one update process may run per host. The lock is an OS-level
//! exclusive file lock on `update.lock` under the staging root; the file
//! body records the holder's pid. Locks are released when the guard is
//! dropped.
//!
//! A holder that died without releasing (a zombie) is detected by age: if
//! the lock file's mtime is strictly older than [`STALE_LOCK_AGE`], the
//! recorded pid is handed to a [`ProcessTerminator`] and the lock is
//! reclaimed with a single retry. A younger contended lock aborts the
//! command with [`StagerError::DuplicateProcess`].
//!
//! # Async Safety
//!
//! File open, lock, and pid-write calls run under `spawn_blocking` so slow
//! filesystem operations never stall the tokio runtime.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::{Context, Result};
use fs4::fs_std::FileExt;
use tracing::{debug, info, warn};

use crate::constants::STALE_LOCK_AGE;
use crate::core::StagerError;
use crate::utils::platform::Platform;

/// Terminates a process identified by pid.
///
/// The update flow only ever terminates the zombie holder recorded in a
/// stale lock file. Tests substitute a recording fake.
pub trait ProcessTerminator {
    /// Request termination of `pid`, descendants included where the
    /// platform supports it.
    fn terminate(&self, pid: u32) -> Result<()>;
}

/// [`ProcessTerminator`] backed by the platform's own kill command.
#[derive(Debug, Clone, Copy)]
pub struct OsProcessTerminator {
    platform: Platform,
}

impl OsProcessTerminator {
    /// Terminator for `platform`.
    #[must_use]
    pub const fn new(platform: Platform) -> Self {
        Self { platform }
    }
}

impl ProcessTerminator for OsProcessTerminator {
    fn terminate(&self, pid: u32) -> Result<()> {
        info!(pid, "terminating stale update process");
        let status = match self.platform {
            Platform::Windows => Command::new("cmd")
                .args(["/C", "start", "\"\"", "taskkill", "/pid"])
                .arg(pid.to_string())
                .args(["/T", "/F"])
                .status(),
            Platform::Linux | Platform::MacOs => {
                Command::new("kill").args(["-s", "QUIT"]).arg(pid.to_string()).status()
            }
        }
        .with_context(|| format!("Failed to run terminate command for pid {pid}"))?;
        if !status.success() {
            anyhow::bail!("terminate command for pid {pid} exited with {status}");
        }
        Ok(())
    }
}

/// Whether a lock last touched at `modified` counts as abandoned at `now`.
///
/// The comparison is strict: a lock aged exactly [`STALE_LOCK_AGE`] is
/// still live. Clock skew that puts `modified` in the future reads as age
/// zero.
#[must_use]
pub fn is_stale(modified: SystemTime, now: SystemTime) -> bool {
    match now.duration_since(modified) {
        Ok(age) => age > STALE_LOCK_AGE,
        Err(_) => false,
    }
}

/// Exclusive cross-process lock guarding the whole update flow.
///
/// The lock is held for the lifetime of this value; dropping it releases
/// the OS lock and deletes the lock file.
#[derive(Debug)]
pub struct UpdateLock {
    /// The file handle - the OS lock is released when this is dropped.
    _file: Arc<File>,
    /// Path to the lock file for cleanup on drop.
    lock_path: PathBuf,
}

impl Drop for UpdateLock {
    fn drop(&mut self) {
        debug!(path = %self.lock_path.display(), "update lock released");
        if let Err(e) = std::fs::remove_file(&self.lock_path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(error = %e, "Failed to remove lock file");
            }
        }
    }
}

impl UpdateLock {
    /// Acquire the update lock at `lock_path`, reclaiming a stale holder.
    ///
    /// # Behavior
    ///
    /// 1. Open (creating if needed) the lock file and try a non-blocking
    ///    exclusive lock. Success records this process's pid in the file.
    /// 2. On contention, check the file's age. Strictly older than the
    ///    staleness window: read the recorded pid, terminate it via
    ///    `terminator`, and retry the lock on the same file exactly once.
    ///    The file is never unlinked while contended; the OS lock on it is
    ///    what guarantees mutual exclusion.
    /// 3. Anything else is [`StagerError::DuplicateProcess`].
    ///
    /// # Errors
    ///
    /// `DuplicateProcess` when a live holder exists, plus I/O failures
    /// opening or writing the lock file.
    pub async fn acquire<T: ProcessTerminator>(lock_path: &Path, terminator: &T) -> Result<Self> {
        Self::acquire_at(lock_path, terminator, SystemTime::now()).await
    }

    /// [`UpdateLock::acquire`] with an explicit notion of "now" so the
    /// staleness decision is deterministic under test.
    pub async fn acquire_at<T: ProcessTerminator>(
        lock_path: &Path,
        terminator: &T,
        now: SystemTime,
    ) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            tokio::fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create lock directory: {}", parent.display())
            })?;
        }

        if let Some(lock) = Self::try_acquire(lock_path).await? {
            return Ok(lock);
        }

        // Contended. A holder older than the staleness window is treated
        // as a zombie from a crashed run and forcibly cleared.
        let metadata = tokio::fs::metadata(lock_path)
            .await
            .with_context(|| format!("Failed to stat lock file: {}", lock_path.display()))?;
        let modified = metadata
            .modified()
            .with_context(|| format!("Failed to read mtime of {}", lock_path.display()))?;
        if !is_stale(modified, now) {
            return Err(StagerError::DuplicateProcess.into());
        }

        match tokio::fs::read_to_string(lock_path).await {
            Ok(body) => match body.trim().parse::<u32>() {
                Ok(pid) => {
                    if let Err(e) = terminator.terminate(pid) {
                        warn!(pid, error = %e, "could not terminate stale holder");
                        return Err(StagerError::DuplicateProcess.into());
                    }
                }
                Err(_) => warn!(body = body.trim(), "stale lock file held no readable pid"),
            },
            Err(e) => warn!(error = %e, "could not read stale lock file"),
        }

        // Exactly one retry on the same file after terminating the zombie.
        // The file must not be unlinked: a fresh inode at the same path
        // would lock successfully even while the old holder's lock lives
        // on, and both processes would proceed.
        match Self::try_acquire(lock_path).await? {
            Some(lock) => Ok(lock),
            None => Err(StagerError::DuplicateProcess.into()),
        }
    }

    /// One non-blocking lock attempt. `Ok(None)` means contended.
    async fn try_acquire(lock_path: &Path) -> Result<Option<Self>> {
        let path = lock_path.to_path_buf();
        let pid = std::process::id();

        let locked = tokio::task::spawn_blocking(move || -> Result<Option<File>> {
            let mut file = OpenOptions::new()
                .create(true)
                .write(true)
                .read(true)
                .truncate(false)
                .open(&path)
                .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
            match file.try_lock_exclusive() {
                Ok(true) => {
                    file.set_len(0)?;
                    write!(file, "{pid}")?;
                    file.flush()?;
                    Ok(Some(file))
                }
                Ok(false) | Err(_) => Ok(None),
            }
        })
        .await
        .context("spawn_blocking panicked")??;

        Ok(locked.map(|file| {
            debug!(path = %lock_path.display(), pid, "update lock acquired");
            Self { _file: Arc::new(file), lock_path: lock_path.to_path_buf() }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    #[derive(Default)]
    struct RecordingTerminator {
        killed: Mutex<Vec<u32>>,
    }

    impl ProcessTerminator for RecordingTerminator {
        fn terminate(&self, pid: u32) -> Result<()> {
            self.killed.lock().unwrap().push(pid);
            Ok(())
        }
    }

    #[tokio::test]
    async fn acquire_writes_pid_and_cleans_up_on_drop() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("update.lock");
        let terminator = RecordingTerminator::default();

        let lock = UpdateLock::acquire(&lock_path, &terminator).await.unwrap();
        let body = std::fs::read_to_string(&lock_path).unwrap();
        assert_eq!(body.trim().parse::<u32>().unwrap(), std::process::id());

        drop(lock);
        assert!(!lock_path.exists());
        assert!(terminator.killed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fresh_contended_lock_is_duplicate_process() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("update.lock");
        let terminator = RecordingTerminator::default();

        let _held = UpdateLock::acquire(&lock_path, &terminator).await.unwrap();

        let err = UpdateLock::acquire(&lock_path, &terminator).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StagerError>().unwrap(),
            StagerError::DuplicateProcess
        ));
        // A live holder is never terminated.
        assert!(terminator.killed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_lock_with_surviving_holder_is_never_double_acquired() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("update.lock");
        let terminator = RecordingTerminator::default();

        let _held = UpdateLock::acquire(&lock_path, &terminator).await.unwrap();

        // Far past the staleness window the holder is treated as a zombie
        // and terminated, but if its OS lock is somehow still held the
        // retry must fail: two acquired guards at once would let two
        // update processes run over the same tree.
        let future = SystemTime::now() + STALE_LOCK_AGE + Duration::from_secs(60);
        let err = UpdateLock::acquire_at(&lock_path, &terminator, future).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StagerError>().unwrap(),
            StagerError::DuplicateProcess
        ));
        assert_eq!(*terminator.killed.lock().unwrap(), vec![std::process::id()]);
        // The contended lock file is left in place for the holder.
        assert!(lock_path.exists());
    }

    struct FailingTerminator;

    impl ProcessTerminator for FailingTerminator {
        fn terminate(&self, pid: u32) -> Result<()> {
            anyhow::bail!("terminate command for pid {pid} exited with code 1");
        }
    }

    #[tokio::test]
    async fn failed_termination_aborts_as_duplicate_process() {
        let temp = TempDir::new().unwrap();
        let lock_path = temp.path().join("update.lock");

        let _held = UpdateLock::acquire(&lock_path, &FailingTerminator).await.unwrap();

        let future = SystemTime::now() + STALE_LOCK_AGE + Duration::from_secs(60);
        let err =
            UpdateLock::acquire_at(&lock_path, &FailingTerminator, future).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StagerError>().unwrap(),
            StagerError::DuplicateProcess
        ));
    }

    #[test]
    fn staleness_boundary_is_strict() {
        let now = SystemTime::now();

        // Exactly the window old: still live.
        assert!(!is_stale(now - STALE_LOCK_AGE, now));
        // One second past the window: stale.
        assert!(is_stale(now - STALE_LOCK_AGE - Duration::from_secs(1), now));
        // Young lock, and a clock-skewed future mtime, are both live.
        assert!(!is_stale(now - Duration::from_secs(60), now));
        assert!(!is_stale(now + Duration::from_secs(60), now));
    }
}
