//! Global constants used throughout the stager codebase.
//!
//! Timeout windows, file names, and exit codes shared across modules.
//! Defining them centrally improves maintainability and makes magic
//! numbers more discoverable.

use std::time::Duration;

/// Age past which a held lock file is treated as abandoned by a dead
/// (zombie) process and its recorded pid becomes a termination target.
///
/// The comparison is strict: a lock whose mtime is exactly this old is
/// still considered live.
pub const STALE_LOCK_AGE: Duration = Duration::from_secs(8 * 60 * 60);

/// Age past which the update status ledger is discarded and a fresh
/// check is forced (7 days).
pub const LEDGER_STALE_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Window inside which a repeated check is merely noted in the log (6 hours).
pub const LEDGER_RECENT_AGE: Duration = Duration::from_secs(6 * 60 * 60);

/// One progress tick is emitted per this many bytes downloaded.
pub const PROGRESS_BYTE_QUANTUM: u64 = 1024 * 1024;

/// Marker file inside the install directory recording the installed version.
pub const FINGERPRINT_FILE: &str = "version.txt";

/// Update status ledger file name, under the staging root.
pub const LEDGER_FILE: &str = "update.status";

/// Cross-process lock file name, under the staging root.
pub const LOCK_FILE: &str = "update.lock";

/// Archive suffix the feed formats and the staging layer agree on.
pub const ARCHIVE_EXT: &str = ".zip";

/// Sentinel version token resolving to the newest catalog entry.
pub const VERSION_LATEST: &str = "latest";

/// File extensions that get the executable bit set after extraction.
pub const EXECUTABLE_EXTS: &[&str] = &["sh", "bash", "bat", "cmd"];

/// Process exit code: no version given or version absent from the catalog.
pub const EXIT_MISSING_VERSION: i32 = 2;
/// Process exit code: feed fetch or archive download failed.
pub const EXIT_DOWNLOAD_FAILED: i32 = 3;
/// Process exit code: downloaded archive unreadable or truncated.
pub const EXIT_SAVE_FAILED: i32 = 4;
/// Process exit code: directory creation failed.
pub const EXIT_FAIL_CREATE_DIR: i32 = 6;
/// Process exit code: another update process holds the lock.
pub const EXIT_DUP_PROCESS: i32 = 8;
/// Process exit code: anything without a more specific category.
pub const EXIT_UNKNOWN: i32 = 13;
