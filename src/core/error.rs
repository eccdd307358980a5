//! Error handling for stager.
//!
//! The error system follows two principles:
//! 1. **Strongly-typed errors** for precise handling in code
//! 2. **Distinct exit codes** so schedulers and wrapper scripts can tell
//!    failure categories apart without parsing log text
//!
//! [`StagerError`] enumerates every failure category the update engine can
//! produce. Feed, catalog, and lock errors abort the current command
//! immediately; per-entry anomalies inside a well-formed feed are swallowed
//! by the parser and never reach this type.

use thiserror::Error;

use crate::constants::{
    EXIT_DOWNLOAD_FAILED, EXIT_DUP_PROCESS, EXIT_FAIL_CREATE_DIR, EXIT_MISSING_VERSION,
    EXIT_SAVE_FAILED, EXIT_UNKNOWN,
};

/// The main error type for stager operations.
///
/// Each variant represents one failure category from the update engine's
/// contract. Variants carry the context needed for a useful message;
/// [`StagerError::exit_code`] maps them onto the CLI's exit statuses.
#[derive(Debug, Error)]
pub enum StagerError {
    /// The feed URL (or another required setting) is missing or invalid.
    #[error("configuration error: {reason}")]
    Configuration {
        /// What is missing or malformed.
        reason: String,
    },

    /// The feed payload does not have the expected top-level structure.
    #[error("feed format error from {url}: {reason}")]
    FeedFormat {
        /// Feed URL the payload came from.
        url: String,
        /// Why the payload was rejected.
        reason: String,
    },

    /// The remote host could not be reached or the transfer failed.
    #[error("network error fetching {url}: {reason}")]
    Network {
        /// URL that failed.
        url: String,
        /// Translated cause, e.g. "no internet connection or host not found".
        reason: String,
    },

    /// A requested version identifier is absent from the catalog.
    #[error("version '{version}' not found or not available")]
    VersionNotFound {
        /// The identifier that was requested.
        version: String,
    },

    /// A version identifier does not follow `<name>-v<major.minor>_<build>`,
    /// so no build number can be extracted from it.
    #[error("version '{version}' does not carry an extractable build number")]
    VersionFormat {
        /// The non-conforming identifier.
        version: String,
    },

    /// The downloaded archive's size on disk does not match the bytes
    /// written during transfer, or the file cannot be read back.
    #[error("downloaded archive cannot be read or was not saved correctly \
             (expected {expected} bytes, found {actual})")]
    DownloadIntegrity {
        /// Bytes reported written by the transport.
        expected: u64,
        /// Bytes actually on disk.
        actual: u64,
    },

    /// Another update process holds the lock and could not be reclaimed.
    #[error("another update process is already running; aborting")]
    DuplicateProcess,

    /// A directory create/move/delete failed at some stage.
    #[error("filesystem error on {path}: {reason}")]
    Filesystem {
        /// Path the operation targeted.
        path: String,
        /// Underlying cause.
        reason: String,
    },

    /// Any other I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StagerError {
    /// Map this error onto the CLI's exit status for its category.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::VersionNotFound { .. } | Self::VersionFormat { .. } => EXIT_MISSING_VERSION,
            Self::Network { .. } | Self::FeedFormat { .. } | Self::Configuration { .. } => {
                EXIT_DOWNLOAD_FAILED
            }
            Self::DownloadIntegrity { .. } => EXIT_SAVE_FAILED,
            Self::Filesystem { .. } => EXIT_FAIL_CREATE_DIR,
            Self::DuplicateProcess => EXIT_DUP_PROCESS,
            Self::Io(_) => EXIT_UNKNOWN,
        }
    }

    /// Convenience constructor for [`StagerError::Filesystem`].
    pub fn filesystem(path: impl AsRef<std::path::Path>, reason: impl Into<String>) -> Self {
        Self::Filesystem {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }
}

/// Resolve the exit code for an arbitrary error chain.
///
/// Walks the `anyhow` chain looking for a [`StagerError`]; anything else
/// falls back to [`EXIT_UNKNOWN`].
#[must_use]
pub fn exit_code_for(error: &anyhow::Error) -> i32 {
    for cause in error.chain() {
        if let Some(e) = cause.downcast_ref::<StagerError>() {
            return e.exit_code();
        }
    }
    EXIT_UNKNOWN
}
