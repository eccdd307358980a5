//! Platform-specific path resolution.
//!
//! The host platform is resolved once at startup into a [`Platform`] value;
//! every per-OS decision is then a plain match on that enum rather than a
//! virtual-dispatch object. The functions here are pure `platform -> path`
//! mappings so they can be unit tested on any host.

use std::path::PathBuf;

use anyhow::Result;

use crate::constants::ARCHIVE_EXT;

/// The supported host platforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Platform {
    /// Any Windows target.
    Windows,
    /// Linux and other non-Apple Unix.
    Linux,
    /// macOS.
    MacOs,
}

impl Platform {
    /// Resolve the platform the binary was compiled for.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Whether paths on this platform use Windows conventions.
    #[must_use]
    pub const fn is_windows(self) -> bool {
        matches!(self, Self::Windows)
    }
}

/// Where a downloaded archive for `version` lands before extraction.
///
/// All platforms stage downloads in the OS temp directory as
/// `<version>.zip`.
#[must_use]
pub fn download_path(_platform: Platform, version: &str) -> PathBuf {
    std::env::temp_dir().join(format!("{version}{ARCHIVE_EXT}"))
}

/// Default live-install directory for `product`.
///
/// Windows installs under `C:\products\<product>`; Unix-like platforms
/// under `~/products/<product>`.
pub fn default_install_dir(platform: Platform, product: &str) -> Result<PathBuf> {
    let base = match platform {
        Platform::Windows => PathBuf::from(r"C:\products"),
        Platform::Linux | Platform::MacOs => home_dir()?.join("products"),
    };
    Ok(base.join(product))
}

/// Default backup directory: a `.BAK` sibling of the install directory.
pub fn default_backup_dir(platform: Platform, product: &str) -> Result<PathBuf> {
    default_install_dir(platform, &format!("{product}.BAK"))
}

/// The stager home directory (`~/.stager`), holding config, the staging
/// root, the ledger, and the lock file.
pub fn stager_home() -> Result<PathBuf> {
    Ok(home_dir()?.join(".stager"))
}

/// Gets the home directory for the current user.
pub fn home_dir() -> Result<PathBuf> {
    dirs::home_dir().ok_or_else(|| {
        let hint = if Platform::current().is_windows() {
            "On Windows: check that the USERPROFILE environment variable is set"
        } else {
            "On Unix/Linux: check that the HOME environment variable is set"
        };
        anyhow::anyhow!("Could not determine home directory.\n\n{hint}")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_platform_matches_cfg() {
        #[cfg(windows)]
        assert_eq!(Platform::current(), Platform::Windows);

        #[cfg(target_os = "macos")]
        assert_eq!(Platform::current(), Platform::MacOs);

        #[cfg(all(unix, not(target_os = "macos")))]
        assert_eq!(Platform::current(), Platform::Linux);
    }

    #[test]
    fn download_path_is_version_archive_in_temp() {
        let path = download_path(Platform::current(), "core-v1.9_0400");
        assert!(path.starts_with(std::env::temp_dir()));
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "core-v1.9_0400.zip"
        );
    }

    #[test]
    fn default_dirs_are_product_scoped() {
        let install = default_install_dir(Platform::Linux, "core").unwrap();
        let backup = default_backup_dir(Platform::Linux, "core").unwrap();
        assert!(install.ends_with("products/core"));
        assert!(backup.ends_with("products/core.BAK"));

        let win = default_install_dir(Platform::Windows, "core").unwrap();
        assert_eq!(win, PathBuf::from(r"C:\products").join("core"));
    }

    #[test]
    fn stager_home_is_under_home() {
        let home = stager_home().unwrap();
        assert!(home.ends_with(".stager"));
    }
}
