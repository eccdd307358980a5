//! Version catalog and build-number extraction.
//!
//! A [`VersionCatalog`] is the in-memory result of one feed resolution: an
//! ordered mapping of version identifier to download URL. It is immutable
//! once built and never persisted; "latest" is the first entry under
//! reverse (newest-first) ordering. Catalogs are threaded explicitly
//! through the commands that need them, never held in a global.

use std::collections::BTreeMap;

use anyhow::Result;

use crate::constants::VERSION_LATEST;
use crate::core::StagerError;

/// One available distribution version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionEntry {
    /// Opaque version identifier, unique within one catalog.
    pub identifier: String,
    /// Where the distribution archive for this version can be fetched.
    pub download_url: String,
}

/// Ordered, immutable mapping of version identifier to download URL.
///
/// Identifiers sort lexicographically; iteration and resolution treat the
/// greatest key as newest, matching the reverse-ordered listing the feed
/// contract promises.
#[derive(Debug, Clone, Default)]
pub struct VersionCatalog {
    entries: BTreeMap<String, String>,
}

impl VersionCatalog {
    /// Build a catalog from `(identifier, download_url)` pairs. Later
    /// duplicates of an identifier overwrite earlier ones.
    #[must_use]
    pub fn from_entries(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        Self {
            entries: pairs.into_iter().collect(),
        }
    }

    /// Number of versions in the catalog.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the catalog holds no versions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The newest entry, i.e. the first under reverse ordering.
    #[must_use]
    pub fn latest(&self) -> Option<VersionEntry> {
        self.entries.iter().next_back().map(|(k, v)| VersionEntry {
            identifier: k.clone(),
            download_url: v.clone(),
        })
    }

    /// Download URL for an exact version identifier.
    #[must_use]
    pub fn get(&self, version: &str) -> Option<&str> {
        self.entries.get(version).map(String::as_str)
    }

    /// Version identifiers, newest first.
    pub fn versions(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().rev().map(String::as_str)
    }

    /// Resolve a requested version token to a concrete entry.
    ///
    /// The `latest` sentinel maps to the newest entry; anything else must
    /// be an exact member of the catalog.
    ///
    /// # Errors
    ///
    /// [`StagerError::VersionNotFound`] when the token is unknown or the
    /// catalog is empty.
    pub fn resolve(&self, version: &str) -> Result<VersionEntry> {
        let version = version.trim();
        if version == VERSION_LATEST {
            return self.latest().ok_or_else(|| {
                StagerError::VersionNotFound {
                    version: version.to_string(),
                }
                .into()
            });
        }
        match self.entries.get(version) {
            Some(url) => Ok(VersionEntry {
                identifier: version.to_string(),
                download_url: url.clone(),
            }),
            None => Err(StagerError::VersionNotFound {
                version: version.to_string(),
            }
            .into()),
        }
    }
}

/// Extract the build number from a `<name>-v<major.minor>_<build>`
/// version identifier.
///
/// The identifier is split on `-v`; the second token is split on `_` and
/// the token after the first `_` parsed as an integer, so
/// `acme-core-v1.9_0400` yields `400`.
///
/// # Errors
///
/// [`StagerError::VersionFormat`] when the identifier does not follow the
/// naming scheme. Catalog keys produced by the HTML and JSON-Lines feeds
/// only conform when the publisher names archives this way; callers on the
/// update-comparison path surface the error rather than guessing.
pub fn extract_build_number(version: &str) -> Result<u32> {
    let invalid = || StagerError::VersionFormat {
        version: version.to_string(),
    };

    let tail = version.split("-v").nth(1).ok_or_else(invalid)?;
    let build = tail.split('_').nth(1).ok_or_else(invalid)?;
    build.parse::<u32>().map_err(|_| invalid().into())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> VersionCatalog {
        VersionCatalog::from_entries([
            ("acme-core-v1.9_0398".to_string(), "http://dl/0398.zip".to_string()),
            ("acme-core-v1.9_0400".to_string(), "http://dl/0400.zip".to_string()),
            ("acme-core-v1.8_0350".to_string(), "http://dl/0350.zip".to_string()),
        ])
    }

    #[test]
    fn latest_is_first_under_reverse_order() {
        let catalog = sample();
        let latest = catalog.latest().unwrap();
        assert_eq!(latest.identifier, "acme-core-v1.9_0400");
        assert_eq!(latest.download_url, "http://dl/0400.zip");

        // Idempotent across repeated calls on the same instance.
        assert_eq!(catalog.latest().unwrap(), latest);
        assert_eq!(
            catalog.versions().next().unwrap(),
            latest.identifier.as_str()
        );
    }

    #[test]
    fn resolve_latest_and_exact() {
        let catalog = sample();
        assert_eq!(
            catalog.resolve("latest").unwrap().identifier,
            "acme-core-v1.9_0400"
        );
        assert_eq!(
            catalog.resolve("acme-core-v1.8_0350").unwrap().download_url,
            "http://dl/0350.zip"
        );
        // Surrounding whitespace is tolerated on the token.
        assert_eq!(
            catalog.resolve(" acme-core-v1.9_0398 ").unwrap().download_url,
            "http://dl/0398.zip"
        );
    }

    #[test]
    fn resolve_unknown_version_fails() {
        let catalog = sample();
        let err = catalog.resolve("acme-core-v9.9_9999").unwrap_err();
        let stager = err.downcast_ref::<StagerError>().unwrap();
        assert!(matches!(stager, StagerError::VersionNotFound { .. }));

        let empty = VersionCatalog::default();
        assert!(empty.resolve("latest").is_err());
    }

    #[test]
    fn build_number_extraction() {
        assert_eq!(extract_build_number("acme-core-v1.9_0400").unwrap(), 400);
        assert_eq!(extract_build_number("acme-core-v2.0_1234").unwrap(), 1234);
        // Leading zeros parse as plain integers.
        assert_eq!(extract_build_number("acme-core-v1.9_0001").unwrap(), 1);
    }

    #[test]
    fn build_number_rejects_nonconforming_identifiers() {
        for bad in ["v1.2.3", "acme-core", "acme-core-v1.9", "acme-core-v1.9_x4"] {
            let err = extract_build_number(bad).unwrap_err();
            let stager = err.downcast_ref::<StagerError>().unwrap();
            assert!(
                matches!(stager, StagerError::VersionFormat { .. }),
                "expected VersionFormat for {bad}"
            );
        }
    }
}
