//! Feed parsing: turning a raw remote payload into a version catalog.
//!
//! A feed is the remote source describing available distribution versions.
//! Three shapes are supported, dispatched by URL in priority order:
//!
//! 1. **Hosted-release JSON** — the URL host carries a known release-forge
//!    marker (`github.com`); the payload is a JSON array of releases, each
//!    with a `tag_name` and a non-empty `assets` array whose first asset
//!    supplies the download URL.
//! 2. **JSON-Lines manifest** — the URL ends in `.jsonl`; each line is a
//!    JSON object with a `key` (archive name) and a base `url`,
//!    concatenated to form the full download URL.
//! 3. **HTML directory listing** — anything else; anchor tags are scanned
//!    line by line and the version is the anchor text minus the archive
//!    extension.
//!
//! Structural problems at the top level (no array, empty payload, every
//! entry skipped) fail the whole parse with [`StagerError::FeedFormat`];
//! individually malformed releases or lines inside a well-formed feed are
//! skipped silently. No partial catalog is ever returned on a structural
//! error.

pub mod catalog;

use anyhow::Result;
use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::constants::ARCHIVE_EXT;
use crate::core::StagerError;
use crate::installer::transport::Transport;

pub use catalog::{VersionCatalog, VersionEntry, extract_build_number};

/// Host marker selecting the hosted-release JSON shape.
const RELEASE_FORGE_MARKER: &str = "github.com";

/// Suffix selecting the JSON-Lines shape.
const JSONL_EXT: &str = ".jsonl";

/// Anchor-tag pattern for the HTML listing shape. Matched per line.
const A_HREF_PATTERN: &str = r#".+<a href=".+".+>.+</a>"#;

/// Fetch the feed at `url` and parse it into a catalog.
///
/// # Errors
///
/// [`StagerError::Network`] when the fetch fails (connection failures are
/// translated into a "no internet connection" message), plus everything
/// [`parse_feed`] can return.
pub async fn fetch_feed<T: Transport>(transport: &T, url: &str) -> Result<VersionCatalog> {
    debug!(url, "fetching version feed");
    let payload = transport.fetch_text(url).await?;
    parse_feed(url, &payload)
}

/// Parse a fetched feed payload into a catalog, dispatching on the shape
/// the URL implies.
pub fn parse_feed(url: &str, payload: &str) -> Result<VersionCatalog> {
    if url.contains(RELEASE_FORGE_MARKER) {
        return parse_release_json(url, payload);
    }
    if url.ends_with(JSONL_EXT) {
        return parse_json_lines(url, payload);
    }
    parse_html_listing(url, payload)
}

/// Parse a hosted-release JSON array.
///
/// Releases missing `tag_name`, `assets`, or a usable first asset are
/// skipped, not errored; a payload that is not a non-empty array fails the
/// whole parse.
fn parse_release_json(url: &str, payload: &str) -> Result<VersionCatalog> {
    let value: Value = serde_json::from_str(payload).map_err(|e| StagerError::FeedFormat {
        url: url.to_string(),
        reason: format!("expected JSON content: {e}"),
    })?;

    let releases = value.as_array().ok_or_else(|| StagerError::FeedFormat {
        url: url.to_string(),
        reason: "expected a JSON array of releases".to_string(),
    })?;
    if releases.is_empty() {
        return Err(StagerError::FeedFormat {
            url: url.to_string(),
            reason: "release array is empty".to_string(),
        }
        .into());
    }

    let mut entries = Vec::new();
    for release in releases {
        let Some(tag) = release.get("tag_name").and_then(Value::as_str) else {
            continue;
        };
        let Some(assets) = release.get("assets").and_then(Value::as_array) else {
            continue;
        };
        let Some(download) = assets
            .first()
            .and_then(|a| a.get("browser_download_url"))
            .and_then(Value::as_str)
        else {
            continue;
        };
        entries.push((tag.to_string(), download.to_string()));
    }

    if entries.is_empty() {
        return Err(StagerError::FeedFormat {
            url: url.to_string(),
            reason: "no release carried a usable asset".to_string(),
        }
        .into());
    }
    Ok(VersionCatalog::from_entries(entries))
}

/// Parse a JSON-Lines manifest: one JSON object per line, `key` naming the
/// archive and `url` its base location. Malformed or incomplete lines are
/// skipped.
fn parse_json_lines(url: &str, payload: &str) -> Result<VersionCatalog> {
    if payload.trim().is_empty() {
        return Err(StagerError::FeedFormat {
            url: url.to_string(),
            reason: "expected JSON Lines content, got an empty payload".to_string(),
        }
        .into());
    }

    let mut entries = Vec::new();
    for line in payload.lines().filter(|l| !l.trim().is_empty()) {
        let Ok(value) = serde_json::from_str::<Value>(line) else {
            warn!(line, "skipping malformed JSON line in feed");
            continue;
        };
        let key = value
            .get("key")
            .and_then(Value::as_str)
            .filter(|k| k.ends_with(ARCHIVE_EXT));
        let base = value
            .get("url")
            .and_then(Value::as_str)
            .filter(|u| !u.trim().is_empty());
        if let (Some(key), Some(base)) = (key, base) {
            entries.push((key.to_string(), format!("{base}{key}")));
        }
    }

    Ok(VersionCatalog::from_entries(entries))
}

/// Parse an HTML directory listing, scanning for anchor tags line by line.
///
/// The version is the anchor text with the archive extension stripped; the
/// download URL joins the feed's base path with the anchor text.
fn parse_html_listing(url: &str, payload: &str) -> Result<VersionCatalog> {
    if payload.trim().is_empty() {
        return Err(StagerError::FeedFormat {
            url: url.to_string(),
            reason: "expected HTML content, got an empty payload".to_string(),
        }
        .into());
    }

    let anchor = Regex::new(A_HREF_PATTERN).expect("anchor pattern is valid");
    let base = url.rsplit_once('/').map_or(url, |(head, _)| head);

    let mut entries = Vec::new();
    for line in payload.lines() {
        if !anchor.is_match(line) {
            continue;
        }
        // Anchor text sits between the tag's closing '>' and '</a>'.
        let Some(before_close) = line.split("</a>").next() else {
            continue;
        };
        let Some(open_end) = before_close.rfind('>') else {
            continue;
        };
        let text = &before_close[open_end + 1..];
        let version = text.strip_suffix(ARCHIVE_EXT).unwrap_or(text);
        entries.push((version.to_string(), format!("{base}/{text}")));
    }

    Ok(VersionCatalog::from_entries(entries))
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED_URL: &str = "https://downloads.example.com/releases/index.html";

    #[test]
    fn release_json_keeps_one_entry_per_valid_release() {
        let payload = r#"[
            {"tag_name": "acme-core-v1.9_0400",
             "assets": [{"browser_download_url": "https://dl/0400.zip"},
                        {"browser_download_url": "https://dl/0400-src.zip"}]},
            {"tag_name": "acme-core-v1.9_0398",
             "assets": [{"browser_download_url": "https://dl/0398.zip"}]},
            {"tag_name": "no-assets"},
            {"assets": [{"browser_download_url": "https://dl/orphan.zip"}]},
            {"tag_name": "empty-assets", "assets": []}
        ]"#;

        let catalog =
            parse_feed("https://api.github.com/repos/acme/core/releases", payload).unwrap();
        assert_eq!(catalog.len(), 2);
        // First asset wins, not the source archive.
        assert_eq!(
            catalog.get("acme-core-v1.9_0400").unwrap(),
            "https://dl/0400.zip"
        );
        assert_eq!(
            catalog.latest().unwrap().identifier,
            "acme-core-v1.9_0400"
        );
    }

    #[test]
    fn release_json_rejects_non_array_and_empty() {
        for payload in ["{}", "[]", "not json"] {
            let err = parse_feed("https://github.com/acme/releases", payload).unwrap_err();
            let stager = err.downcast_ref::<StagerError>().unwrap();
            assert!(matches!(stager, StagerError::FeedFormat { .. }));
        }
    }

    #[test]
    fn release_json_all_entries_skipped_is_structural() {
        let payload = r#"[{"tag_name": "x"}, {"assets": []}]"#;
        let err = parse_feed("https://github.com/acme/releases", payload).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StagerError>().unwrap(),
            StagerError::FeedFormat { .. }
        ));
    }

    #[test]
    fn json_lines_concatenates_base_and_key() {
        let payload = concat!(
            "{\"key\": \"acme-core-v1.9_0400.zip\", \"url\": \"https://cdn.example.com/\"}\n",
            "{\"key\": \"acme-core-v1.9_0398.zip\", \"url\": \"https://cdn.example.com/\"}\n",
            "{\"key\": \"readme.txt\", \"url\": \"https://cdn.example.com/\"}\n",
            "{\"key\": \"acme-core-v1.8_0350.zip\"}\n",
            "not json at all\n",
        );

        let catalog = parse_feed("https://cdn.example.com/versions.jsonl", payload).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.get("acme-core-v1.9_0400.zip").unwrap(),
            "https://cdn.example.com/acme-core-v1.9_0400.zip"
        );
    }

    #[test]
    fn json_lines_rejects_blank_payload() {
        let err = parse_feed("https://cdn.example.com/versions.jsonl", "  \n ").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StagerError>().unwrap(),
            StagerError::FeedFormat { .. }
        ));
    }

    #[test]
    fn html_listing_strips_archive_extension() {
        let payload = concat!(
            "<html><body>\n",
            "<tr><td><a href=\"acme-core-v1.9_0400.zip\" class=\"f\">acme-core-v1.9_0400.zip</a></td></tr>\n",
            "<tr><td><a href=\"acme-core-v1.9_0398.zip\" class=\"f\">acme-core-v1.9_0398.zip</a></td></tr>\n",
            "<p>not a listing line</p>\n",
            "</body></html>\n",
        );

        let catalog = parse_feed(FEED_URL, payload).unwrap();
        assert_eq!(catalog.len(), 2);
        assert_eq!(
            catalog.get("acme-core-v1.9_0400").unwrap(),
            "https://downloads.example.com/releases/acme-core-v1.9_0400.zip"
        );
        assert_eq!(
            catalog.latest().unwrap().identifier,
            "acme-core-v1.9_0400"
        );
    }

    #[test]
    fn html_listing_rejects_blank_payload() {
        let err = parse_feed(FEED_URL, "").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<StagerError>().unwrap(),
            StagerError::FeedFormat { .. }
        ));
    }

    #[test]
    fn html_listing_with_no_anchors_yields_empty_catalog() {
        // A well-formed page with zero matching anchors is not a structural
        // error; the caller sees an empty catalog and decides.
        let catalog = parse_feed(FEED_URL, "<html><body>nothing here</body></html>").unwrap();
        assert!(catalog.is_empty());
    }
}
