//! Remote transfer: feed fetches and archive downloads.
//!
//! [`Transport`] is the seam between the update flow and the network, so
//! the whole staging pipeline runs against an in-memory fake under test.
//! [`HttpTransport`] is the real implementation, streaming archives to
//! disk with a byte-level progress bar.

use std::path::Path;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use futures::StreamExt;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

use crate::constants::PROGRESS_BYTE_QUANTUM;
use crate::core::StagerError;

/// What a completed archive download reported about itself.
#[derive(Debug, Clone, Copy)]
pub struct DownloadReport {
    /// Total bytes streamed to disk.
    pub bytes_written: u64,
    /// Wall-clock duration of the transfer.
    pub elapsed: Duration,
}

/// Network operations the update flow depends on.
///
/// The returned futures carry no `Send` promise: the session awaits them
/// in place and never spawns them onto another task.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Fetch the body at `url` as text (feed payloads).
    async fn fetch_text(&self, url: &str) -> Result<String>;

    /// Stream the archive at `url` into `dest`, overwriting it.
    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadReport>;
}

impl<T: Transport> Transport for &T {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        (**self).fetch_text(url).await
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadReport> {
        (**self).download(url, dest).await
    }
}

/// [`Transport`] over HTTP(S) via a shared `reqwest` client.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Map a transfer failure onto [`StagerError::Network`], translating the
/// opaque connect-level failure into operator language.
fn network_error(url: &str, error: &reqwest::Error) -> StagerError {
    let reason = if error.is_connect() {
        "no internet connection or host not found".to_string()
    } else {
        error.to_string()
    };
    StagerError::Network { url: url.to_string(), reason }
}

impl Transport for HttpTransport {
    async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_error(url, &e))?
            .error_for_status()
            .map_err(|e| network_error(url, &e))?;
        response.text().await.map_err(|e| network_error(url, &e).into())
    }

    async fn download(&self, url: &str, dest: &Path) -> Result<DownloadReport> {
        info!(url, dest = %dest.display(), "downloading archive");
        let started = Instant::now();

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| network_error(url, &e))?
            .error_for_status()
            .map_err(|e| network_error(url, &e))?;

        let total = response.content_length();
        let progress = match total {
            Some(len) => {
                let bar = ProgressBar::new(len);
                bar.set_style(
                    ProgressStyle::with_template(
                        "{msg} [{bar:30.cyan/blue}] {bytes}/{total_bytes} ({eta})",
                    )
                    .unwrap_or_else(|_| ProgressStyle::default_bar()),
                );
                bar
            }
            None => ProgressBar::new_spinner(),
        };
        progress.set_message("downloading");

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create download file: {}", dest.display()))?;

        let mut bytes_written: u64 = 0;
        let mut next_tick = PROGRESS_BYTE_QUANTUM;
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|e| network_error(url, &e))?;
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write to {}", dest.display()))?;
            bytes_written += chunk.len() as u64;
            if bytes_written >= next_tick {
                progress.set_position(bytes_written);
                next_tick += PROGRESS_BYTE_QUANTUM;
            }
        }
        file.flush()
            .await
            .with_context(|| format!("Failed to flush {}", dest.display()))?;
        progress.finish_and_clear();

        let elapsed = started.elapsed();
        debug!(bytes_written, elapsed_ms = elapsed.as_millis(), "download complete");
        Ok(DownloadReport { bytes_written, elapsed })
    }
}
