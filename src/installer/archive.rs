//! Archive extraction into a staging directory.

use std::fs::File;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

/// Unpacks a downloaded archive into a directory.
///
/// A trait so the staging pipeline can run against a fake that lays down
/// plain files without real archives.
///
/// The returned futures carry no `Send` promise: callers await them in
/// place and never spawn them onto another task.
#[allow(async_fn_in_trait)]
pub trait ArchiveExtractor {
    /// Extract `archive` into `dest`, which already exists.
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<()>;
}

/// [`ArchiveExtractor`] for zip archives.
///
/// Extraction is CPU- and disk-bound, so the whole walk runs under
/// `spawn_blocking`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ZipExtractor;

impl ArchiveExtractor for ZipExtractor {
    async fn extract(&self, archive: &Path, dest: &Path) -> Result<()> {
        let archive = archive.to_path_buf();
        let dest = dest.to_path_buf();
        tokio::task::spawn_blocking(move || extract_zip(&archive, &dest))
            .await
            .context("spawn_blocking panicked")?
    }
}

fn extract_zip(archive_path: &Path, dest: &Path) -> Result<()> {
    let file = File::open(archive_path)
        .with_context(|| format!("Failed to open archive: {}", archive_path.display()))?;
    let mut archive = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read archive: {}", archive_path.display()))?;

    debug!(
        archive = %archive_path.display(),
        entries = archive.len(),
        "extracting archive"
    );

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .with_context(|| format!("Failed to read entry {i} in archive"))?;

        // Entries with unsafe paths (absolute, or escaping via ..) are
        // skipped rather than extracted.
        let Some(relative) = entry.enclosed_name() else {
            debug!(name = entry.name(), "skipping archive entry with unsafe path");
            continue;
        };
        let target = dest.join(relative);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)
                .with_context(|| format!("Failed to create {}", target.display()))?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let mut out = File::create(&target)
            .with_context(|| format!("Failed to create {}", target.display()))?;
        io::copy(&mut entry, &mut out)
            .with_context(|| format!("Failed to extract {}", target.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_sample_zip(path: &Path) {
        let file = File::create(path).unwrap();
        let mut writer = zip::ZipWriter::new(file);
        let options = SimpleFileOptions::default();

        writer.add_directory("bin/", options).unwrap();
        writer.start_file("bin/run.sh", options).unwrap();
        writer.write_all(b"#!/bin/sh\necho ok\n").unwrap();
        writer.start_file("version.txt", options).unwrap();
        writer.write_all(b"acme-core-v1.9_0400\n").unwrap();
        writer.finish().unwrap();
    }

    #[tokio::test]
    async fn extracts_files_and_directories() {
        let temp = TempDir::new().unwrap();
        let archive = temp.path().join("dist.zip");
        let dest = temp.path().join("stage");
        std::fs::create_dir(&dest).unwrap();
        write_sample_zip(&archive);

        ZipExtractor.extract(&archive, &dest).await.unwrap();

        assert!(dest.join("bin").is_dir());
        assert_eq!(
            std::fs::read_to_string(dest.join("bin/run.sh")).unwrap(),
            "#!/bin/sh\necho ok\n"
        );
        assert_eq!(
            std::fs::read_to_string(dest.join("version.txt")).unwrap(),
            "acme-core-v1.9_0400\n"
        );
    }

    #[tokio::test]
    async fn rejects_non_archive_input() {
        let temp = TempDir::new().unwrap();
        let not_zip = temp.path().join("not.zip");
        std::fs::write(&not_zip, "plain text").unwrap();
        let dest = temp.path().join("stage");
        std::fs::create_dir(&dest).unwrap();

        assert!(ZipExtractor.extract(&not_zip, &dest).await.is_err());
    }
}
