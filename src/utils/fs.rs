//! Small filesystem helpers shared by the staging and swap paths.
//!
//! These are synchronous on purpose: callers on the async paths wrap them
//! in `spawn_blocking` when the trees involved can be large.

use std::path::Path;

use anyhow::{Context, Result};

/// Create `path` and any missing parents.
pub fn ensure_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path)
        .with_context(|| format!("Failed to create directory: {}", path.display()))
}

/// Recursively copy `src` into `dst`, creating `dst` if needed.
///
/// Relative structure is preserved; existing files in `dst` are
/// overwritten. Symlinks are followed (the install trees this operates on
/// do not contain them).
pub fn copy_dir_all(src: &Path, dst: &Path) -> Result<()> {
    ensure_dir(dst)?;
    for entry in std::fs::read_dir(src)
        .with_context(|| format!("Failed to read directory: {}", src.display()))?
    {
        let entry = entry?;
        let target = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_all(&entry.path(), &target)?;
        } else {
            std::fs::copy(entry.path(), &target).with_context(|| {
                format!(
                    "Failed to copy {} to {}",
                    entry.path().display(),
                    target.display()
                )
            })?;
        }
    }
    Ok(())
}

/// Remove a directory tree if it exists; missing is not an error.
pub fn remove_dir_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_dir_all(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to remove directory: {}", path.display()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn copy_dir_all_preserves_structure() {
        let temp = TempDir::new().unwrap();
        let src = temp.path().join("src");
        let dst = temp.path().join("dst");

        std::fs::create_dir_all(src.join("bin")).unwrap();
        std::fs::write(src.join("bin/run.sh"), "#!/bin/sh\n").unwrap();
        std::fs::write(src.join("top.txt"), "top").unwrap();

        copy_dir_all(&src, &dst).unwrap();

        assert_eq!(
            std::fs::read_to_string(dst.join("bin/run.sh")).unwrap(),
            "#!/bin/sh\n"
        );
        assert_eq!(std::fs::read_to_string(dst.join("top.txt")).unwrap(), "top");
    }

    #[test]
    fn remove_dir_if_exists_tolerates_missing() {
        let temp = TempDir::new().unwrap();
        let gone = temp.path().join("never-created");
        assert!(remove_dir_if_exists(&gone).is_ok());

        let there = temp.path().join("there");
        std::fs::create_dir(&there).unwrap();
        std::fs::write(there.join("f"), "x").unwrap();
        remove_dir_if_exists(&there).unwrap();
        assert!(!there.exists());
    }
}
