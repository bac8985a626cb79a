//! Filesystem helpers for pipeline artifacts.

use std::path::Path;

use tracing::warn;

use crate::error::MediaResult;

/// Create a directory and all parents.
pub fn ensure_dir(path: impl AsRef<Path>) -> MediaResult<()> {
    std::fs::create_dir_all(path.as_ref())?;
    Ok(())
}

/// File size in bytes; 0 for missing files.
pub fn file_size(path: impl AsRef<Path>) -> u64 {
    std::fs::metadata(path.as_ref()).map(|m| m.len()).unwrap_or(0)
}

/// Whether the file exists, is non-empty, and is at least `min_bytes`
/// long.
pub fn file_at_least(path: impl AsRef<Path>, min_bytes: u64) -> bool {
    let size = file_size(path);
    size > 0 && size >= min_bytes
}

/// Delete a file if it exists, logging instead of failing.
pub fn remove_file_quietly(path: impl AsRef<Path>) {
    let path = path.as_ref();
    if !path.exists() {
        return;
    }
    if let Err(err) = std::fs::remove_file(path) {
        warn!(path = %path.display(), error = %err, "Failed to remove file");
    }
}

/// Delete a directory tree if it exists, logging instead of failing.
pub fn remove_dir_quietly(path: impl AsRef<Path>) {
    let path = path.as_ref();
    if !path.exists() {
        return;
    }
    if let Err(err) = std::fs::remove_dir_all(path) {
        warn!(path = %path.display(), error = %err, "Failed to remove directory");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_size_and_threshold() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.bin");
        std::fs::write(&path, vec![0u8; 2048]).unwrap();

        assert_eq!(file_size(&path), 2048);
        assert!(file_at_least(&path, 1024));
        assert!(!file_at_least(&path, 4096));
        assert!(!file_at_least(dir.path().join("missing"), 1));
    }

    #[test]
    fn test_remove_quietly_tolerates_missing() {
        let dir = tempfile::tempdir().unwrap();
        remove_file_quietly(dir.path().join("missing.txt"));
        remove_dir_quietly(dir.path().join("missing_dir"));
    }
}
