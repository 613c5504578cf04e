//! Filesystem utilities for atomic note writes.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Atomically rename a file, with fallback for platforms where rename fails if target exists.
///
/// On some platforms (notably Windows), `fs::rename` fails if the destination already exists.
/// This function handles that case by removing the destination first and retrying.
///
/// # Errors
///
/// Returns an error if the rename fails even after the fallback attempt.
pub fn rename_with_fallback(source: &Path, destination: &Path) -> io::Result<()> {
    if let Err(initial_err) = fs::rename(source, destination) {
        if !source.exists() {
            return Err(initial_err);
        }
        // Best-effort replace on platforms where rename fails if target exists.
        let _ = fs::remove_file(destination);
        fs::rename(source, destination).map_err(|retry_err| {
            io::Error::new(
                retry_err.kind(),
                format!(
                    "Atomic rename failed (initial: {}, retry: {})",
                    initial_err, retry_err
                ),
            )
        })?;
    }
    Ok(())
}

/// Write `data` to `path` through a temp file in the same directory.
///
/// The temp name starts with a dot and ends in `.tmp`, so directory scans
/// and the watcher never mistake it for a note. Readers observe either the
/// old or the new content, never a partial write.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "invalid filename"))?;

    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default();
    let temp_path = parent.join(format!(".{}.{}.tmp", filename, nanos));

    let result = (|| {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)?;
        file.write_all(data)?;
        file.sync_all()?;
        rename_with_fallback(&temp_path, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&temp_path);
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::tempdir;

    #[test]
    fn test_rename_new_file() {
        let dir = tempdir().unwrap();
        let temp = dir.path().join("temp.txt");
        let dest = dir.path().join("dest.txt");

        File::create(&temp).unwrap().write_all(b"test").unwrap();

        rename_with_fallback(&temp, &dest).unwrap();

        assert!(!temp.exists());
        assert_eq!(fs::read_to_string(&dest).unwrap(), "test");
    }

    #[test]
    fn test_rename_missing_source_fails() {
        let dir = tempdir().unwrap();
        let result = rename_with_fallback(&dir.path().join("nope"), &dir.path().join("dest"));
        assert!(result.is_err());
    }

    #[test]
    fn test_write_atomic_replaces_content() {
        let dir = tempdir().unwrap();
        let dest = dir.path().join("0a1b2c3d.json");

        write_atomic(&dest, b"old").unwrap();
        write_atomic(&dest, b"new").unwrap();

        assert_eq!(fs::read_to_string(&dest).unwrap(), "new");
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
