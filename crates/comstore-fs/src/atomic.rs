//! Write-then-rename file replacement.

use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

/// Replace `target` with `bytes`.
///
/// The bytes go to a temp file in the same directory which is then renamed
/// over the target, so readers see either the old or the new content.
/// Missing parent directories are created.
pub fn write_atomic(target: &Path, bytes: &[u8]) -> io::Result<()> {
    let parent = parent_dir(target);
    std::fs::create_dir_all(&parent)?;

    let mut file = NamedTempFile::new_in(&parent)?;
    file.write_all(bytes)?;
    file.as_file().sync_all()?;
    file.persist(target).map_err(|e| e.error)?;
    Ok(())
}

fn parent_dir(target: &Path) -> PathBuf {
    match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_creates_parents_and_replaces() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a/b/file.txt");

        write_atomic(&target, b"first").unwrap();
        write_atomic(&target, b"second").unwrap();

        assert_eq!(std::fs::read(&target).unwrap(), b"second");
        let leftovers = std::fs::read_dir(dir.path().join("a/b")).unwrap().count();
        assert_eq!(leftovers, 1);
    }
}
