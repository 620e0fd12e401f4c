use std::io::Write;
use std::path::Path;

use crate::errors::BuildError;

/// Writes `bytes` to `path` via a sibling temp file and rename, creating parent
/// directories as needed. The previous file stays intact if anything fails.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), BuildError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(parent).map_err(|e| BuildError::io(parent, e))?;

    let mut tmp = tempfile::NamedTempFile::new_in(parent).map_err(|e| BuildError::io(parent, e))?;
    tmp.write_all(bytes).map_err(|e| BuildError::io(tmp.path(), e))?;
    tmp.as_file().sync_all().map_err(|e| BuildError::io(tmp.path(), e))?;
    tmp.persist(path).map_err(|e| BuildError::io(path, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_creates_parent_dirs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("output/nested/alice.html");
        write_atomic(&path, b"<html/>").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"<html/>");
    }

    #[test]
    fn test_replaces_existing_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("alice.pdf");
        write_atomic(&path, b"one").unwrap();
        write_atomic(&path, b"two").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"two");
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
