//! Artifact Clock — modification-time primitives used by every staleness decision.
//!
//! Nothing here is cached: each call reflects the current disk state, since
//! previous pipeline runs (or other processes) may have just written the file.

use std::path::Path;
use std::time::SystemTime;

use walkdir::WalkDir;

/// A file modification time. `None` means "absent" (the path does not exist,
/// or no matching file was found).
pub type Timestamp = Option<SystemTime>;

/// Returns the modification time of `path`, or `None` if it does not exist.
pub fn mtime(path: &Path) -> Timestamp {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Recursively scans `dir` and returns the newest modification time among files
/// whose name ends with one of `suffixes`. Files that vanish mid-scan are skipped.
pub fn max_mtime(dir: &Path, suffixes: &[&str]) -> Timestamp {
    WalkDir::new(dir)
        .follow_links(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy();
            suffixes.iter().any(|suffix| name.ends_with(suffix))
        })
        .filter_map(|entry| entry.metadata().ok().and_then(|m| m.modified().ok()))
        .max()
}

/// Strict "newer than" comparison. An absent input never makes anything newer,
/// and equal timestamps are not newer.
pub fn is_newer(input: Timestamp, artifact: Timestamp) -> bool {
    match (input, artifact) {
        (Some(input), Some(artifact)) => input > artifact,
        _ => false,
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{at, write_with_mtime};
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_mtime_missing_path_is_absent() {
        let dir = TempDir::new().unwrap();
        assert_eq!(mtime(&dir.path().join("nope.html")), None);
    }

    #[test]
    fn test_mtime_existing_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a.html");
        write_with_mtime(&path, "x", at(0));
        assert_eq!(mtime(&path), Some(at(0)));
    }

    #[test]
    fn test_max_mtime_filters_suffix_and_recurses() {
        let dir = TempDir::new().unwrap();
        write_with_mtime(&dir.path().join("index.html"), "x", at(0));
        write_with_mtime(&dir.path().join("parts/job.html"), "x", at(5));
        write_with_mtime(&dir.path().join("style.css"), "x", at(100));
        write_with_mtime(&dir.path().join("notes.txt"), "x", at(500));

        assert_eq!(max_mtime(dir.path(), &[".html"]), Some(at(5)));
        assert_eq!(max_mtime(dir.path(), &[".html", ".css"]), Some(at(100)));
    }

    #[test]
    fn test_max_mtime_missing_or_empty_dir_is_absent() {
        let dir = TempDir::new().unwrap();
        assert_eq!(max_mtime(&dir.path().join("missing"), &[".html"]), None);
        assert_eq!(max_mtime(dir.path(), &[".html"]), None);
    }

    #[test]
    fn test_is_newer_is_strict() {
        assert!(is_newer(Some(at(1)), Some(at(0))));
        assert!(!is_newer(Some(at(0)), Some(at(0))));
        assert!(!is_newer(None, Some(at(0))));
        assert!(!is_newer(Some(at(0)), None));
    }
}
