//! File helpers shared by the loaders and the ingest walk.

use std::fs;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use walkdir::WalkDir;

use crate::error::ContentError;

/// SHA-256 checksum of content, hex encoded.
pub fn calculate_checksum(content: &[u8]) -> String {
    hex::encode(Sha256::digest(content))
}

/// Lower-cased file extension, if any.
pub fn file_extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
}

/// Read raw bytes, refusing files larger than `max_size`.
pub fn read_file_bytes(path: &Path, max_size: u64) -> Result<Vec<u8>, ContentError> {
    let metadata = fs::metadata(path).map_err(|source| ContentError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if metadata.len() > max_size {
        return Err(ContentError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            max: max_size,
        });
    }

    fs::read(path).map_err(|source| ContentError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Read a UTF-8 text file. Invalid UTF-8 is a content error, not a lossy read.
pub fn read_text_file(path: &Path, max_size: u64) -> Result<String, ContentError> {
    let bytes = read_file_bytes(path, max_size)?;
    String::from_utf8(bytes).map_err(|_| ContentError::Encoding(path.to_path_buf()))
}

/// Check a path against glob exclude patterns.
pub fn is_excluded(path: &Path, patterns: &[glob::Pattern]) -> bool {
    let path_str = path.to_string_lossy();
    patterns.iter().any(|p| p.matches(&path_str))
}

/// Compile glob patterns, dropping invalid ones with a warning.
pub fn compile_patterns(patterns: &[String]) -> Vec<glob::Pattern> {
    patterns
        .iter()
        .filter_map(|pattern| match glob::Pattern::new(pattern) {
            Ok(p) => Some(p),
            Err(e) => {
                tracing::warn!(pattern = %pattern, error = %e, "ignoring invalid exclude pattern");
                None
            }
        })
        .collect()
}

/// Result of walking a source directory.
#[derive(Debug, Default)]
pub struct WalkOutcome {
    pub files: Vec<PathBuf>,
    /// Entries that could not be read. The walk continues past them.
    pub errors: Vec<walkdir::Error>,
}

/// Collect regular files under `root` in a stable order, skipping excluded
/// paths. Patterns match the path relative to `root`.
pub fn collect_files(root: &Path, exclude: &[glob::Pattern], follow_links: bool) -> WalkOutcome {
    let mut outcome = WalkOutcome::default();

    for entry in WalkDir::new(root)
        .follow_links(follow_links)
        .sort_by_file_name()
    {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(
                    path = ?e.path(),
                    error = %e,
                    "skipping unreadable entry"
                );
                outcome.errors.push(e);
                continue;
            }
        };
        if !entry.file_type().is_file() && !(follow_links && entry.path().is_file()) {
            continue;
        }
        let relative = entry.path().strip_prefix(root).unwrap_or(entry.path());
        if is_excluded(relative, exclude) {
            continue;
        }
        outcome.files.push(entry.into_path());
    }

    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_checksum() {
        let checksum = calculate_checksum(b"hello world");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, calculate_checksum(b"hello world"));
    }

    #[test]
    fn test_file_extension_lowercased() {
        assert_eq!(file_extension(Path::new("a/B.MD")).as_deref(), Some("md"));
        assert_eq!(file_extension(Path::new("README")), None);
    }

    #[test]
    fn test_read_text_file_rejects_invalid_utf8() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.txt");
        fs::write(&path, [0xff, 0xfe, 0x00, 0x41]).unwrap();

        let err = read_text_file(&path, 1024).unwrap_err();
        assert!(matches!(err, ContentError::Encoding(_)));
    }

    #[test]
    fn test_read_file_bytes_size_limit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.txt");
        fs::write(&path, "x".repeat(100)).unwrap();

        let err = read_file_bytes(&path, 10).unwrap_err();
        assert!(matches!(err, ContentError::TooLarge { size: 100, max: 10, .. }));
    }

    #[test]
    fn test_collect_files_honors_excludes() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("node_modules")).unwrap();
        fs::write(dir.path().join("b.md"), "b").unwrap();
        fs::write(dir.path().join("a.txt"), "a").unwrap();
        fs::write(dir.path().join("node_modules/skip.md"), "skip").unwrap();

        let patterns = compile_patterns(&["**/node_modules/**".to_string()]);
        let outcome = collect_files(dir.path(), &patterns, false);

        assert!(outcome.errors.is_empty());
        let names: Vec<_> = outcome
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.txt", "b.md"]);
    }

    #[test]
    fn test_excludes_ignore_ancestors_of_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("build").join("handbook");
        fs::create_dir_all(root.join("dist")).unwrap();
        fs::write(root.join("a.md"), "a").unwrap();
        fs::write(root.join("dist/bundle.md"), "skip").unwrap();

        let patterns = compile_patterns(&["**/build/**".to_string(), "**/dist/**".to_string()]);
        let outcome = collect_files(&root, &patterns, false);

        assert_eq!(outcome.files, vec![root.join("a.md")]);
    }

    #[cfg(unix)]
    #[test]
    fn test_walk_continues_past_broken_entries() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("a.md"), "a").unwrap();
        fs::write(dir.path().join("z.md"), "z").unwrap();
        std::os::unix::fs::symlink(dir.path().join("missing"), dir.path().join("m.md")).unwrap();

        let outcome = collect_files(dir.path(), &[], true);

        let names: Vec<_> = outcome
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["a.md", "z.md"]);
        assert_eq!(outcome.errors.len(), 1);
    }
}
