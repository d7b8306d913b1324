// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utility functions for rubric-rag

use std::path::{Path, PathBuf};

/// The name of the data directory holding the index database
pub const DATA_DIR: &str = ".rubric-rag";

/// Find the nearest directory holding a .rubric-rag folder by walking up
/// from the given path. Returns None if no data directory is found.
pub fn find_data_root(start: impl AsRef<Path>) -> Option<PathBuf> {
    let start = start.as_ref();
    let start = start.canonicalize().unwrap_or_else(|_| start.to_path_buf());
    start
        .ancestors()
        .find(|dir| dir.join(DATA_DIR).is_dir())
        .map(Path::to_path_buf)
}

/// Get the directory that relative index paths resolve against.
/// Falls back to the given path if no data directory exists yet.
pub fn get_root_with_data(path: impl AsRef<Path>) -> PathBuf {
    find_data_root(&path).unwrap_or_else(|| path.as_ref().to_path_buf())
}

/// Shorten text to at most `max_chars` characters, appending "..." when cut.
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn find_data_root_in_current_dir() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(DATA_DIR)).unwrap();

        let root = find_data_root(dir.path()).unwrap();
        assert_eq!(root, dir.path().canonicalize().unwrap());
    }

    #[test]
    fn find_data_root_in_parent() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join(DATA_DIR)).unwrap();
        let subdir = dir.path().join("reports");
        fs::create_dir(&subdir).unwrap();

        let root = find_data_root(&subdir).unwrap();
        assert_eq!(root, dir.path().canonicalize().unwrap());
        assert_eq!(get_root_with_data(&subdir), root);
    }

    #[test]
    fn root_falls_back_to_start() {
        let dir = TempDir::new().unwrap();
        assert!(find_data_root(dir.path()).is_none());
        assert_eq!(get_root_with_data(dir.path()), dir.path().to_path_buf());
    }

    #[test]
    fn truncates_on_char_boundary() {
        assert_eq!(truncate_chars("short", 10), "short");
        assert_eq!(truncate_chars("résumé text", 6), "résumé...");
    }
}
