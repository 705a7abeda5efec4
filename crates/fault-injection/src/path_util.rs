//! Path splitting helpers used to key the facade's directory-scoped ledgers.

use std::path::{Path, PathBuf};

/// Split an absolute path into `(directory, filename)`, trimming trailing
/// separators before splitting.
///
/// `filename` is the basename; `directory` is everything before it. A path
/// with no parent (e.g. `/`) yields `directory == path` and an empty
/// `filename`.
pub fn split(path: &Path) -> (PathBuf, String) {
    let trimmed = trim_trailing_separators(path);
    let filename = trimmed
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let directory = trimmed
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| trimmed.clone());
    (directory, filename)
}

/// Remove trailing path separators, leaving the root (`/`) intact.
pub fn trim_trailing_separators(path: &Path) -> PathBuf {
    let s = path.to_string_lossy();
    let trimmed = s.trim_end_matches(std::path::MAIN_SEPARATOR);
    if trimmed.is_empty() {
        PathBuf::from(std::path::MAIN_SEPARATOR.to_string())
    } else {
        PathBuf::from(trimmed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_ordinary_path() {
        let (dir, file) = split(Path::new("/db/a.log"));
        assert_eq!(dir, PathBuf::from("/db"));
        assert_eq!(file, "a.log");
    }

    #[test]
    fn trims_trailing_separator_before_splitting() {
        let (dir, file) = split(Path::new("/db/sub/"));
        assert_eq!(dir, PathBuf::from("/db"));
        assert_eq!(file, "sub");
    }

    #[test]
    fn nested_path() {
        let (dir, file) = split(Path::new("/a/b/c/d.sst"));
        assert_eq!(dir, PathBuf::from("/a/b/c"));
        assert_eq!(file, "d.sst");
    }

    #[test]
    fn root_has_no_filename() {
        let (dir, file) = split(Path::new("/"));
        assert_eq!(dir, PathBuf::from("/"));
        assert_eq!(file, "");
    }
}
