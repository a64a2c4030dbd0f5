//! File name helpers shared by conflict resolution and batch renaming.

use crate::error::{FileManagerError, Result};
use std::path::Path;

/// Split a file name into `(stem, extension)`.
///
/// Leading-dot names without a further dot (`.bashrc`) have no extension,
/// and only the last dot counts (`archive.tar.gz` -> `archive.tar`, `gz`).
#[must_use]
pub fn split_name(name: &str) -> (&str, Option<&str>) {
    match name.rfind('.') {
        Some(0) | None => (name, None),
        Some(idx) if idx == name.len() - 1 => (name, None),
        Some(idx) => (&name[..idx], Some(&name[idx + 1..])),
    }
}

/// Join a stem and optional extension back into a file name.
#[must_use]
pub fn join_name(stem: &str, extension: Option<&str>) -> String {
    match extension {
        Some(ext) => format!("{stem}.{ext}"),
        None => stem.to_string(),
    }
}

/// The final component of `path` as UTF-8.
///
/// # Errors
/// Returns `InvalidName` when the path has no file name or it is not UTF-8.
pub fn file_name_of(path: &Path) -> Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| FileManagerError::InvalidName {
            name: path.display().to_string(),
            reason: "path has no UTF-8 file name".to_string(),
        })
}

/// Check that `name` is usable as a single path component.
///
/// # Errors
/// Returns `InvalidName` for empty names, `.`/`..`, names containing a path
/// separator or NUL byte.
pub fn validate_component(name: &str) -> Result<()> {
    let reason = if name.is_empty() {
        Some("name cannot be empty")
    } else if name == "." || name == ".." {
        Some("name cannot be a relative path segment")
    } else if name.contains('/') || name.contains('\\') {
        Some("name contains a path separator")
    } else if name.contains('\0') {
        Some("name contains null bytes")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(FileManagerError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("report.txt"), ("report", Some("txt")));
        assert_eq!(split_name("archive.tar.gz"), ("archive.tar", Some("gz")));
        assert_eq!(split_name("README"), ("README", None));
        assert_eq!(split_name(".bashrc"), (".bashrc", None));
        assert_eq!(split_name(".config.json"), (".config", Some("json")));
        assert_eq!(split_name("trailing."), ("trailing.", None));
    }

    #[test]
    fn test_join_name() {
        assert_eq!(join_name("report 2", Some("txt")), "report 2.txt");
        assert_eq!(join_name("Folder 3", None), "Folder 3");
    }

    #[test]
    fn test_validate_component() {
        assert!(validate_component("notes.md").is_ok());
        assert!(validate_component("with space").is_ok());
        for bad in ["", ".", "..", "a/b", "a\\b", "nul\0"] {
            assert!(validate_component(bad).is_err(), "should reject {bad:?}");
        }
    }
}
