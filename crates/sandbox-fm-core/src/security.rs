//! Security utilities for path validation and sandboxing.
//!
//! Every path the manager touches goes through a [`PathGuard`], which pins
//! the candidate under a canonical root. Resolution works on paths that do
//! not exist yet: the longest existing ancestor is canonicalized by the OS
//! (resolving symlinks) and the remaining components are appended after
//! lexical normalization.

use crate::error::{FileManagerError, PathError};
use std::path::{Component, Path, PathBuf};

/// Confines path resolution to a single canonical root directory.
#[derive(Debug, Clone)]
pub struct PathGuard {
    root: PathBuf,
}

impl PathGuard {
    /// Create a guard for an existing root directory.
    ///
    /// # Errors
    /// Returns `PathError::Invalid` if the root cannot be canonicalized or is
    /// not a directory.
    pub fn new<P: AsRef<Path>>(root: P) -> Result<Self, PathError> {
        let root = root.as_ref();
        let canonical = root.canonicalize().map_err(|e| PathError::Invalid {
            path: root.to_path_buf(),
            reason: format!("Failed to resolve sandbox root: {e}"),
        })?;
        if !canonical.is_dir() {
            return Err(PathError::Invalid {
                path: root.to_path_buf(),
                reason: "Sandbox root is not a directory".to_string(),
            });
        }
        Ok(Self { root: canonical })
    }

    /// The canonical root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `candidate` (relative to the root, or absolute) to a canonical
    /// path at or below the root.
    ///
    /// # Errors
    /// Returns `OutsideRoot` when the path escapes the sandbox and `Invalid`
    /// for empty paths, NUL bytes or dangling symlinks.
    pub fn resolve<P: AsRef<Path>>(&self, candidate: P) -> Result<PathBuf, PathError> {
        resolve_within(&self.root, candidate.as_ref())
    }

    /// True when `path` is the root itself.
    #[must_use]
    pub fn is_root(&self, path: &Path) -> bool {
        path == self.root
    }

    /// Render a resolved path relative to the root (`.` for the root).
    #[must_use]
    pub fn relative(&self, path: &Path) -> PathBuf {
        match path.strip_prefix(&self.root) {
            Ok(rel) if rel.as_os_str().is_empty() => PathBuf::from("."),
            Ok(rel) => rel.to_path_buf(),
            Err(_) => path.to_path_buf(),
        }
    }
}

/// Resolve `candidate` against `root`, failing if the result leaves `root`.
///
/// `root` is canonicalized as part of the call; prefer [`PathGuard`] when
/// resolving many paths against the same root.
///
/// # Errors
/// See [`PathGuard::resolve`].
pub fn resolve<R: AsRef<Path>, P: AsRef<Path>>(root: R, candidate: P) -> Result<PathBuf, PathError> {
    let root = canonicalize_existing_prefix(&normalize_lexically(root.as_ref()))?;
    resolve_within(&root, candidate.as_ref())
}

fn resolve_within(root: &Path, candidate: &Path) -> Result<PathBuf, PathError> {
    validate_file_path_security(candidate)?;

    let joined = if candidate.is_absolute() {
        candidate.to_path_buf()
    } else {
        root.join(candidate)
    };
    let resolved = canonicalize_existing_prefix(&normalize_lexically(&joined))?;

    if !resolved.starts_with(root) {
        return Err(PathError::OutsideRoot {
            path: candidate.to_path_buf(),
            root: root.to_path_buf(),
        });
    }

    tracing::trace!(
        "Path validated: '{}' -> '{}' (within '{}')",
        candidate.display(),
        resolved.display(),
        root.display()
    );
    Ok(resolved)
}

/// Validates that a file path is non-empty and doesn't contain null bytes.
///
/// # Errors
/// Returns `PathError::Invalid` describing the problem.
pub fn validate_file_path_security(path: &Path) -> Result<(), PathError> {
    if path.as_os_str().is_empty() {
        return Err(PathError::Invalid {
            path: path.to_path_buf(),
            reason: "Path cannot be empty".to_string(),
        });
    }

    if path.to_string_lossy().contains('\0') {
        return Err(PathError::Invalid {
            path: path.to_path_buf(),
            reason: "Path contains null bytes".to_string(),
        });
    }

    Ok(())
}

/// Resolve `.` and `..` without touching the filesystem. `..` at the
/// filesystem root stays at the root.
fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Prefix(_) | Component::RootDir => out.push(component.as_os_str()),
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            Component::Normal(part) => out.push(part),
        }
    }
    out
}

/// Canonicalize the longest existing ancestor of `path` and re-append the
/// components that do not exist yet.
fn canonicalize_existing_prefix(path: &Path) -> Result<PathBuf, PathError> {
    let mut existing = path;
    let mut tail = Vec::new();

    loop {
        match existing.canonicalize() {
            Ok(mut canonical) => {
                for part in tail.iter().rev() {
                    canonical.push(part);
                }
                return Ok(canonical);
            }
            Err(_) if is_symlink(existing) => {
                // Writing through a link that points nowhere could land anywhere.
                return Err(PathError::Invalid {
                    path: path.to_path_buf(),
                    reason: format!("Dangling symlink at '{}'", existing.display()),
                });
            }
            Err(_) => {
                let (Some(name), Some(parent)) = (existing.file_name(), existing.parent()) else {
                    return Ok(path.to_path_buf());
                };
                tail.push(name.to_os_string());
                existing = parent;
            }
        }
    }
}

fn is_symlink(path: &Path) -> bool {
    path.symlink_metadata()
        .is_ok_and(|meta| meta.file_type().is_symlink())
}

/// Sets secure permissions on a directory (Unix only).
///
/// # Errors
/// Returns `Permission` if the mode cannot be applied, or `Path` if the
/// directory is missing on non-Unix targets.
pub async fn set_secure_permissions(path: &Path) -> Result<(), FileManagerError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o700);
        tokio::fs::set_permissions(path, perms)
            .await
            .map_err(|_e| FileManagerError::Permission {
                operation: "set secure permissions".to_string(),
                path: path.to_path_buf(),
            })?;
    }

    #[cfg(not(unix))]
    {
        if !path.exists() {
            return Err(PathError::Invalid {
                path: path.to_path_buf(),
                reason: "Directory does not exist".to_string(),
            }
            .into());
        }
    }

    Ok(())
}
