//! Deterministic destination-name conflict resolution.

use crate::error::{FileManagerError, Result};
use crate::naming::{join_name, split_name};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Attempt budget for auto-renaming before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 10_000;

/// What to do when a destination is already occupied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    /// Pick the next free `"{stem} N.{ext}"` sibling
    #[default]
    Rename,
    /// Overwrite the existing destination
    Replace,
    /// Leave the existing destination untouched and do nothing
    Skip,
    /// Fail with `Conflict`; used for explicit renames and moves
    Reject,
}

impl std::fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConflictPolicy::Rename => write!(f, "rename"),
            ConflictPolicy::Replace => write!(f, "replace"),
            ConflictPolicy::Skip => write!(f, "skip"),
            ConflictPolicy::Reject => write!(f, "reject"),
        }
    }
}

impl std::str::FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "rename" => Ok(Self::Rename),
            "replace" | "overwrite" => Ok(Self::Replace),
            "skip" => Ok(Self::Skip),
            "reject" | "fail" => Ok(Self::Reject),
            other => Err(format!("unknown conflict policy '{other}'")),
        }
    }
}

/// Outcome of resolving a destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictDecision {
    /// Write to this path; it did not exist at resolution time
    Rename(PathBuf),
    /// Overwrite this existing path
    Replace(PathBuf),
    /// Do nothing
    Skip,
}

impl ConflictDecision {
    /// The destination to write to, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        match self {
            Self::Rename(path) | Self::Replace(path) => Some(path),
            Self::Skip => None,
        }
    }
}

/// Resolves destination paths against an existence predicate.
#[derive(Debug, Clone, Copy)]
pub struct ConflictResolver {
    max_attempts: u32,
}

impl Default for ConflictResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl ConflictResolver {
    /// Create a resolver with a custom auto-rename attempt budget.
    #[must_use]
    pub const fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }

    /// Resolve `desired` under `policy`.
    ///
    /// A free destination always resolves to `Rename(desired)`.
    ///
    /// # Errors
    /// Returns `Conflict` for an occupied destination under
    /// [`ConflictPolicy::Reject`], and `ConflictUnresolved` when auto-rename
    /// runs out of attempts.
    pub fn resolve<F>(&self, desired: &Path, exists: F, policy: ConflictPolicy) -> Result<ConflictDecision>
    where
        F: Fn(&Path) -> bool,
    {
        if !exists(desired) {
            return Ok(ConflictDecision::Rename(desired.to_path_buf()));
        }

        match policy {
            ConflictPolicy::Replace => Ok(ConflictDecision::Replace(desired.to_path_buf())),
            ConflictPolicy::Skip => Ok(ConflictDecision::Skip),
            ConflictPolicy::Reject => Err(FileManagerError::Conflict {
                path: desired.to_path_buf(),
            }),
            ConflictPolicy::Rename => self.next_free(desired, exists).map(ConflictDecision::Rename),
        }
    }

    /// Find the first free `"{stem} N.{ext}"` sibling of `desired`, N >= 2.
    fn next_free<F>(&self, desired: &Path, exists: F) -> Result<PathBuf>
    where
        F: Fn(&Path) -> bool,
    {
        let name = desired
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| FileManagerError::InvalidName {
                name: desired.display().to_string(),
                reason: "destination has no file name".to_string(),
            })?;
        let (stem, extension) = split_name(&name);
        let parent = desired.parent().unwrap_or_else(|| Path::new(""));

        for n in 2..self.max_attempts.saturating_add(2) {
            let candidate = parent.join(join_name(&format!("{stem} {n}"), extension));
            if !exists(&candidate) {
                tracing::trace!(
                    "Auto-renamed '{}' -> '{}'",
                    desired.display(),
                    candidate.display()
                );
                return Ok(candidate);
            }
        }

        Err(FileManagerError::ConflictUnresolved {
            path: desired.to_path_buf(),
            attempts: self.max_attempts,
        })
    }
}

/// Resolve with the default attempt budget.
///
/// # Errors
/// See [`ConflictResolver::resolve`].
pub fn resolve<F>(desired: &Path, exists: F, policy: ConflictPolicy) -> Result<ConflictDecision>
where
    F: Fn(&Path) -> bool,
{
    ConflictResolver::default().resolve(desired, exists, policy)
}
