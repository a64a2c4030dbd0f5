//! Batch renaming: a pure preview plus the checks a commit runs before
//! touching the filesystem.
//!
//! [`preview`] and the commit in
//! [`FileManager::commit_batch_rename`](crate::manager::FileManager::commit_batch_rename)
//! share [`RenameSpec::apply`], so a preview shown to the user is exactly what
//! gets applied.

use crate::error::RenameError;
use crate::naming::{join_name, split_name, validate_component};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Placeholder replaced by the sequence number in [`RenameSpec::Sequential`].
pub const PLACEHOLDER: &str = "{n}";

/// Minimum digits of a sequence number.
const SEQUENCE_WIDTH: usize = 4;

/// How to derive new names. Extensions are always preserved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum RenameSpec {
    /// Replace every occurrence of `find` in the stem
    FindReplace { find: String, replace: String },
    /// Replace the whole stem with `pattern`, substituting [`PLACEHOLDER`]
    Sequential { pattern: String, start_number: u32 },
    /// Wrap the stem
    PrefixSuffix { prefix: String, suffix: String },
}

impl RenameSpec {
    /// Check that this rule can produce names.
    ///
    /// # Errors
    /// `InvalidSpec` when a sequential pattern lacks the placeholder, the
    /// find string is empty, or both prefix and suffix are empty.
    pub fn validate(&self) -> Result<(), RenameError> {
        let reason = match self {
            Self::FindReplace { find, .. } if find.is_empty() => "find text cannot be empty",
            Self::Sequential { pattern, .. } if !pattern.contains(PLACEHOLDER) => {
                "sequential pattern must contain the {n} placeholder"
            }
            Self::PrefixSuffix { prefix, suffix } if prefix.is_empty() && suffix.is_empty() => {
                "prefix and suffix cannot both be empty"
            }
            _ => return Ok(()),
        };
        Err(RenameError::InvalidSpec {
            reason: reason.to_string(),
        })
    }

    /// New name for `name`, the `index`-th file of the batch.
    #[must_use]
    pub fn apply(&self, index: usize, name: &str) -> String {
        let (stem, extension) = split_name(name);
        let stem = match self {
            Self::FindReplace { find, replace } => stem.replace(find.as_str(), replace),
            Self::Sequential {
                pattern,
                start_number,
            } => {
                let number = u64::from(*start_number) + index as u64;
                pattern.replace(PLACEHOLDER, &format!("{number:0SEQUENCE_WIDTH$}"))
            }
            Self::PrefixSuffix { prefix, suffix } => format!("{prefix}{stem}{suffix}"),
        };
        join_name(&stem, extension)
    }
}

/// Compute the new names for `files`, index-aligned with the input.
///
/// # Errors
/// `InvalidSpec` from [`RenameSpec::validate`], or `InvalidName` for a file
/// without a UTF-8 name.
pub fn preview(files: &[PathBuf], spec: &RenameSpec) -> Result<Vec<String>, RenameError> {
    spec.validate()?;
    files
        .iter()
        .enumerate()
        .map(|(index, path)| {
            let name = path
                .file_name()
                .and_then(|n| n.to_str())
                .ok_or_else(|| RenameError::InvalidName {
                    index,
                    name: path.display().to_string(),
                })?;
            Ok(spec.apply(index, name))
        })
        .collect()
}

/// One rename of a validated batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameStep {
    pub index: usize,
    pub from: PathBuf,
    pub to: PathBuf,
}

impl RenameStep {
    /// True when the name does not change.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.from == self.to
    }
}

/// Validate a preview against `files` and the filesystem view `exists`,
/// before any rename happens.
///
/// Every name must be a single path component, and no target may be taken
/// by another existing entry or by an earlier entry of the batch.
///
/// # Errors
/// `LengthMismatch`, `InvalidName` or `Collision`.
pub fn plan<F>(files: &[PathBuf], names: &[String], exists: F) -> Result<Vec<RenameStep>, RenameError>
where
    F: Fn(&Path) -> bool,
{
    if files.len() != names.len() {
        return Err(RenameError::LengthMismatch {
            files: files.len(),
            preview: names.len(),
        });
    }

    let mut claimed = HashSet::with_capacity(files.len());
    let mut steps = Vec::with_capacity(files.len());
    for (index, (from, name)) in files.iter().zip(names).enumerate() {
        validate_component(name).map_err(|_| RenameError::InvalidName {
            index,
            name: name.clone(),
        })?;

        let to = from.parent().unwrap_or_else(|| Path::new("")).join(name);
        if !claimed.insert(to.clone()) || (to != *from && exists(&to)) {
            return Err(RenameError::Collision { index, path: to });
        }
        steps.push(RenameStep {
            index,
            from: from.clone(),
            to,
        });
    }
    Ok(steps)
}
