//! Error types for the sandboxed file manager.

use std::path::PathBuf;

/// Result type for sandboxed file operations.
pub type Result<T> = std::result::Result<T, FileManagerError>;

/// Path resolution failures raised by the [`PathGuard`](crate::security::PathGuard).
#[derive(Debug, thiserror::Error)]
pub enum PathError {
    /// The resolved path escaped the sandbox root
    #[error("Path escapes sandbox: {path:?} (outside {root:?})")]
    OutsideRoot { path: PathBuf, root: PathBuf },

    /// The candidate path cannot be resolved at all
    #[error("Path validation failed: {path:?} - {reason}")]
    Invalid { path: PathBuf, reason: String },
}

/// Errors raised while packing or unpacking archives.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    /// The archive is not a readable zip file, or contains unsafe entries
    #[error("Invalid archive format: {path:?} - {reason}")]
    InvalidFormat { path: PathBuf, reason: String },

    /// A read or write failed part-way; `entries_written` entries were already produced
    #[error("Archive I/O failure on {path:?} after {entries_written} entries: {reason}")]
    IoFailure {
        path: PathBuf,
        reason: String,
        entries_written: usize,
    },

    /// The job was cancelled; `entries_written` entries were already produced
    #[error("Archive job cancelled after {entries_written} entries")]
    Cancelled { entries_written: usize },

    /// The archive is encrypted and no password was supplied
    #[error("Archive requires a password: {path:?}")]
    PasswordRequired { path: PathBuf },

    /// The supplied password does not decrypt the archive
    #[error("Invalid archive password: {path:?}")]
    InvalidPassword { path: PathBuf },
}

impl ArchiveError {
    /// Number of entries already written when the job failed.
    #[must_use]
    pub const fn entries_written(&self) -> usize {
        match self {
            Self::IoFailure {
                entries_written, ..
            }
            | Self::Cancelled { entries_written } => *entries_written,
            _ => 0,
        }
    }
}

/// Errors raised by batch rename validation and commit.
#[derive(Debug, thiserror::Error)]
pub enum RenameError {
    /// The rename specification cannot produce names
    #[error("Invalid rename specification: {reason}")]
    InvalidSpec { reason: String },

    /// Preview and file list differ in length
    #[error("Preview has {preview} names for {files} files")]
    LengthMismatch { files: usize, preview: usize },

    /// A proposed name is not a valid single path component
    #[error("Invalid name at index {index}: {name:?}")]
    InvalidName { index: usize, name: String },

    /// A proposed name collides with an existing file or another batch entry
    #[error("Name collision at index {index}: {path:?}")]
    Collision { index: usize, path: PathBuf },

    /// Commit stopped part-way; the first `applied_count` renames remain applied
    #[error("Batch rename stopped at index {failed_at} after {applied_count} renames: {reason}")]
    PartialFailure {
        applied_count: usize,
        failed_at: usize,
        reason: String,
    },
}

/// Errors that can occur during sandboxed file operations.
#[derive(Debug, thiserror::Error)]
pub enum FileManagerError {
    /// Path validation failed - potential security issue
    #[error(transparent)]
    Path(#[from] PathError),

    /// An explicit rename or move target already exists
    #[error("Destination already exists: {path:?}")]
    Conflict { path: PathBuf },

    /// Auto-rename exhausted its attempt budget
    #[error("Could not find a free name for {path:?} after {attempts} attempts")]
    ConflictUnresolved { path: PathBuf, attempts: u32 },

    /// I/O operation failed
    #[error("I/O error during {operation} on {path:?}: {source}")]
    Io {
        operation: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },

    /// Path exists but is not a directory
    #[error("Not a directory: {path:?}")]
    NotADirectory { path: PathBuf },

    /// Path does not exist
    #[error("File not found: {path:?}")]
    NotFound { path: PathBuf },

    /// A user supplied name is not a single valid path component
    #[error("Invalid name: {name:?} - {reason}")]
    InvalidName { name: String, reason: String },

    /// The operation is not permitted on this target
    #[error("Invalid operation: {reason}")]
    InvalidOperation { reason: String },

    /// Archive pack/unpack failed
    #[error(transparent)]
    Archive(#[from] ArchiveError),

    /// Batch rename failed
    #[error(transparent)]
    Rename(#[from] RenameError),

    /// A cancellable operation was cancelled
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: &'static str },

    /// Directory creation failed
    #[error("Failed to create directory: {path:?} - {source}")]
    DirectoryCreation {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Permissions error
    #[error("Permission denied: {operation} on {path:?}")]
    Permission { operation: String, path: PathBuf },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl FileManagerError {
    /// Wrap an I/O error with the operation and path it happened on.
    pub fn io<P: Into<PathBuf>>(operation: &'static str, path: P, source: std::io::Error) -> Self {
        Self::Io {
            operation,
            path: path.into(),
            source,
        }
    }

    /// True when the error is the sandbox boundary check.
    #[must_use]
    pub const fn is_outside_root(&self) -> bool {
        matches!(self, Self::Path(PathError::OutsideRoot { .. }))
    }
}
