//! # Sandboxed File Manager Core
//!
//! A file-management library confined to a single root directory: browse,
//! create, rename, move, copy, duplicate, delete and import items, compute
//! checksums, search by name or content, zip and unzip with progress, and
//! batch-rename with a preview that is guaranteed to match what gets applied.
//!
//! ## Features
//!
//! - **Sandboxed Operations**: every path goes through a [`PathGuard`]; nothing
//!   resolves outside the root, including through `..` or symlinks
//! - **Deterministic Conflicts**: occupied destinations are renamed
//!   (`report 2.txt`), replaced, skipped or rejected per call
//! - **Single-Pass Checksums**: MD5, SHA-1, SHA-256 and SHA-512 from one read
//! - **Search**: lazy recursive walk with name, content (text files only, via
//!   magic-number sniffing) and size/extension filters
//! - **Archives**: ZIP/DEFLATE with optional AES-256 password, zip-slip
//!   protection, progress callbacks and cancellation
//! - **Serialized Mutations**: per-directory locks keep concurrent mutations
//!   in one directory from racing
//!
//! ## Basic Usage
//!
//! ```rust,no_run
//! use sandbox_fm_core::{ConflictPolicy, FileManager, HashAlgorithm};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = FileManager::builder().root("/var/lib/myapp/files").build().await?;
//!
//! manager.create_directory("docs", ConflictPolicy::Reject).await?;
//! manager.navigate_to("docs").await?;
//! let outcome = manager
//!     .create_file("report.txt", "quarterly numbers", ConflictPolicy::Rename)
//!     .await?;
//! for entry in &outcome.listing {
//!     println!("{} {:?}", entry.name, entry.size_bytes);
//! }
//!
//! manager.duplicate("docs/report.txt").await?; // docs/report 2.txt
//! let sums = manager.checksum("docs/report.txt", &[HashAlgorithm::Sha256]).await?;
//! println!("{:?}", sums.get(HashAlgorithm::Sha256));
//! # Ok(())
//! # }
//! ```
//!
//! ## Archives and Cancellation
//!
//! ```rust,no_run
//! use sandbox_fm_core::{FileManager, UnpackRequest, progress_channel};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example(manager: FileManager) -> Result<(), Box<dyn std::error::Error>> {
//! let (progress, mut rx) = progress_channel();
//! tokio::spawn(async move {
//!     while rx.changed().await.is_ok() {
//!         println!("{:.0}%", *rx.borrow() * 100.0);
//!     }
//! });
//!
//! let cancel = CancellationToken::new();
//! manager
//!     .pack(&["docs"], "backup", None, progress.clone(), cancel.clone())
//!     .await?;
//! manager
//!     .unpack("backup.zip", UnpackRequest::default(), progress, cancel)
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Batch Rename
//!
//! ```rust,no_run
//! use sandbox_fm_core::{FileManager, RenameSpec, batch, no_progress};
//! use std::path::PathBuf;
//!
//! # async fn example(manager: FileManager, files: Vec<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
//! let spec = RenameSpec::Sequential { pattern: "File_{n}".into(), start_number: 1 };
//! let names = batch::preview(&files, &spec)?; // File_0001.jpg, File_0002.jpg, ...
//! manager.commit_batch_rename(&files, &names, no_progress()).await?;
//! # Ok(())
//! # }
//! ```

pub mod archive;
pub mod batch;
pub mod checksum;
pub mod conflict;
pub mod error;
pub mod file_types;
pub mod locks;
pub mod manager;
pub mod naming;
pub mod progress;
pub mod search;
pub mod security;

pub use archive::{
    ArchiveDirection, ArchiveEngine, ArchiveEntry, ArchiveJob, ArchiveOutcome, PackSummary, UnpackSummary,
};
pub use batch::{PLACEHOLDER, RenameSpec};
pub use checksum::{ChecksumEngine, ChecksumSet, HashAlgorithm};
pub use conflict::{ConflictDecision, ConflictPolicy, ConflictResolver};
pub use error::{ArchiveError, FileManagerError, PathError, RenameError, Result};
pub use file_types::{ContentKind, FileCategory};
pub use manager::{
    DirectoryEntry, FileManager, FileManagerBuilder, FileManagerConfig, IconLookup, MutationOutcome,
    NavigationState, NoIcons, SortKey, UnpackRequest,
};
pub use progress::{ProgressCallback, ProgressReporter, no_progress, progress_channel};
pub use search::{SearchCriteria, SearchEngine};
pub use security::PathGuard;

// Re-export commonly used types
pub use tokio_util::sync::CancellationToken;
