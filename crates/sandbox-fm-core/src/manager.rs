//! Core sandboxed file manager implementation.

use crate::{
    archive::{ArchiveEngine, ArchiveEntry},
    batch,
    checksum::{ChecksumEngine, ChecksumSet, HashAlgorithm},
    conflict::{ConflictDecision, ConflictPolicy, ConflictResolver},
    error::{FileManagerError, RenameError, Result},
    file_types::FileCategory,
    locks::DirectoryLocks,
    naming::{file_name_of, split_name, validate_component},
    progress::{ProgressCallback, ProgressReporter},
    search::{DEFAULT_MAX_CONTENT_BYTES, DEFAULT_RESULT_CAP, SearchCriteria, SearchEngine},
    security::{PathGuard, set_secure_permissions},
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::HashMap,
    io,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::{fs, sync::RwLock};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use walkdir::WalkDir;

/// Tunables for a [`FileManager`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FileManagerConfig {
    /// Maximum number of search results returned
    pub search_result_cap: usize,
    /// Attempt budget for auto-renaming
    pub max_rename_attempts: u32,
    /// Read chunk size for checksums
    pub checksum_chunk_size: usize,
    /// Files above this size are searched by name only
    pub max_content_bytes: u64,
    /// Include dot-files in listings
    pub show_hidden: bool,
}

impl Default for FileManagerConfig {
    fn default() -> Self {
        Self {
            search_result_cap: DEFAULT_RESULT_CAP,
            max_rename_attempts: crate::conflict::DEFAULT_MAX_ATTEMPTS,
            checksum_chunk_size: crate::checksum::DEFAULT_CHUNK_SIZE,
            max_content_bytes: DEFAULT_MAX_CONTENT_BYTES,
            show_hidden: true,
        }
    }
}

/// Where the current directory sits relative to the root.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NavigationState {
    AtRoot,
    InSubdirectory { depth: usize },
}

/// One row of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Fresh for every listing call
    pub id: Uuid,
    pub name: String,
    pub absolute_path: PathBuf,
    pub is_directory: bool,
    /// Files only
    pub size_bytes: Option<u64>,
    pub modified_at: Option<DateTime<Utc>>,
    pub custom_icon_ref: Option<String>,
    pub category: FileCategory,
}

/// Listing order. Directories always come first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortKey {
    /// Case-insensitive name, ascending
    #[default]
    Name,
    /// Largest first
    Size,
    /// Newest first
    Modified,
}

impl std::str::FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "name" => Ok(Self::Name),
            "size" => Ok(Self::Size),
            "modified" | "mtime" | "date" => Ok(Self::Modified),
            other => Err(format!("unknown sort key '{other}'")),
        }
    }
}

/// Read-only source of custom icon keys, looked up by absolute path.
pub trait IconLookup: Send + Sync + std::fmt::Debug {
    fn icon_for(&self, absolute_path: &str) -> Option<String>;
}

impl IconLookup for HashMap<String, String> {
    fn icon_for(&self, absolute_path: &str) -> Option<String> {
        self.get(absolute_path).cloned()
    }
}

/// An [`IconLookup`] that never has an icon.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoIcons;

impl IconLookup for NoIcons {
    fn icon_for(&self, _absolute_path: &str) -> Option<String> {
        None
    }
}

/// Result of a mutation: the path it produced (if any) and a fresh listing
/// of the current directory.
#[derive(Debug, Clone, Serialize)]
pub struct MutationOutcome {
    /// `None` when the operation was skipped by policy
    pub path: Option<PathBuf>,
    pub listing: Vec<DirectoryEntry>,
}

/// Options for [`FileManager::unpack`].
#[derive(Debug, Clone, Default)]
pub struct UnpackRequest {
    /// Defaults to the archive's own directory
    pub destination: Option<PathBuf>,
    pub policy: ConflictPolicy,
    pub password: Option<String>,
    /// Remove the archive once every entry was extracted
    pub delete_archive_on_success: bool,
}

/// Main sandboxed file manager.
///
/// Cheap to clone; clones share the current directory and directory locks.
#[derive(Clone, Debug)]
pub struct FileManager {
    guard: PathGuard,
    current: Arc<RwLock<PathBuf>>,
    config: FileManagerConfig,
    icons: Arc<dyn IconLookup>,
    locks: Arc<DirectoryLocks>,
    resolver: ConflictResolver,
    search: SearchEngine,
    checksums: ChecksumEngine,
    archives: ArchiveEngine,
}

fn exists(path: &Path) -> bool {
    path.symlink_metadata().is_ok()
}

impl FileManager {
    /// Create a new builder for configuring the manager.
    #[must_use]
    pub fn builder() -> FileManagerBuilder {
        FileManagerBuilder::new()
    }

    /// The canonical sandbox root.
    #[must_use]
    pub fn root(&self) -> &Path {
        self.guard.root()
    }

    #[must_use]
    pub const fn config(&self) -> &FileManagerConfig {
        &self.config
    }

    /// Resolve `path` inside the sandbox. Relative paths are taken from the
    /// root, matching how breadcrumbs are addressed.
    ///
    /// # Errors
    /// Returns `Path` errors for escapes and invalid input.
    pub fn resolve<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        Ok(self.guard.resolve(path)?)
    }

    /// The directory listings and relative mutations operate on.
    pub async fn current_directory(&self) -> PathBuf {
        self.current.read().await.clone()
    }

    pub async fn state(&self) -> NavigationState {
        let current = self.current_directory().await;
        match current.strip_prefix(self.root()) {
            Ok(rel) if rel.as_os_str().is_empty() => NavigationState::AtRoot,
            Ok(rel) => NavigationState::InSubdirectory {
                depth: rel.components().count(),
            },
            Err(_) => NavigationState::AtRoot,
        }
    }

    /// Enter a directory taken from a listing.
    ///
    /// # Errors
    /// `NotADirectory` for file entries, `Path` errors if the entry no longer
    /// resolves inside the sandbox.
    pub async fn navigate_into(&self, entry: &DirectoryEntry) -> Result<PathBuf> {
        if !entry.is_directory {
            return Err(FileManagerError::NotADirectory {
                path: entry.absolute_path.clone(),
            });
        }
        self.navigate_to(&entry.absolute_path).await
    }

    /// Jump to any directory inside the sandbox.
    ///
    /// # Errors
    /// `NotADirectory` when the target is missing or not a directory.
    pub async fn navigate_to<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let target = self.resolve(path)?;
        self.require_directory(&target).await?;
        *self.current.write().await = target.clone();
        tracing::debug!("Navigated to '{}'", self.guard.relative(&target).display());
        Ok(target)
    }

    /// Move to the parent directory. Returns `false` (and stays put) at the
    /// root.
    pub async fn navigate_up(&self) -> bool {
        let mut current = self.current.write().await;
        if self.guard.is_root(&current) {
            return false;
        }
        match current.parent().map(Path::to_path_buf) {
            Some(parent) if parent.starts_with(self.guard.root()) => {
                *current = parent;
                true
            }
            _ => false,
        }
    }

    /// List the current directory, directories first then by name.
    ///
    /// # Errors
    /// `Io` if the directory cannot be read.
    pub async fn list_current(&self) -> Result<Vec<DirectoryEntry>> {
        self.list_current_sorted(SortKey::Name).await
    }

    /// List the current directory in `key` order.
    ///
    /// # Errors
    /// `Io` if the directory cannot be read.
    pub async fn list_current_sorted(&self, key: SortKey) -> Result<Vec<DirectoryEntry>> {
        let current = self.current_directory().await;
        let mut entries = self.read_entries(&current).await?;
        sort_entries(&mut entries, key);
        Ok(entries)
    }

    /// List any directory inside the sandbox.
    ///
    /// # Errors
    /// `Path` errors, `NotADirectory`, or `Io` if it cannot be read.
    pub async fn list_directory<P: AsRef<Path>>(&self, path: P) -> Result<Vec<DirectoryEntry>> {
        let dir = self.resolve(path)?;
        self.require_directory(&dir).await?;
        let mut entries = self.read_entries(&dir).await?;
        sort_entries(&mut entries, SortKey::Name);
        Ok(entries)
    }

    async fn read_entries(&self, dir: &Path) -> Result<Vec<DirectoryEntry>> {
        let mut read_dir = fs::read_dir(dir)
            .await
            .map_err(|e| FileManagerError::io("read directory", dir, e))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir
            .next_entry()
            .await
            .map_err(|e| FileManagerError::io("read directory", dir, e))?
        {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !self.config.show_hidden && name.starts_with('.') {
                continue;
            }
            let path = entry.path();

            // Follow symlinks for size and type; a dangling link still lists.
            let metadata = match fs::metadata(&path).await {
                Ok(m) => Some(m),
                Err(_) => fs::symlink_metadata(&path).await.ok(),
            };
            let is_directory = metadata.as_ref().is_some_and(std::fs::Metadata::is_dir);

            entries.push(DirectoryEntry {
                id: Uuid::new_v4(),
                custom_icon_ref: self.icons.icon_for(&path.to_string_lossy()),
                category: if is_directory {
                    FileCategory::Folder
                } else {
                    FileCategory::from_file_name(&name)
                },
                size_bytes: metadata
                    .as_ref()
                    .filter(|m| !m.is_dir())
                    .map(std::fs::Metadata::len),
                modified_at: metadata
                    .as_ref()
                    .and_then(|m| m.modified().ok())
                    .map(DateTime::<Utc>::from),
                is_directory,
                absolute_path: path,
                name,
            });
        }
        Ok(entries)
    }

    async fn require_directory(&self, path: &Path) -> Result<()> {
        match fs::metadata(path).await {
            Ok(m) if m.is_dir() => Ok(()),
            _ => Err(FileManagerError::NotADirectory {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Resolve an existing, non-root item.
    async fn resolve_item<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let resolved = self.resolve(path)?;
        if self.guard.is_root(&resolved) {
            return Err(FileManagerError::InvalidOperation {
                reason: "the sandbox root cannot be modified".to_string(),
            });
        }
        fs::symlink_metadata(&resolved)
            .await
            .map_err(|_| FileManagerError::NotFound {
                path: resolved.clone(),
            })?;
        Ok(resolved)
    }

    /// Resolve `name` as a new child of the current directory.
    async fn child_of_current(&self, name: &str) -> Result<PathBuf> {
        validate_component(name)?;
        let current = self.current_directory().await;
        self.resolve(current.join(name))
    }

    async fn outcome(&self, path: Option<PathBuf>) -> Result<MutationOutcome> {
        Ok(MutationOutcome {
            path,
            listing: self.list_current().await?,
        })
    }

    /// Create a file named `name` in the current directory.
    ///
    /// # Errors
    /// `InvalidName`, `Conflict` under `Reject`, `ConflictUnresolved`, or
    /// `Io`.
    pub async fn create_file<C: AsRef<[u8]>>(
        &self,
        name: &str,
        contents: C,
        policy: ConflictPolicy,
    ) -> Result<MutationOutcome> {
        let desired = self.child_of_current(name).await?;
        let parent = parent_of(&desired);
        let created = {
            let _lock = self.locks.lock(&parent).await;
            match self.resolver.resolve(&desired, exists, policy)? {
                ConflictDecision::Skip => None,
                ConflictDecision::Replace(path) => {
                    if path.is_dir() {
                        return Err(FileManagerError::InvalidOperation {
                            reason: format!("cannot replace directory {} with a file", path.display()),
                        });
                    }
                    fs::write(&path, contents.as_ref())
                        .await
                        .map_err(|e| FileManagerError::io("write file", &path, e))?;
                    Some(path)
                }
                ConflictDecision::Rename(path) => {
                    write_new_file(&path, contents.as_ref()).await?;
                    Some(path)
                }
            }
        };

        tracing::debug!("create_file '{}' -> {:?}", name, created);
        self.outcome(created).await
    }

    /// Create a directory named `name` in the current directory.
    ///
    /// # Errors
    /// `InvalidName`, `Conflict` under `Reject`, `ConflictUnresolved`, or
    /// `Io`.
    pub async fn create_directory(&self, name: &str, policy: ConflictPolicy) -> Result<MutationOutcome> {
        let desired = self.child_of_current(name).await?;
        let parent = parent_of(&desired);
        let created = {
            let _lock = self.locks.lock(&parent).await;
            match self.resolver.resolve(&desired, exists, policy)? {
                ConflictDecision::Skip => None,
                ConflictDecision::Replace(path) => {
                    remove_any(&path).await?;
                    create_dir_new(&path).await?;
                    Some(path)
                }
                ConflictDecision::Rename(path) => {
                    create_dir_new(&path).await?;
                    Some(path)
                }
            }
        };

        tracing::debug!("create_directory '{}' -> {:?}", name, created);
        self.outcome(created).await
    }

    /// Rename an item in place. An occupied target is always a `Conflict`.
    ///
    /// # Errors
    /// `NotFound`, `InvalidName`, `InvalidOperation` for the root,
    /// `Conflict`, or `Io`.
    pub async fn rename<P: AsRef<Path>>(&self, path: P, new_name: &str) -> Result<MutationOutcome> {
        validate_component(new_name)?;
        let source = self.resolve_item(path).await?;
        let parent = parent_of(&source);
        let target = self.resolve(parent.join(new_name))?;
        if target == source {
            return self.outcome(Some(source)).await;
        }

        {
            let _lock = self.locks.lock(&parent).await;
            self.resolver
                .resolve(&target, exists, ConflictPolicy::Reject)?;
            rename_no_replace(&source, &target).await?;
        }
        self.follow_moved_current(&source, &target).await;

        tracing::debug!("Renamed '{}' -> '{}'", source.display(), target.display());
        self.outcome(Some(target)).await
    }

    /// Move an item into `destination_dir`.
    ///
    /// Falls back to copy-then-delete across filesystems; the source is only
    /// removed after the copy succeeded.
    ///
    /// # Errors
    /// `NotFound`, `NotADirectory`, `InvalidOperation` when moving a
    /// directory into itself, `Conflict` under `Reject`, or `Io`.
    pub async fn move_item<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        path: P,
        destination_dir: Q,
        policy: ConflictPolicy,
    ) -> Result<MutationOutcome> {
        let (source, dest_dir, desired) = self.transfer_target(path, destination_dir).await?;
        if desired == source {
            return self.outcome(Some(source)).await;
        }

        let moved = {
            let _lock = self.locks.lock_all([parent_of(&source), dest_dir]).await;
            match self.resolver.resolve(&desired, exists, policy)? {
                ConflictDecision::Skip => None,
                ConflictDecision::Replace(target) => {
                    self.ensure_not_within(&source, &target)?;
                    replace_by_move(&source, &target).await?;
                    Some(target)
                }
                ConflictDecision::Rename(target) => {
                    if exists(&target) {
                        return Err(FileManagerError::Conflict { path: target });
                    }
                    move_path(&source, &target).await?;
                    Some(target)
                }
            }
        };
        if let Some(target) = &moved {
            self.follow_moved_current(&source, target).await;
        }

        tracing::debug!("Moved '{}' -> {:?}", source.display(), moved);
        self.outcome(moved).await
    }

    /// Copy an item into `destination_dir`.
    ///
    /// # Errors
    /// As [`move_item`](Self::move_item).
    pub async fn copy_item<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        path: P,
        destination_dir: Q,
        policy: ConflictPolicy,
    ) -> Result<MutationOutcome> {
        let (source, dest_dir, desired) = self.transfer_target(path, destination_dir).await?;

        let copied = {
            let _lock = self.locks.lock(&dest_dir).await;
            match self.resolver.resolve(&desired, exists, policy)? {
                ConflictDecision::Skip => None,
                ConflictDecision::Replace(target) if target == source => Some(target),
                ConflictDecision::Replace(target) => {
                    self.ensure_not_within(&source, &target)?;
                    replace_by_copy(&source, &target).await?;
                    Some(target)
                }
                ConflictDecision::Rename(target) => {
                    copy_path(&source, &target).await?;
                    Some(target)
                }
            }
        };

        tracing::debug!("Copied '{}' -> {:?}", source.display(), copied);
        self.outcome(copied).await
    }

    /// Copy an item next to itself under an auto-renamed name
    /// (`report.txt` -> `report 2.txt`).
    ///
    /// # Errors
    /// `NotFound`, `ConflictUnresolved`, or `Io`.
    pub async fn duplicate<P: AsRef<Path>>(&self, path: P) -> Result<MutationOutcome> {
        let source = self.resolve_item(path).await?;
        let parent = parent_of(&source);

        let target = {
            let _lock = self.locks.lock(&parent).await;
            let target = match self.resolver.resolve(&source, exists, ConflictPolicy::Rename)? {
                ConflictDecision::Rename(target) => target,
                other => {
                    return Err(FileManagerError::InvalidOperation {
                        reason: format!("unexpected duplicate decision {other:?}"),
                    });
                }
            };
            copy_path(&source, &target).await?;
            target
        };

        tracing::debug!("Duplicated '{}' -> '{}'", source.display(), target.display());
        self.outcome(Some(target)).await
    }

    /// Delete a file or directory tree.
    ///
    /// # Errors
    /// `InvalidOperation` for the root, `NotFound`, or `Io`.
    pub async fn delete<P: AsRef<Path>>(&self, path: P) -> Result<MutationOutcome> {
        let target = self.resolve_item(path).await?;
        {
            let _lock = self.locks.lock(&parent_of(&target)).await;
            remove_any(&target).await?;
        }

        {
            let mut current = self.current.write().await;
            if current.starts_with(&target) {
                *current = parent_of(&target);
            }
        }

        tracing::debug!("Deleted '{}'", target.display());
        self.outcome(Some(target)).await
    }

    /// Copy a file or directory from anywhere on disk into the current
    /// directory.
    ///
    /// # Errors
    /// `NotFound` for a missing source, `Conflict` under `Reject`, or `Io`.
    pub async fn import_from<P: AsRef<Path>>(&self, external: P, policy: ConflictPolicy) -> Result<MutationOutcome> {
        let external = external.as_ref();
        fs::symlink_metadata(external)
            .await
            .map_err(|_| FileManagerError::NotFound {
                path: external.to_path_buf(),
            })?;
        let name = file_name_of(external)?;
        let desired = self.child_of_current(name).await?;
        let parent = parent_of(&desired);

        let imported = {
            let _lock = self.locks.lock(&parent).await;
            match self.resolver.resolve(&desired, exists, policy)? {
                ConflictDecision::Skip => None,
                ConflictDecision::Replace(target) => {
                    remove_any(&target).await?;
                    copy_path(external, &target).await?;
                    Some(target)
                }
                ConflictDecision::Rename(target) => {
                    copy_path(external, &target).await?;
                    Some(target)
                }
            }
        };

        tracing::debug!("Imported '{}' -> {:?}", external.display(), imported);
        self.outcome(imported).await
    }

    /// Search below the current directory.
    ///
    /// # Errors
    /// `Cancelled` when `cancel` fires, `NotADirectory` if the current
    /// directory vanished.
    pub async fn search(&self, criteria: SearchCriteria, cancel: CancellationToken) -> Result<Vec<PathBuf>> {
        let base = self.current_directory().await;
        self.search
            .search(&base, criteria, self.config.search_result_cap, cancel)
            .await
    }

    /// Checksums of a file inside the sandbox.
    ///
    /// # Errors
    /// `NotFound`, `InvalidOperation` for directories, or `Io`.
    pub async fn checksum<P: AsRef<Path>>(&self, path: P, algorithms: &[HashAlgorithm]) -> Result<ChecksumSet> {
        let file = self.resolve_item(path).await?;
        if file.is_dir() {
            return Err(FileManagerError::InvalidOperation {
                reason: format!("cannot checksum directory {}", file.display()),
            });
        }
        self.checksums.compute_all(&file, algorithms).await
    }

    /// Zip `paths` into `archive_name` in the current directory. The name
    /// gets a `.zip` extension if it has none and is auto-renamed when taken.
    ///
    /// # Errors
    /// `NotFound` for missing inputs, `InvalidName`, or `Archive`.
    pub async fn pack<P: AsRef<Path>>(
        &self,
        paths: &[P],
        archive_name: &str,
        password: Option<String>,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<MutationOutcome> {
        let mut inputs = Vec::with_capacity(paths.len());
        for path in paths {
            inputs.push(self.resolve_item(path).await?);
        }
        if inputs.is_empty() {
            return Err(FileManagerError::InvalidOperation {
                reason: "nothing to pack".to_string(),
            });
        }

        let archive_name = match split_name(archive_name) {
            (_, Some(_)) => archive_name.to_string(),
            (_, None) => format!("{archive_name}.zip"),
        };
        let desired = self.child_of_current(&archive_name).await?;
        let destination = match self.resolver.resolve(&desired, exists, ConflictPolicy::Rename)? {
            ConflictDecision::Rename(path) | ConflictDecision::Replace(path) => path,
            ConflictDecision::Skip => desired,
        };

        let summary = self
            .archives
            .pack(inputs, destination.clone(), password, progress, cancel)
            .await?;

        tracing::debug!(
            "Packed {} entries into '{}'",
            summary.entries_written,
            destination.display()
        );
        self.outcome(Some(destination)).await
    }

    /// Extract `archive`.
    ///
    /// # Errors
    /// `NotFound`, `NotADirectory` for a bad destination, `Archive`, or `Io`
    /// when the archive cannot be removed afterwards.
    pub async fn unpack<P: AsRef<Path>>(
        &self,
        archive: P,
        request: UnpackRequest,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> Result<MutationOutcome> {
        let archive = self.resolve_item(archive).await?;
        let destination = match &request.destination {
            Some(dest) => self.resolve(dest)?,
            None => parent_of(&archive),
        };
        if exists(&destination) {
            self.require_directory(&destination).await?;
        }

        let mut locked = vec![destination.clone()];
        if request.delete_archive_on_success {
            locked.push(parent_of(&archive));
        }
        let guard = self.locks.lock_all(locked).await;
        let summary = self
            .archives
            .unpack(
                archive.clone(),
                destination.clone(),
                request.policy,
                request.password,
                progress,
                cancel,
            )
            .await?;

        if request.delete_archive_on_success {
            fs::remove_file(&archive)
                .await
                .map_err(|e| FileManagerError::io("remove archive", &archive, e))?;
        }
        drop(guard);

        tracing::debug!(
            "Unpacked '{}': {} written, {} skipped",
            archive.display(),
            summary.entries_written,
            summary.entries_skipped
        );
        self.outcome(Some(destination)).await
    }

    /// Entries of an archive inside the sandbox.
    ///
    /// # Errors
    /// `NotFound` or `Archive`.
    pub async fn list_archive<P: AsRef<Path>>(&self, archive: P) -> Result<Vec<ArchiveEntry>> {
        let archive = self.resolve_item(archive).await?;
        Ok(self.archives.list_entries(archive).await?)
    }

    /// Apply a batch rename previewed with [`batch::preview`].
    ///
    /// All names are checked before the first rename. Renames then run in
    /// order without rollback: on failure the error reports how many were
    /// applied.
    ///
    /// # Errors
    /// `NotFound` for missing files, or `Rename` errors.
    pub async fn commit_batch_rename<P: AsRef<Path>>(
        &self,
        files: &[P],
        preview: &[String],
        progress: ProgressCallback,
    ) -> Result<MutationOutcome> {
        let mut resolved = Vec::with_capacity(files.len());
        for file in files {
            resolved.push(self.resolve_item(file).await?);
        }
        let guard = self.locks.lock_all(resolved.iter().map(|f| parent_of(f))).await;
        let steps = batch::plan(&resolved, preview, exists)?;

        let mut reporter = ProgressReporter::new(progress, steps.len() as u64);
        let mut applied_count = 0;
        for step in &steps {
            if !step.is_noop() {
                if exists(&step.to) {
                    return Err(RenameError::PartialFailure {
                        applied_count,
                        failed_at: step.index,
                        reason: format!("{} appeared before it could be renamed to", step.to.display()),
                    }
                    .into());
                }
                rename_no_replace(&step.from, &step.to)
                    .await
                    .map_err(|e| RenameError::PartialFailure {
                        applied_count,
                        failed_at: step.index,
                        reason: e.to_string(),
                    })?;
            }
            applied_count += 1;
            reporter.advance(1);
        }
        reporter.finish();
        drop(guard);

        tracing::debug!("Batch renamed {} items", applied_count);
        self.outcome(None).await
    }

    /// Keep the current directory valid after `from` was moved to `to`.
    async fn follow_moved_current(&self, from: &Path, to: &Path) {
        let mut current = self.current.write().await;
        let followed = current.strip_prefix(from).ok().map(|rest| to.join(rest));
        if let Some(followed) = followed {
            *current = followed;
        }
    }

    /// Replacing `target` removes it first, which must not take `source`
    /// along with it.
    fn ensure_not_within(&self, source: &Path, target: &Path) -> Result<()> {
        if source.starts_with(target) {
            return Err(FileManagerError::InvalidOperation {
                reason: format!(
                    "replacing {} would delete {}",
                    self.guard.relative(target).display(),
                    self.guard.relative(source).display()
                ),
            });
        }
        Ok(())
    }

    /// Shared checks for move and copy: existing source, directory
    /// destination, no copying a directory into itself.
    async fn transfer_target<P: AsRef<Path>, Q: AsRef<Path>>(
        &self,
        path: P,
        destination_dir: Q,
    ) -> Result<(PathBuf, PathBuf, PathBuf)> {
        let source = self.resolve_item(path).await?;
        let dest_dir = self.resolve(destination_dir)?;
        self.require_directory(&dest_dir).await?;
        if source.is_dir() && dest_dir.starts_with(&source) {
            return Err(FileManagerError::InvalidOperation {
                reason: format!(
                    "cannot place {} inside itself",
                    self.guard.relative(&source).display()
                ),
            });
        }
        let desired = dest_dir.join(file_name_of(&source)?);
        Ok((source, dest_dir, desired))
    }
}

fn parent_of(path: &Path) -> PathBuf {
    path.parent().map_or_else(|| path.to_path_buf(), Path::to_path_buf)
}

fn sort_entries(entries: &mut [DirectoryEntry], key: SortKey) {
    entries.sort_by(|a, b| {
        b.is_directory
            .cmp(&a.is_directory)
            .then_with(|| match key {
                SortKey::Name => Ordering::Equal,
                SortKey::Size => b.size_bytes.cmp(&a.size_bytes),
                SortKey::Modified => b.modified_at.cmp(&a.modified_at),
            })
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });
}

async fn write_new_file(path: &Path, contents: &[u8]) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await
        .map_err(|e| creation_error("create file", path, e))?;
    file.write_all(contents)
        .await
        .map_err(|e| FileManagerError::io("write file", path, e))?;
    file.flush()
        .await
        .map_err(|e| FileManagerError::io("write file", path, e))
}

async fn create_dir_new(path: &Path) -> Result<()> {
    fs::create_dir(path)
        .await
        .map_err(|e| creation_error("create directory", path, e))
}

/// A path that appeared between resolution and creation is a conflict.
fn creation_error(operation: &'static str, path: &Path, error: io::Error) -> FileManagerError {
    if error.kind() == io::ErrorKind::AlreadyExists {
        FileManagerError::Conflict {
            path: path.to_path_buf(),
        }
    } else {
        FileManagerError::io(operation, path, error)
    }
}

async fn remove_any(path: &Path) -> Result<()> {
    let metadata = fs::symlink_metadata(path)
        .await
        .map_err(|e| FileManagerError::io("remove", path, e))?;
    let result = if metadata.is_dir() {
        fs::remove_dir_all(path).await
    } else {
        fs::remove_file(path).await
    };
    result.map_err(|e| FileManagerError::io("remove", path, e))
}

/// Hidden sibling of `target` used to stage a replacement.
fn staging_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    parent_of(target).join(format!(".{name}.{}.partial", Uuid::new_v4().simple()))
}

/// Move `source` over an existing `target`. The source is staged beside the
/// target before anything is removed, and put back if the removal fails.
async fn replace_by_move(source: &Path, target: &Path) -> Result<()> {
    let staged = staging_path(target);
    move_path(source, &staged).await?;
    if let Err(e) = remove_any(target).await {
        if let Err(restore) = move_path(&staged, source).await {
            tracing::warn!(
                "Could not restore '{}' from '{}': {}",
                source.display(),
                staged.display(),
                restore
            );
        }
        return Err(e);
    }
    fs::rename(&staged, target)
        .await
        .map_err(|e| FileManagerError::io("move", &staged, e))
}

/// Copy `source` over an existing `target`, which is only removed once the
/// copy is complete.
async fn replace_by_copy(source: &Path, target: &Path) -> Result<()> {
    let staged = staging_path(target);
    let copied = match copy_path(source, &staged).await {
        Ok(()) => remove_any(target).await,
        Err(e) => Err(e),
    };
    if let Err(e) = copied {
        if exists(&staged)
            && let Err(cleanup) = remove_any(&staged).await
        {
            tracing::warn!("Could not remove '{}': {}", staged.display(), cleanup);
        }
        return Err(e);
    }
    fs::rename(&staged, target)
        .await
        .map_err(|e| FileManagerError::io("copy", &staged, e))
}

/// Rename that fails with `Conflict` instead of overwriting a file that
/// appeared at `target`. Files go through a hard link, which refuses an
/// existing name atomically. Directories and filesystems without hard links
/// use a plain rename; an empty directory appearing at `target` in between
/// is replaced.
async fn rename_no_replace(source: &Path, target: &Path) -> Result<()> {
    let is_file = fs::symlink_metadata(source)
        .await
        .map_err(|e| FileManagerError::io("rename", source, e))?
        .is_file();
    if is_file {
        match fs::hard_link(source, target).await {
            Ok(()) => {
                return fs::remove_file(source)
                    .await
                    .map_err(|e| FileManagerError::io("rename", source, e));
            }
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {
                return Err(FileManagerError::Conflict {
                    path: target.to_path_buf(),
                });
            }
            Err(e) => tracing::debug!("Hard link unavailable for '{}': {}", source.display(), e),
        }
    }
    if exists(target) {
        return Err(FileManagerError::Conflict {
            path: target.to_path_buf(),
        });
    }
    fs::rename(source, target)
        .await
        .map_err(|e| FileManagerError::io("rename", source, e))
}

async fn move_path(source: &Path, target: &Path) -> Result<()> {
    match fs::rename(source, target).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::CrossesDevices => {
            tracing::debug!("Cross-device move of '{}', copying instead", source.display());
            copy_path(source, target).await?;
            remove_any(source).await
        }
        Err(e) => Err(FileManagerError::io("move", source, e)),
    }
}

/// Copy a file or a directory tree. Symlinks inside trees are not copied.
async fn copy_path(source: &Path, target: &Path) -> Result<()> {
    if exists(target) {
        return Err(FileManagerError::Conflict {
            path: target.to_path_buf(),
        });
    }
    let (source, target) = (source.to_path_buf(), target.to_path_buf());
    let error_path = source.clone();
    tokio::task::spawn_blocking(move || copy_blocking(&source, &target))
        .await
        .map_err(|e| FileManagerError::io("copy", error_path, io::Error::other(e)))?
}

fn copy_blocking(source: &Path, target: &Path) -> Result<()> {
    let metadata = std::fs::metadata(source).map_err(|e| FileManagerError::io("copy", source, e))?;
    if !metadata.is_dir() {
        std::fs::copy(source, target).map_err(|e| FileManagerError::io("copy", source, e))?;
        return Ok(());
    }

    std::fs::create_dir(target).map_err(|e| creation_error("copy", target, e))?;
    for entry in WalkDir::new(source).min_depth(1).follow_links(false) {
        let entry = entry.map_err(|e| FileManagerError::io("copy", source, io::Error::other(e)))?;
        let Ok(relative) = entry.path().strip_prefix(source) else {
            continue;
        };
        let destination = target.join(relative);
        let file_type = entry.file_type();
        if file_type.is_dir() {
            std::fs::create_dir_all(&destination).map_err(|e| FileManagerError::io("copy", &destination, e))?;
        } else if file_type.is_file() {
            std::fs::copy(entry.path(), &destination).map_err(|e| FileManagerError::io("copy", entry.path(), e))?;
        } else {
            tracing::warn!("Not copying symlink '{}'", entry.path().display());
        }
    }
    Ok(())
}

/// Builder for [`FileManager`].
#[derive(Debug)]
pub struct FileManagerBuilder {
    root: Option<PathBuf>,
    config: FileManagerConfig,
    icons: Arc<dyn IconLookup>,
}

impl FileManagerBuilder {
    fn new() -> Self {
        Self {
            root: None,
            config: FileManagerConfig::default(),
            icons: Arc::new(NoIcons),
        }
    }

    /// Set the sandbox root directory.
    #[must_use]
    pub fn root<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.root = Some(path.into());
        self
    }

    #[must_use]
    #[allow(clippy::missing_const_for_fn)]
    pub fn config(mut self, config: FileManagerConfig) -> Self {
        self.config = config;
        self
    }

    /// Source of custom icon keys attached to listing entries.
    #[must_use]
    pub fn icon_lookup<I: IconLookup + 'static>(mut self, icons: I) -> Self {
        self.icons = Arc::new(icons);
        self
    }

    /// Build the `FileManager`, creating the root if it does not exist.
    ///
    /// # Errors
    /// Returns an error if:
    /// - The root is not set
    /// - The root cannot be created, secured or canonicalized
    pub async fn build(self) -> Result<FileManager> {
        let root = self.root.ok_or_else(|| FileManagerError::Configuration {
            message: "Sandbox root is required".to_string(),
        })?;

        if !exists(&root) {
            fs::create_dir_all(&root)
                .await
                .map_err(|e| FileManagerError::DirectoryCreation {
                    path: root.clone(),
                    source: e,
                })?;
            set_secure_permissions(&root).await?;
        }

        let guard = PathGuard::new(&root)?;
        let config = self.config;
        let manager = FileManager {
            current: Arc::new(RwLock::new(guard.root().to_path_buf())),
            guard,
            icons: self.icons,
            locks: Arc::new(DirectoryLocks::new()),
            resolver: ConflictResolver::new(config.max_rename_attempts),
            search: SearchEngine::new(config.max_content_bytes),
            checksums: ChecksumEngine::new(config.checksum_chunk_size),
            archives: ArchiveEngine::new(ConflictResolver::new(config.max_rename_attempts)),
            config,
        };

        tracing::info!(
            "FileManager initialized - root: {:?}, search_result_cap: {}, show_hidden: {}",
            manager.root(),
            manager.config.search_result_cap,
            manager.config.show_hidden
        );

        Ok(manager)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{RenameSpec, preview};
    use crate::progress::no_progress;

    async fn manager_in(dir: &Path) -> Result<FileManager> {
        FileManager::builder().root(dir).build().await
    }

    fn names(listing: &[DirectoryEntry]) -> Vec<&str> {
        listing.iter().map(|e| e.name.as_str()).collect()
    }

    #[tokio::test]
    async fn test_navigate_up_stops_at_root() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        std::fs::create_dir(temp_dir.path().join("docs"))?;
        let manager = manager_in(temp_dir.path()).await?;

        manager.navigate_to("docs").await?;
        assert_eq!(manager.state().await, NavigationState::InSubdirectory { depth: 1 });

        assert!(manager.navigate_up().await);
        assert_eq!(manager.current_directory().await, manager.root());
        assert!(!manager.navigate_up().await);
        assert_eq!(manager.current_directory().await, manager.root());
        assert_eq!(manager.state().await, NavigationState::AtRoot);
        Ok(())
    }

    #[tokio::test]
    async fn test_duplicate_auto_renames() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        manager.create_file("report.txt", "v1", ConflictPolicy::Reject).await?;

        let first = manager.duplicate("report.txt").await?;
        assert_eq!(first.path, Some(manager.root().join("report 2.txt")));
        let second = manager.duplicate("report.txt").await?;
        assert_eq!(second.path, Some(manager.root().join("report 3.txt")));
        assert_eq!(names(&second.listing), vec!["report 2.txt", "report 3.txt", "report.txt"]);
        assert_eq!(std::fs::read_to_string(manager.root().join("report 3.txt"))?, "v1");
        Ok(())
    }

    #[tokio::test]
    async fn test_listing_order_hidden_and_icons() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        std::fs::create_dir(temp_dir.path().join("zeta"))?;
        std::fs::write(temp_dir.path().join("Alpha.png"), [0u8; 10])?;
        std::fs::write(temp_dir.path().join("beta.txt"), [0u8; 500])?;
        std::fs::write(temp_dir.path().join(".hidden"), "")?;

        let root = temp_dir.path().canonicalize()?;
        let mut icons = HashMap::new();
        icons.insert(root.join("beta.txt").to_string_lossy().into_owned(), "star".to_string());

        let manager = FileManager::builder()
            .root(temp_dir.path())
            .config(FileManagerConfig {
                show_hidden: false,
                ..FileManagerConfig::default()
            })
            .icon_lookup(icons)
            .build()
            .await?;

        let listing = manager.list_current().await?;
        assert_eq!(names(&listing), vec!["zeta", "Alpha.png", "beta.txt"]);
        assert_eq!(listing[0].category, FileCategory::Folder);
        assert_eq!(listing[0].size_bytes, None);
        assert_eq!(listing[1].category, FileCategory::Image);
        assert_eq!(listing[2].custom_icon_ref.as_deref(), Some("star"));

        let by_size = manager.list_current_sorted(SortKey::Size).await?;
        assert_eq!(names(&by_size), vec!["zeta", "beta.txt", "Alpha.png"]);

        let again = manager.list_current().await?;
        assert_ne!(again[0].id, listing[0].id);
        Ok(())
    }

    #[tokio::test]
    async fn test_create_policies() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        manager.create_file("a.txt", "one", ConflictPolicy::Rename).await?;

        let renamed = manager.create_file("a.txt", "two", ConflictPolicy::Rename).await?;
        assert_eq!(renamed.path, Some(manager.root().join("a 2.txt")));

        let skipped = manager.create_file("a.txt", "three", ConflictPolicy::Skip).await?;
        assert_eq!(skipped.path, None);
        assert_eq!(std::fs::read_to_string(manager.root().join("a.txt"))?, "one");

        manager.create_file("a.txt", "four", ConflictPolicy::Replace).await?;
        assert_eq!(std::fs::read_to_string(manager.root().join("a.txt"))?, "four");

        let rejected = manager.create_directory("a.txt", ConflictPolicy::Reject).await;
        assert!(matches!(rejected, Err(FileManagerError::Conflict { .. })));

        let bad = manager.create_file("../escape.txt", "x", ConflictPolicy::Rename).await;
        assert!(matches!(bad, Err(FileManagerError::InvalidName { .. })));
        Ok(())
    }

    #[tokio::test]
    async fn test_rename_and_move_rules() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        manager.create_directory("docs", ConflictPolicy::Reject).await?;
        manager.create_directory("archive", ConflictPolicy::Reject).await?;
        manager.create_file("a.txt", "a", ConflictPolicy::Reject).await?;
        manager.create_file("b.txt", "b", ConflictPolicy::Reject).await?;

        assert!(matches!(
            manager.rename("a.txt", "b.txt").await,
            Err(FileManagerError::Conflict { .. })
        ));
        let renamed = manager.rename("a.txt", "c.txt").await?;
        assert_eq!(renamed.path, Some(manager.root().join("c.txt")));

        let moved = manager.move_item("c.txt", "docs", ConflictPolicy::Reject).await?;
        assert_eq!(moved.path, Some(manager.root().join("docs/c.txt")));
        assert!(!manager.root().join("c.txt").exists());

        assert!(matches!(
            manager.move_item("docs", "docs", ConflictPolicy::Reject).await,
            Err(FileManagerError::InvalidOperation { .. })
        ));
        manager.navigate_to("docs").await?;
        manager.navigate_up().await;
        manager.move_item("docs", "archive", ConflictPolicy::Reject).await?;
        assert!(manager.root().join("archive/docs/c.txt").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn test_delete_and_root_protection() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        manager.create_directory("tmp", ConflictPolicy::Reject).await?;
        manager.navigate_to("tmp").await?;
        manager.create_file("x.bin", [1u8, 2, 3], ConflictPolicy::Reject).await?;

        let outcome = manager.delete(manager.root().join("tmp")).await?;
        assert!(outcome.listing.is_empty());
        assert_eq!(manager.state().await, NavigationState::AtRoot);

        assert!(matches!(
            manager.delete(".").await,
            Err(FileManagerError::InvalidOperation { .. })
        ));
        assert!(matches!(
            manager.delete("missing.txt").await,
            Err(FileManagerError::NotFound { .. })
        ));
        assert!(manager.delete("../outside").await.is_err_and(|e| e.is_outside_root()));
        Ok(())
    }

    #[tokio::test]
    async fn test_import_from_outside() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let sandbox = tempfile::tempdir()?;
        let outside = tempfile::tempdir()?;
        std::fs::write(outside.path().join("photo.jpg"), "jpeg")?;
        let manager = manager_in(sandbox.path()).await?;

        let first = manager.import_from(outside.path().join("photo.jpg"), ConflictPolicy::Rename).await?;
        let second = manager.import_from(outside.path().join("photo.jpg"), ConflictPolicy::Rename).await?;
        assert_eq!(first.path, Some(manager.root().join("photo.jpg")));
        assert_eq!(second.path, Some(manager.root().join("photo 2.jpg")));
        assert!(outside.path().join("photo.jpg").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_rename_commit_matches_preview() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        for name in ["b.jpg", "a.jpg", "c.jpg"] {
            manager.create_file(name, name, ConflictPolicy::Reject).await?;
        }
        let files: Vec<PathBuf> = ["b.jpg", "a.jpg", "c.jpg"]
            .iter()
            .map(|n| manager.root().join(n))
            .collect();
        let spec = RenameSpec::Sequential {
            pattern: "File_{n}".to_string(),
            start_number: 1,
        };
        let names = preview(&files, &spec)?;
        manager.commit_batch_rename(&files, &names, no_progress()).await?;

        assert_eq!(std::fs::read_to_string(manager.root().join("File_0001.jpg"))?, "b.jpg");
        assert_eq!(std::fs::read_to_string(manager.root().join("File_0002.jpg"))?, "a.jpg");
        assert_eq!(std::fs::read_to_string(manager.root().join("File_0003.jpg"))?, "c.jpg");
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_rename_collision_changes_nothing() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        for name in ["a.txt", "b.txt", "taken.txt"] {
            manager.create_file(name, name, ConflictPolicy::Reject).await?;
        }
        let files = vec![manager.root().join("a.txt"), manager.root().join("b.txt")];
        let result = manager
            .commit_batch_rename(&files, &["new.txt".to_string(), "taken.txt".to_string()], no_progress())
            .await;
        assert!(matches!(
            result,
            Err(FileManagerError::Rename(RenameError::Collision { index: 1, .. }))
        ));
        assert!(manager.root().join("a.txt").exists());
        assert!(!manager.root().join("new.txt").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_replace_never_deletes_its_own_source() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        manager.create_directory("x", ConflictPolicy::Reject).await?;
        std::fs::write(manager.root().join("x/x"), "data")?;

        assert!(matches!(
            manager.move_item("x/x", ".", ConflictPolicy::Replace).await,
            Err(FileManagerError::InvalidOperation { .. })
        ));
        assert!(matches!(
            manager.copy_item("x/x", ".", ConflictPolicy::Replace).await,
            Err(FileManagerError::InvalidOperation { .. })
        ));
        assert_eq!(std::fs::read_to_string(manager.root().join("x/x"))?, "data");
        Ok(())
    }

    #[tokio::test]
    async fn test_replace_swaps_in_place() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        manager.create_directory("out", ConflictPolicy::Reject).await?;
        std::fs::create_dir(manager.root().join("out/report"))?;
        std::fs::write(manager.root().join("out/report/old.txt"), "old")?;
        manager.create_file("report", "new", ConflictPolicy::Reject).await?;

        let copied = manager.copy_item("report", "out", ConflictPolicy::Replace).await?;
        assert_eq!(copied.path, Some(manager.root().join("out/report")));
        assert_eq!(std::fs::read_to_string(manager.root().join("out/report"))?, "new");

        std::fs::write(manager.root().join("report"), "newer")?;
        manager.move_item("report", "out", ConflictPolicy::Replace).await?;
        assert_eq!(std::fs::read_to_string(manager.root().join("out/report"))?, "newer");
        assert!(!manager.root().join("report").exists());

        let leftovers = std::fs::read_dir(manager.root().join("out"))?
            .filter_map(std::result::Result::ok)
            .filter(|e| e.file_name().to_string_lossy().ends_with(".partial"))
            .count();
        assert_eq!(leftovers, 0);
        Ok(())
    }

    #[tokio::test]
    async fn test_rename_does_not_clobber_late_arrivals() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        manager.create_file("a.txt", "a", ConflictPolicy::Reject).await?;
        manager.create_file("b.txt", "b", ConflictPolicy::Reject).await?;

        let result = rename_no_replace(&manager.root().join("a.txt"), &manager.root().join("b.txt")).await;
        assert!(matches!(result, Err(FileManagerError::Conflict { .. })));
        assert_eq!(std::fs::read_to_string(manager.root().join("b.txt"))?, "b");
        assert!(manager.root().join("a.txt").exists());

        rename_no_replace(&manager.root().join("a.txt"), &manager.root().join("c.txt")).await?;
        assert!(!manager.root().join("a.txt").exists());
        assert_eq!(std::fs::read_to_string(manager.root().join("c.txt"))?, "a");
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_rename_reports_partial_failure() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        manager.create_directory("album", ConflictPolicy::Reject).await?;
        std::fs::write(manager.root().join("album/cover.jpg"), "jpeg")?;

        // Renaming the folder first leaves the second entry without a source
        let files = vec![manager.root().join("album"), manager.root().join("album/cover.jpg")];
        let names = vec!["album-2024".to_string(), "front.jpg".to_string()];
        let result = manager.commit_batch_rename(&files, &names, no_progress()).await;

        assert!(matches!(
            result,
            Err(FileManagerError::Rename(RenameError::PartialFailure {
                applied_count: 1,
                failed_at: 1,
                ..
            }))
        ));
        assert!(!manager.root().join("album").exists());
        assert!(manager.root().join("album-2024/cover.jpg").is_file());
        Ok(())
    }

    #[tokio::test]
    async fn test_batch_rename_checks_collisions_under_the_lock() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        manager.create_file("a.txt", "a", ConflictPolicy::Reject).await?;

        let held = manager.locks.lock(manager.root()).await;
        let worker = manager.clone();
        let files = vec![manager.root().join("a.txt")];
        let commit = tokio::spawn(async move {
            worker
                .commit_batch_rename(&files, &["b.txt".to_string()], no_progress())
                .await
        });
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        std::fs::write(manager.root().join("b.txt"), "arrived first")?;
        drop(held);

        let result = commit.await?;
        assert!(matches!(
            result,
            Err(FileManagerError::Rename(RenameError::Collision { index: 0, .. }))
        ));
        assert!(manager.root().join("a.txt").exists());
        assert_eq!(std::fs::read_to_string(manager.root().join("b.txt"))?, "arrived first");
        Ok(())
    }

    #[tokio::test]
    async fn test_unpack_waits_for_directory_lock() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        manager.create_file("a.txt", "a", ConflictPolicy::Reject).await?;
        manager
            .pack(&["a.txt"], "a.zip", None, no_progress(), CancellationToken::new())
            .await?;

        let request = UnpackRequest {
            policy: ConflictPolicy::Replace,
            ..UnpackRequest::default()
        };
        let held = manager.locks.lock(manager.root()).await;
        let blocked = tokio::time::timeout(
            std::time::Duration::from_millis(200),
            manager.unpack("a.zip", request.clone(), no_progress(), CancellationToken::new()),
        )
        .await;
        assert!(blocked.is_err(), "unpack ran while the destination was locked");

        drop(held);
        manager
            .unpack("a.zip", request, no_progress(), CancellationToken::new())
            .await?;
        assert_eq!(std::fs::read_to_string(manager.root().join("a.txt"))?, "a");
        Ok(())
    }

    #[tokio::test]
    async fn test_checksum_rejects_directories() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        let manager = manager_in(temp_dir.path()).await?;
        manager.create_directory("d", ConflictPolicy::Reject).await?;
        manager.create_file("empty.txt", "", ConflictPolicy::Reject).await?;

        assert!(matches!(
            manager.checksum("d", &[]).await,
            Err(FileManagerError::InvalidOperation { .. })
        ));
        let set = manager.checksum("empty.txt", &[HashAlgorithm::Md5]).await?;
        assert_eq!(set.get(HashAlgorithm::Md5), Some("d41d8cd98f00b204e9800998ecf8427e"));
        Ok(())
    }

    #[tokio::test]
    async fn test_builder_requires_root() {
        let result = FileManager::builder().build().await;
        assert!(matches!(result, Err(FileManagerError::Configuration { .. })));
    }
}
