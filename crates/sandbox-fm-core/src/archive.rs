//! ZIP packing and unpacking with progress and cancellation.
//!
//! Both directions run on a blocking worker. Packing writes to a hidden
//! temporary file beside the destination and persists it with no-clobber
//! semantics once the archive is complete, so a cancelled or failed pack never
//! leaves a half-written archive under the requested name. Unpacking writes
//! entries in archive order; on failure the error reports how many entries
//! were already written.

use crate::conflict::{ConflictDecision, ConflictPolicy, ConflictResolver};
use crate::error::{ArchiveError, FileManagerError};
use crate::progress::{ProgressCallback, ProgressReporter};
use crate::security::PathGuard;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use walkdir::WalkDir;
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{AesMode, CompressionMethod, ZipArchive, ZipWriter};

type ArchiveResult<T> = std::result::Result<T, ArchiveError>;

const COPY_CHUNK_SIZE: usize = 64 * 1024;

/// Which way an archive job runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiveDirection {
    Pack,
    Unpack,
}

/// One pack or unpack request and its progress.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    pub id: Uuid,
    pub direction: ArchiveDirection,
    pub inputs: Vec<PathBuf>,
    pub target: PathBuf,
    pub conflict_policy: ConflictPolicy,
    pub password: Option<String>,
    progress: Arc<AtomicU64>,
}

impl ArchiveJob {
    /// Pack `inputs` into the archive at `target`.
    #[must_use]
    pub fn pack(inputs: Vec<PathBuf>, target: PathBuf) -> Self {
        Self::new(ArchiveDirection::Pack, inputs, target)
    }

    /// Unpack `archive` into the directory `target`.
    #[must_use]
    pub fn unpack(archive: PathBuf, target: PathBuf) -> Self {
        Self::new(ArchiveDirection::Unpack, vec![archive], target)
    }

    fn new(direction: ArchiveDirection, inputs: Vec<PathBuf>, target: PathBuf) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            inputs,
            target,
            conflict_policy: ConflictPolicy::Rename,
            password: None,
            progress: Arc::new(AtomicU64::new(0f64.to_bits())),
        }
    }

    /// Set the per-entry conflict policy used when unpacking.
    #[must_use]
    pub const fn conflict_policy(mut self, policy: ConflictPolicy) -> Self {
        self.conflict_policy = policy;
        self
    }

    /// Encrypt (pack) or decrypt (unpack) with `password`; empty means none.
    #[must_use]
    pub fn password<S: Into<String>>(mut self, password: S) -> Self {
        let password = password.into();
        self.password = (!password.is_empty()).then_some(password);
        self
    }

    /// Latest progress fraction reported for this job.
    #[must_use]
    pub fn progress(&self) -> f64 {
        f64::from_bits(self.progress.load(Ordering::Relaxed))
    }
}

/// Result of a completed pack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackSummary {
    pub entries_written: usize,
    pub bytes_read: u64,
}

/// Result of a completed unpack.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UnpackSummary {
    pub entries_written: usize,
    pub entries_skipped: usize,
    /// Entries written under an auto-renamed path.
    pub renamed: Vec<PathBuf>,
}

/// Outcome of [`ArchiveEngine::run`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "direction", rename_all = "lowercase")]
pub enum ArchiveOutcome {
    Pack(PackSummary),
    Unpack(UnpackSummary),
}

/// One entry of an archive listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

struct PackItem {
    source: PathBuf,
    name: String,
    is_dir: bool,
    size: u64,
}

enum CopyOutcome {
    Done(u64),
    Cancelled,
}

/// Packs and unpacks zip archives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArchiveEngine {
    resolver: ConflictResolver,
}

impl ArchiveEngine {
    /// Create an engine that auto-renames with `resolver`.
    #[must_use]
    pub const fn new(resolver: ConflictResolver) -> Self {
        Self { resolver }
    }

    /// Run `job`, recording progress on the job as well as forwarding it.
    ///
    /// # Errors
    /// See [`pack`](Self::pack) and [`unpack`](Self::unpack).
    pub async fn run(
        &self,
        job: &ArchiveJob,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> ArchiveResult<ArchiveOutcome> {
        let cell = Arc::clone(&job.progress);
        let tracked: ProgressCallback = Arc::new(move |fraction| {
            cell.store(fraction.to_bits(), Ordering::Relaxed);
            progress(fraction);
        });

        tracing::debug!(
            "Archive job {} ({:?}) -> '{}'",
            job.id,
            job.direction,
            job.target.display()
        );

        match job.direction {
            ArchiveDirection::Pack => self
                .pack(
                    job.inputs.clone(),
                    job.target.clone(),
                    job.password.clone(),
                    tracked,
                    cancel,
                )
                .await
                .map(ArchiveOutcome::Pack),
            ArchiveDirection::Unpack => {
                let archive = job.inputs.first().cloned().ok_or_else(|| ArchiveError::InvalidFormat {
                    path: job.target.clone(),
                    reason: "unpack job has no archive".to_string(),
                })?;
                self.unpack(
                    archive,
                    job.target.clone(),
                    job.conflict_policy,
                    job.password.clone(),
                    tracked,
                    cancel,
                )
                .await
                .map(ArchiveOutcome::Unpack)
            }
        }
    }

    /// Pack `paths` into a new zip at `destination`.
    ///
    /// Files are stored under their own name; directories are added
    /// recursively, keeping their structure relative to their parent.
    ///
    /// # Errors
    /// `IoFailure` when an input cannot be read or the archive cannot be
    /// written (including when `destination` appeared in the meantime), and
    /// `Cancelled` if `cancel` fires. In both cases nothing is left at
    /// `destination`.
    pub async fn pack(
        &self,
        paths: Vec<PathBuf>,
        destination: PathBuf,
        password: Option<String>,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> ArchiveResult<PackSummary> {
        let error_path = destination.clone();
        tokio::task::spawn_blocking(move || {
            pack_blocking(&paths, &destination, password.as_deref(), progress, &cancel)
        })
        .await
        .map_err(|e| ArchiveError::IoFailure {
            path: error_path,
            reason: e.to_string(),
            entries_written: 0,
        })?
    }

    /// Extract every entry of `archive` below `destination`, applying
    /// `policy` to each entry whose path is already taken.
    ///
    /// # Errors
    /// `InvalidFormat` for unreadable archives or entries that would land
    /// outside `destination`, `PasswordRequired`/`InvalidPassword` for
    /// encrypted archives, `IoFailure` and `Cancelled` carrying the count of
    /// entries already written.
    pub async fn unpack(
        &self,
        archive: PathBuf,
        destination: PathBuf,
        policy: ConflictPolicy,
        password: Option<String>,
        progress: ProgressCallback,
        cancel: CancellationToken,
    ) -> ArchiveResult<UnpackSummary> {
        let resolver = self.resolver;
        let error_path = archive.clone();
        tokio::task::spawn_blocking(move || {
            let mut unpacker = Unpacker {
                archive: &archive,
                destination: &destination,
                policy,
                password: password.as_deref(),
                resolver,
                cancel: &cancel,
                summary: UnpackSummary::default(),
            };
            unpacker.run(progress)
        })
        .await
        .map_err(|e| ArchiveError::IoFailure {
            path: error_path,
            reason: e.to_string(),
            entries_written: 0,
        })?
    }

    /// List the entries of `archive` without extracting anything.
    ///
    /// # Errors
    /// `IoFailure` if the file cannot be opened, `InvalidFormat` if it is not
    /// a zip archive.
    pub async fn list_entries(&self, archive: PathBuf) -> ArchiveResult<Vec<ArchiveEntry>> {
        let error_path = archive.clone();
        tokio::task::spawn_blocking(move || {
            let mut zip = open_archive(&archive)?;
            (0..zip.len())
                .map(|idx| {
                    let entry = zip.by_index_raw(idx).map_err(|e| invalid_format(&archive, &e))?;
                    Ok(ArchiveEntry {
                        name: entry.name().to_string(),
                        size: entry.size(),
                        is_dir: entry.is_dir(),
                    })
                })
                .collect()
        })
        .await
        .map_err(|e| ArchiveError::IoFailure {
            path: error_path,
            reason: e.to_string(),
            entries_written: 0,
        })?
    }
}

fn entry_options(password: Option<&str>) -> FileOptions<'_, ()> {
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);
    match password {
        Some(password) => options.with_aes_encryption(AesMode::Aes256, password),
        None => options,
    }
}

fn io_failure(path: &Path, error: &impl std::fmt::Display, entries_written: usize) -> ArchiveError {
    ArchiveError::IoFailure {
        path: path.to_path_buf(),
        reason: error.to_string(),
        entries_written,
    }
}

fn invalid_format(path: &Path, error: &impl std::fmt::Display) -> ArchiveError {
    ArchiveError::InvalidFormat {
        path: path.to_path_buf(),
        reason: error.to_string(),
    }
}

fn map_entry_error(archive: &Path, error: ZipError, password: Option<&str>) -> ArchiveError {
    match error {
        ZipError::UnsupportedArchive(detail)
            if detail == ZipError::PASSWORD_REQUIRED && password.is_none() =>
        {
            ArchiveError::PasswordRequired {
                path: archive.to_path_buf(),
            }
        }
        ZipError::InvalidPassword => ArchiveError::InvalidPassword {
            path: archive.to_path_buf(),
        },
        ZipError::Io(e) => io_failure(archive, &e, 0),
        other => invalid_format(archive, &other),
    }
}

fn open_archive(archive: &Path) -> ArchiveResult<ZipArchive<File>> {
    let file = File::open(archive).map_err(|e| io_failure(archive, &e, 0))?;
    ZipArchive::new(file).map_err(|e| invalid_format(archive, &e))
}

/// Copy in chunks, advancing progress and honouring cancellation.
fn copy_chunked<R: Read, W: Write>(
    reader: &mut R,
    writer: &mut W,
    reporter: &mut ProgressReporter,
    cancel: &CancellationToken,
) -> io::Result<CopyOutcome> {
    let mut buffer = vec![0u8; COPY_CHUNK_SIZE];
    let mut copied = 0u64;
    loop {
        if cancel.is_cancelled() {
            return Ok(CopyOutcome::Cancelled);
        }
        let read = reader.read(&mut buffer)?;
        if read == 0 {
            return Ok(CopyOutcome::Done(copied));
        }
        writer.write_all(&buffer[..read])?;
        copied += read as u64;
        reporter.advance(read as u64);
    }
}

/// Zip entry name for `path` relative to `base`, `/`-separated.
fn entry_name(path: &Path, base: &Path) -> String {
    path.strip_prefix(base)
        .unwrap_or(path)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn collect_items(paths: &[PathBuf]) -> ArchiveResult<Vec<PackItem>> {
    let mut items = Vec::new();
    for input in paths {
        let meta = fs::metadata(input).map_err(|e| io_failure(input, &e, 0))?;
        let base = input.parent().unwrap_or_else(|| Path::new(""));

        if !meta.is_dir() {
            items.push(PackItem {
                source: input.clone(),
                name: entry_name(input, base),
                is_dir: false,
                size: meta.len(),
            });
            continue;
        }

        for entry in WalkDir::new(input).follow_links(false).sort_by_file_name() {
            let entry = entry.map_err(|e| {
                let path = e.path().map_or_else(|| input.clone(), Path::to_path_buf);
                io_failure(&path, &e, 0)
            })?;
            let file_type = entry.file_type();
            if file_type.is_symlink() {
                tracing::warn!("Not packing symlink '{}'", entry.path().display());
                continue;
            }
            let size = if file_type.is_file() {
                entry.metadata().map_err(|e| io_failure(entry.path(), &e, 0))?.len()
            } else {
                0
            };
            let mut name = entry_name(entry.path(), base);
            if file_type.is_dir() {
                name.push('/');
            }
            items.push(PackItem {
                source: entry.into_path(),
                name,
                is_dir: file_type.is_dir(),
                size,
            });
        }
    }
    Ok(items)
}

fn pack_blocking(
    paths: &[PathBuf],
    destination: &Path,
    password: Option<&str>,
    progress: ProgressCallback,
    cancel: &CancellationToken,
) -> ArchiveResult<PackSummary> {
    let items = collect_items(paths)?;
    let total_units = items.iter().map(|i| i.size + 1).sum();
    let mut reporter = ProgressReporter::new(progress, total_units);

    let parent = destination.parent().unwrap_or_else(|| Path::new("."));
    let mut partial = tempfile::Builder::new()
        .prefix(".")
        .suffix(".zip.partial")
        .tempfile_in(parent)
        .map_err(|e| io_failure(destination, &e, 0))?;

    let mut summary = PackSummary::default();
    {
        let mut writer = ZipWriter::new(partial.as_file_mut());
        let options = entry_options(password);

        for item in &items {
            if cancel.is_cancelled() {
                return Err(ArchiveError::Cancelled {
                    entries_written: summary.entries_written,
                });
            }

            if item.is_dir {
                writer
                    .add_directory(item.name.as_str(), options)
                    .map_err(|e| io_failure(&item.source, &e, summary.entries_written))?;
            } else {
                writer
                    .start_file(item.name.as_str(), options)
                    .map_err(|e| io_failure(&item.source, &e, summary.entries_written))?;
                let mut source =
                    File::open(&item.source).map_err(|e| io_failure(&item.source, &e, summary.entries_written))?;
                match copy_chunked(&mut source, &mut writer, &mut reporter, cancel)
                    .map_err(|e| io_failure(&item.source, &e, summary.entries_written))?
                {
                    CopyOutcome::Done(copied) => summary.bytes_read += copied,
                    CopyOutcome::Cancelled => {
                        return Err(ArchiveError::Cancelled {
                            entries_written: summary.entries_written,
                        });
                    }
                }
            }
            summary.entries_written += 1;
            reporter.advance(1);
        }

        writer
            .finish()
            .map_err(|e| io_failure(destination, &e, summary.entries_written))?;
    }

    if cancel.is_cancelled() {
        return Err(ArchiveError::Cancelled {
            entries_written: summary.entries_written,
        });
    }

    partial
        .persist_noclobber(destination)
        .map_err(|e| io_failure(destination, &e.error, summary.entries_written))?;

    reporter.finish();
    tracing::debug!(
        "Packed {} entries ({} bytes) into '{}'",
        summary.entries_written,
        summary.bytes_read,
        destination.display()
    );
    Ok(summary)
}

struct Unpacker<'a> {
    archive: &'a Path,
    destination: &'a Path,
    policy: ConflictPolicy,
    password: Option<&'a str>,
    resolver: ConflictResolver,
    cancel: &'a CancellationToken,
    summary: UnpackSummary,
}

impl Unpacker<'_> {
    fn failure(&self, path: &Path, error: &impl std::fmt::Display) -> ArchiveError {
        io_failure(path, error, self.summary.entries_written)
    }

    fn cancelled(&self) -> ArchiveError {
        ArchiveError::Cancelled {
            entries_written: self.summary.entries_written,
        }
    }

    fn run(&mut self, progress: ProgressCallback) -> ArchiveResult<UnpackSummary> {
        let mut zip = open_archive(self.archive)?;

        let mut total_units = 0u64;
        for idx in 0..zip.len() {
            let entry = zip
                .by_index_raw(idx)
                .map_err(|e| invalid_format(self.archive, &e))?;
            total_units += entry.size() + 1;
        }
        let mut reporter = ProgressReporter::new(progress, total_units);

        fs::create_dir_all(self.destination).map_err(|e| self.failure(self.destination, &e))?;
        let guard = PathGuard::new(self.destination).map_err(|e| self.failure(self.destination, &e))?;

        for idx in 0..zip.len() {
            if self.cancel.is_cancelled() {
                return Err(self.cancelled());
            }

            let mut entry = match self.password {
                Some(password) => zip.by_index_decrypt(idx, password.as_bytes()),
                None => zip.by_index(idx),
            }
            .map_err(|e| map_entry_error(self.archive, e, self.password))?;

            let Some(relative) = entry.enclosed_name() else {
                return Err(ArchiveError::InvalidFormat {
                    path: self.archive.to_path_buf(),
                    reason: format!("entry '{}' escapes the destination", entry.name()),
                });
            };
            let target = self.entry_target(&guard, &relative)?;
            let size = entry.size();

            if entry.is_dir() {
                self.extract_directory(&target)?;
                reporter.advance(1);
                continue;
            }

            match self.claim_file(&target)? {
                Some((path, mut out)) => {
                    match copy_chunked(&mut entry, &mut out, &mut reporter, self.cancel) {
                        Ok(CopyOutcome::Done(_)) => {}
                        Ok(CopyOutcome::Cancelled) => {
                            drop(out);
                            let _ = fs::remove_file(&path);
                            return Err(self.cancelled());
                        }
                        Err(e) => {
                            drop(out);
                            let _ = fs::remove_file(&path);
                            return Err(self.failure(&path, &e));
                        }
                    }
                    if path != target {
                        self.summary.renamed.push(path);
                    }
                    self.summary.entries_written += 1;
                }
                None => {
                    self.summary.entries_skipped += 1;
                    reporter.advance(size);
                }
            }
            reporter.advance(1);
        }

        reporter.finish();
        tracing::debug!(
            "Unpacked '{}' into '{}': {} written, {} skipped, {} renamed",
            self.archive.display(),
            self.destination.display(),
            self.summary.entries_written,
            self.summary.entries_skipped,
            self.summary.renamed.len()
        );
        Ok(std::mem::take(&mut self.summary))
    }

    /// Place an entry below the destination. Links already on disk are
    /// followed, so an entry routed through a symlink that leaves the
    /// destination is rejected like a `../` entry.
    fn entry_target(&self, guard: &PathGuard, relative: &Path) -> ArchiveResult<PathBuf> {
        let resolved = guard.resolve(relative).map_err(|e| ArchiveError::InvalidFormat {
            path: self.archive.to_path_buf(),
            reason: format!("entry '{}' escapes the destination: {e}", relative.display()),
        })?;
        let inside = resolved.strip_prefix(guard.root()).unwrap_or(relative);
        Ok(self.destination.join(inside))
    }

    fn extract_directory(&self, target: &Path) -> ArchiveResult<()> {
        if target.is_file() {
            if self.policy != ConflictPolicy::Replace {
                return Err(self.failure(target, &"directory entry collides with an existing file"));
            }
            fs::remove_file(target).map_err(|e| self.failure(target, &e))?;
        }
        fs::create_dir_all(target).map_err(|e| self.failure(target, &e))
    }

    /// Decide where a file entry goes and open it for writing; `None` when
    /// the entry is skipped.
    fn claim_file(&self, target: &Path) -> ArchiveResult<Option<(PathBuf, File)>> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| self.failure(parent, &e))?;
        }

        let decision = self
            .resolver
            .resolve(target, |p| p.symlink_metadata().is_ok(), self.policy)
            .map_err(|e| match e {
                FileManagerError::Conflict { path } => self.failure(&path, &"destination already exists"),
                other => self.failure(target, &other),
            })?;

        match decision {
            ConflictDecision::Skip => {
                tracing::debug!("Skipping existing '{}'", target.display());
                Ok(None)
            }
            ConflictDecision::Replace(path) => {
                if path.is_dir() {
                    fs::remove_dir_all(&path).map_err(|e| self.failure(&path, &e))?;
                }
                let file = File::create(&path).map_err(|e| self.failure(&path, &e))?;
                Ok(Some((path, file)))
            }
            ConflictDecision::Rename(path) => {
                // create_new re-checks existence atomically at write time.
                let file = OpenOptions::new()
                    .write(true)
                    .create_new(true)
                    .open(&path)
                    .map_err(|e| self.failure(&path, &e))?;
                Ok(Some((path, file)))
            }
        }
    }
}
