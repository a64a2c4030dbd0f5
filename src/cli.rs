//! Command-line interface: argument types and command execution.

use crate::config::Config;
use crate::utils::{format_duration, format_size};
use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use sandbox_fm_core::{
    ArchiveEntry, CancellationToken, ChecksumSet, ConflictPolicy, DirectoryEntry, FileManager, HashAlgorithm,
    MutationOutcome, ProgressCallback, RenameSpec, SearchCriteria, SortKey, UnpackRequest, batch,
    no_progress, progress_channel,
};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "sandbox-fm")]
#[command(version)]
#[command(about = "Browse and manage files inside a sandboxed directory")]
#[command(long_about = None)]
pub struct Cli {
    /// Configuration file path [default: $SANDBOX_FM_CONFIG or config.toml]
    #[arg(short, long)]
    pub config: Option<String>,

    /// Sandbox root (overrides config file)
    #[arg(short, long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Working directory inside the sandbox, relative to the root
    #[arg(long, value_name = "DIR")]
    pub cwd: Option<PathBuf>,

    /// Log level
    #[arg(short = 'v', long, default_value = "warn")]
    pub log_level: String,

    /// Print results as JSON
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List a directory
    Ls {
        path: Option<PathBuf>,
        #[arg(short, long, default_value = "name")]
        sort: SortKey,
    },
    /// Create a directory in the working directory
    Mkdir {
        name: String,
        #[arg(long, default_value = "reject")]
        on_conflict: ConflictPolicy,
    },
    /// Create a file in the working directory
    Touch {
        name: String,
        #[arg(long, default_value = "")]
        content: String,
        #[arg(long, default_value = "rename")]
        on_conflict: ConflictPolicy,
    },
    /// Rename an item in place
    Rename { path: PathBuf, new_name: String },
    /// Move an item into another directory
    Mv {
        path: PathBuf,
        destination: PathBuf,
        #[arg(long, default_value = "reject")]
        on_conflict: ConflictPolicy,
    },
    /// Copy an item into another directory
    Cp {
        path: PathBuf,
        destination: PathBuf,
        #[arg(long, default_value = "rename")]
        on_conflict: ConflictPolicy,
    },
    /// Copy an item next to itself ("name 2.ext")
    Dup { path: PathBuf },
    /// Delete a file or directory tree
    Rm { path: PathBuf },
    /// Copy a file from outside the sandbox into the working directory
    Import {
        source: PathBuf,
        #[arg(long, default_value = "rename")]
        on_conflict: ConflictPolicy,
    },
    /// Compute file checksums
    Checksum {
        path: PathBuf,
        /// Algorithms to use (repeatable); defaults come from the config file
        #[arg(short, long = "algorithm")]
        algorithms: Vec<HashAlgorithm>,
        /// Report which algorithm, if any, produces this digest
        #[arg(long)]
        verify: Option<String>,
    },
    /// Search below the working directory
    Search(SearchArgs),
    /// Pack items into a zip archive in the working directory
    Zip {
        archive_name: String,
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        #[arg(long)]
        password: Option<String>,
    },
    /// Extract a zip archive
    Unzip {
        archive: PathBuf,
        /// Destination directory (defaults to the archive's directory)
        #[arg(short, long)]
        dest: Option<PathBuf>,
        #[arg(long)]
        on_conflict: Option<ConflictPolicy>,
        #[arg(long)]
        password: Option<String>,
        /// Delete the archive after a successful extraction
        #[arg(long)]
        delete: bool,
    },
    /// List the entries of a zip archive
    ZipList { archive: PathBuf },
    /// Preview (or apply) a batch rename
    BatchRename(BatchRenameArgs),
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Text to look for in names (and content with --content)
    pub query: String,
    #[arg(long)]
    pub content: bool,
    #[arg(long)]
    pub case_sensitive: bool,
    #[arg(long)]
    pub ext: Option<String>,
    #[arg(long, value_name = "BYTES")]
    pub min_size: Option<u64>,
    #[arg(long, value_name = "BYTES")]
    pub max_size: Option<u64>,
}

#[derive(Args, Debug)]
pub struct BatchRenameArgs {
    #[arg(required = true)]
    pub files: Vec<PathBuf>,
    /// Text to replace in each stem
    #[arg(long, requires = "replace", conflicts_with_all = ["pattern", "prefix", "suffix"])]
    pub find: Option<String>,
    #[arg(long)]
    pub replace: Option<String>,
    /// Sequential pattern containing {n}
    #[arg(long, conflicts_with_all = ["prefix", "suffix"])]
    pub pattern: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub start: u32,
    #[arg(long)]
    pub prefix: Option<String>,
    #[arg(long)]
    pub suffix: Option<String>,
    /// Apply the renames instead of only previewing them
    #[arg(long)]
    pub apply: bool,
}

impl BatchRenameArgs {
    fn spec(&self) -> Result<RenameSpec> {
        if let Some(find) = &self.find {
            return Ok(RenameSpec::FindReplace {
                find: find.clone(),
                replace: self.replace.clone().unwrap_or_default(),
            });
        }
        if let Some(pattern) = &self.pattern {
            return Ok(RenameSpec::Sequential {
                pattern: pattern.clone(),
                start_number: self.start,
            });
        }
        if self.prefix.is_some() || self.suffix.is_some() {
            return Ok(RenameSpec::PrefixSuffix {
                prefix: self.prefix.clone().unwrap_or_default(),
                suffix: self.suffix.clone().unwrap_or_default(),
            });
        }
        bail!("choose one of --find/--replace, --pattern or --prefix/--suffix")
    }
}

#[derive(Serialize)]
struct RenamePreviewRow<'a> {
    from: &'a Path,
    to: &'a str,
}

/// Runs one parsed command against a manager.
pub struct Runner {
    manager: FileManager,
    config: Config,
    json: bool,
    cancel: CancellationToken,
}

impl Runner {
    pub fn new(manager: FileManager, config: Config, json: bool, cancel: CancellationToken) -> Self {
        Self {
            manager,
            config,
            json,
            cancel,
        }
    }

    /// Paths on the command line are relative to the working directory.
    async fn at(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.manager.current_directory().await.join(path)
        }
    }

    pub async fn run(&self, command: Command) -> Result<()> {
        match command {
            Command::Ls { path, sort } => {
                let listing = match path {
                    Some(path) => {
                        let dir = self.at(&path).await;
                        self.manager.navigate_to(&dir).await?;
                        self.manager.list_current_sorted(sort).await?
                    }
                    None => self.manager.list_current_sorted(sort).await?,
                };
                self.print_listing(&listing)
            }
            Command::Mkdir { name, on_conflict } => {
                let outcome = self.manager.create_directory(&name, on_conflict).await?;
                self.print_outcome("Created", &outcome)
            }
            Command::Touch {
                name,
                content,
                on_conflict,
            } => {
                let outcome = self.manager.create_file(&name, content, on_conflict).await?;
                self.print_outcome("Created", &outcome)
            }
            Command::Rename { path, new_name } => {
                let outcome = self.manager.rename(self.at(&path).await, &new_name).await?;
                self.print_outcome("Renamed to", &outcome)
            }
            Command::Mv {
                path,
                destination,
                on_conflict,
            } => {
                let outcome = self
                    .manager
                    .move_item(self.at(&path).await, self.at(&destination).await, on_conflict)
                    .await?;
                self.print_outcome("Moved to", &outcome)
            }
            Command::Cp {
                path,
                destination,
                on_conflict,
            } => {
                let outcome = self
                    .manager
                    .copy_item(self.at(&path).await, self.at(&destination).await, on_conflict)
                    .await?;
                self.print_outcome("Copied to", &outcome)
            }
            Command::Dup { path } => {
                let outcome = self.manager.duplicate(self.at(&path).await).await?;
                self.print_outcome("Duplicated as", &outcome)
            }
            Command::Rm { path } => {
                let outcome = self.manager.delete(self.at(&path).await).await?;
                self.print_outcome("Deleted", &outcome)
            }
            Command::Import { source, on_conflict } => {
                let outcome = self.manager.import_from(&source, on_conflict).await?;
                self.print_outcome("Imported as", &outcome)
            }
            Command::Checksum {
                path,
                algorithms,
                verify,
            } => {
                let algorithms = if algorithms.is_empty() {
                    self.config.checksum.algorithms.clone()
                } else {
                    algorithms
                };
                let set = self.manager.checksum(self.at(&path).await, &algorithms).await?;
                self.print_checksums(&set, verify.as_deref())
            }
            Command::Search(args) => self.search(args).await,
            Command::Zip {
                archive_name,
                paths,
                password,
            } => {
                let mut inputs = Vec::with_capacity(paths.len());
                for path in &paths {
                    inputs.push(self.at(path).await);
                }
                let started = Instant::now();
                let progress = self.progress_printer();
                let outcome = self
                    .manager
                    .pack(&inputs, &archive_name, password, progress, self.cancel.clone())
                    .await?;
                self.print_outcome(&format!("Packed in {} ->", format_duration(started.elapsed())), &outcome)
            }
            Command::Unzip {
                archive,
                dest,
                on_conflict,
                password,
                delete,
            } => {
                let destination = match dest {
                    Some(dest) => Some(self.at(&dest).await),
                    None => None,
                };
                let request = UnpackRequest {
                    destination,
                    policy: on_conflict.unwrap_or(self.config.archive.conflict_policy),
                    password,
                    delete_archive_on_success: delete || self.config.archive.delete_archive_on_success,
                };
                let started = Instant::now();
                let progress = self.progress_printer();
                let outcome = self
                    .manager
                    .unpack(self.at(&archive).await, request, progress, self.cancel.clone())
                    .await?;
                self.print_outcome(&format!("Extracted in {} ->", format_duration(started.elapsed())), &outcome)
            }
            Command::ZipList { archive } => {
                let entries = self.manager.list_archive(self.at(&archive).await).await?;
                self.print_archive_entries(&entries)
            }
            Command::BatchRename(args) => self.batch_rename(args).await,
        }
    }

    async fn search(&self, args: SearchArgs) -> Result<()> {
        let mut criteria = SearchCriteria::new(args.query)
            .case_sensitive(args.case_sensitive)
            .search_content(args.content);
        if let Some(ext) = args.ext {
            criteria = criteria.extension(ext);
        }
        if let Some(min) = args.min_size {
            criteria = criteria.min_size(min);
        }
        if let Some(max) = args.max_size {
            criteria = criteria.max_size(max);
        }

        let results = self.manager.search(criteria, self.cancel.clone()).await?;
        if self.json {
            return print_json(&results);
        }
        let root = self.manager.root();
        for path in &results {
            println!("{}", path.strip_prefix(root).unwrap_or(path).display());
        }
        if results.len() >= self.config.search.result_cap {
            eprintln!("(showing the first {} results)", results.len());
        }
        Ok(())
    }

    async fn batch_rename(&self, args: BatchRenameArgs) -> Result<()> {
        let spec = args.spec()?;
        let mut files = Vec::with_capacity(args.files.len());
        for file in &args.files {
            files.push(self.manager.resolve(self.at(file).await)?);
        }
        let names = batch::preview(&files, &spec)?;

        if self.json && !args.apply {
            let rows: Vec<RenamePreviewRow<'_>> = files
                .iter()
                .zip(&names)
                .map(|(from, to)| RenamePreviewRow { from, to })
                .collect();
            return print_json(&rows);
        }
        if !args.apply {
            for (from, to) in files.iter().zip(&names) {
                let from_name = from.file_name().map(|n| n.to_string_lossy()).unwrap_or_default();
                println!("{from_name} -> {to}");
            }
            println!("(preview only; pass --apply to rename)");
            return Ok(());
        }

        let outcome = self
            .manager
            .commit_batch_rename(&files, &names, no_progress())
            .await?;
        if self.json {
            return print_json(&outcome);
        }
        println!("Renamed {} items", names.len());
        Ok(())
    }

    /// Progress sink that redraws a percentage on stderr.
    fn progress_printer(&self) -> ProgressCallback {
        if self.json {
            return no_progress();
        }
        let (callback, mut rx) = progress_channel();
        tokio::spawn(async move {
            while rx.changed().await.is_ok() {
                let fraction = *rx.borrow_and_update();
                eprint!("\r{:>3.0}%", fraction * 100.0);
                if fraction >= 1.0 {
                    eprintln!();
                    break;
                }
            }
        });
        callback
    }

    fn print_listing(&self, listing: &[DirectoryEntry]) -> Result<()> {
        if self.json {
            return print_json(&listing);
        }
        for entry in listing {
            let kind = if entry.is_directory { 'd' } else { '-' };
            let size = entry.size_bytes.map(format_size).unwrap_or_default();
            let modified = entry
                .modified_at
                .map(|m| m.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            let suffix = if entry.is_directory { "/" } else { "" };
            println!("{kind} {size:>9} {modified:<16} {}{suffix}", entry.name);
        }
        Ok(())
    }

    fn print_outcome(&self, verb: &str, outcome: &MutationOutcome) -> Result<()> {
        if self.json {
            return print_json(outcome);
        }
        match &outcome.path {
            Some(path) => {
                let shown = path.strip_prefix(self.manager.root()).unwrap_or(path);
                println!("{verb} {}", shown.display());
            }
            None => println!("Skipped (destination exists)"),
        }
        Ok(())
    }

    fn print_checksums(&self, set: &ChecksumSet, verify: Option<&str>) -> Result<()> {
        let matched = verify.map(|expected| set.verify(expected));
        if self.json {
            #[derive(Serialize)]
            struct Report<'a> {
                #[serde(flatten)]
                set: &'a ChecksumSet,
                #[serde(skip_serializing_if = "Option::is_none")]
                verified: Option<Option<HashAlgorithm>>,
            }
            return print_json(&Report { set, verified: matched });
        }
        println!("size    {}", format_size(set.size_bytes()));
        for (algorithm, digest) in set.iter() {
            println!("{:<7} {digest}", algorithm.to_string());
        }
        match matched {
            Some(Some(algorithm)) => println!("verified: matches {algorithm}"),
            Some(None) => bail!("verification failed: digest does not match"),
            None => {}
        }
        Ok(())
    }

    fn print_archive_entries(&self, entries: &[ArchiveEntry]) -> Result<()> {
        if self.json {
            return print_json(&entries);
        }
        for entry in entries {
            let size = if entry.is_dir {
                String::new()
            } else {
                format_size(entry.size)
            };
            println!("{size:>9} {}", entry.name);
        }
        Ok(())
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    let rendered = serde_json::to_string_pretty(value).context("serializing output")?;
    println!("{rendered}");
    Ok(())
}
