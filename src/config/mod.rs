use anyhow::{Context, Result};
use sandbox_fm_core::{ConflictPolicy, FileManagerConfig, HashAlgorithm};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

pub mod defaults;

use defaults::*;

/// Application configuration, read from TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub checksum: ChecksumConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
}

/// Where the sandbox lives and how it is presented
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Sandbox root, created with owner-only permissions when missing
    #[serde(default = "default_root")]
    pub root: PathBuf,
    /// Include dot-files in listings
    #[serde(default = "default_show_hidden")]
    pub show_hidden: bool,
    /// Attempts at finding a free "name N.ext" before giving up
    #[serde(default = "default_max_rename_attempts")]
    pub max_rename_attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Maximum number of results returned
    #[serde(default = "default_result_cap")]
    pub result_cap: usize,
    /// Larger files are matched by name only
    #[serde(default = "default_max_content_bytes")]
    pub max_content_bytes: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumConfig {
    /// Read chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// Algorithms used when none are given on the command line
    #[serde(default = "default_algorithms")]
    pub algorithms: Vec<HashAlgorithm>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    /// Policy for entries that already exist when unpacking
    #[serde(default = "default_conflict_policy")]
    pub conflict_policy: ConflictPolicy,
    /// Remove an archive after it was fully extracted
    #[serde(default = "default_delete_archive_on_success")]
    pub delete_archive_on_success: bool,
}

fn default_root() -> PathBuf {
    PathBuf::from(DEFAULT_ROOT)
}

fn default_show_hidden() -> bool {
    DEFAULT_SHOW_HIDDEN
}

fn default_max_rename_attempts() -> u32 {
    DEFAULT_MAX_RENAME_ATTEMPTS
}

fn default_result_cap() -> usize {
    DEFAULT_RESULT_CAP
}

fn default_max_content_bytes() -> u64 {
    DEFAULT_MAX_CONTENT_BYTES
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_algorithms() -> Vec<HashAlgorithm> {
    DEFAULT_ALGORITHMS.to_vec()
}

fn default_conflict_policy() -> ConflictPolicy {
    DEFAULT_CONFLICT_POLICY
}

fn default_delete_archive_on_success() -> bool {
    DEFAULT_DELETE_ARCHIVE_ON_SUCCESS
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            show_hidden: default_show_hidden(),
            max_rename_attempts: default_max_rename_attempts(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            result_cap: default_result_cap(),
            max_content_bytes: default_max_content_bytes(),
        }
    }
}

impl Default for ChecksumConfig {
    fn default() -> Self {
        Self {
            chunk_size: default_chunk_size(),
            algorithms: default_algorithms(),
        }
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            conflict_policy: default_conflict_policy(),
            delete_archive_on_success: default_delete_archive_on_success(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file =
            std::env::var(CONFIG_FILE_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from_file(&config_file)
    }

    /// Read `config_file`, or write the defaults there if it does not exist.
    pub fn load_from_file<P: AsRef<Path>>(config_file: P) -> Result<Self> {
        let config_file = config_file.as_ref();
        if config_file.exists() {
            let contents = std::fs::read_to_string(config_file)
                .with_context(|| format!("reading {}", config_file.display()))?;
            let config: Self = toml::from_str(&contents)
                .with_context(|| format!("parsing {}", config_file.display()))?;
            config.validate()?;
            Ok(config)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)
                .with_context(|| format!("writing {}", config_file.display()))?;
            info!("Created default config file: {}", config_file.display());
            Ok(default_config)
        }
    }

    /// Reject values the core cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.search.result_cap == 0 {
            anyhow::bail!("search.result_cap must be at least 1");
        }
        if self.checksum.chunk_size == 0 {
            anyhow::bail!("checksum.chunk_size must be at least 1");
        }
        if self.storage.max_rename_attempts == 0 {
            anyhow::bail!("storage.max_rename_attempts must be at least 1");
        }
        Ok(())
    }

    /// Core manager settings derived from this configuration.
    pub fn manager_config(&self) -> FileManagerConfig {
        FileManagerConfig {
            search_result_cap: self.search.result_cap,
            max_rename_attempts: self.storage.max_rename_attempts,
            checksum_chunk_size: self.checksum.chunk_size,
            max_content_bytes: self.search.max_content_bytes,
            show_hidden: self.storage.show_hidden,
        }
    }
}
