/// Configuration default values
///
/// Every default lives here so the config structs, the generated default
/// file and the CLI help agree.
use sandbox_fm_core::{ConflictPolicy, HashAlgorithm};

// Storage defaults
pub const DEFAULT_ROOT: &str = "./data/files";
pub const DEFAULT_SHOW_HIDDEN: bool = true;
pub const DEFAULT_MAX_RENAME_ATTEMPTS: u32 = 10_000;

// Search defaults
pub const DEFAULT_RESULT_CAP: usize = 100;
pub const DEFAULT_MAX_CONTENT_BYTES: u64 = 8 * 1024 * 1024; // 8MB

// Checksum defaults
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024; // 256KB
pub const DEFAULT_ALGORITHMS: [HashAlgorithm; 2] = [HashAlgorithm::Md5, HashAlgorithm::Sha256];

// Archive defaults
pub const DEFAULT_CONFLICT_POLICY: ConflictPolicy = ConflictPolicy::Rename;
pub const DEFAULT_DELETE_ARCHIVE_ON_SUCCESS: bool = false;

// Config file
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";
pub const CONFIG_FILE_ENV: &str = "SANDBOX_FM_CONFIG";
