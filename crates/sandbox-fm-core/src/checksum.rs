//! Single-pass multi-algorithm file checksums.
//!
//! The file is opened once and read in fixed-size chunks; each chunk is fed
//! to every requested accumulator before the next read, so memory stays at
//! one chunk regardless of file size. MD5 and SHA-1 are offered for display
//! and compatibility only.

use crate::error::{FileManagerError, Result};
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default read chunk size.
pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;

/// Supported digest algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    Md5,
    Sha1,
    Sha256,
    Sha512,
}

impl HashAlgorithm {
    /// Every supported algorithm, in display order.
    pub const ALL: [HashAlgorithm; 4] = [Self::Md5, Self::Sha1, Self::Sha256, Self::Sha512];

    /// Length of the lowercase hex digest.
    #[must_use]
    pub const fn hex_len(self) -> usize {
        match self {
            Self::Md5 => 32,
            Self::Sha1 => 40,
            Self::Sha256 => 64,
            Self::Sha512 => 128,
        }
    }
}

impl std::fmt::Display for HashAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HashAlgorithm::Md5 => write!(f, "md5"),
            HashAlgorithm::Sha1 => write!(f, "sha1"),
            HashAlgorithm::Sha256 => write!(f, "sha256"),
            HashAlgorithm::Sha512 => write!(f, "sha512"),
        }
    }
}

impl std::str::FromStr for HashAlgorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "").as_str() {
            "md5" => Ok(Self::Md5),
            "sha1" => Ok(Self::Sha1),
            "sha256" => Ok(Self::Sha256),
            "sha512" => Ok(Self::Sha512),
            other => Err(format!("unsupported hash algorithm '{other}'")),
        }
    }
}

/// Digests for one file, produced from a single read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecksumSet {
    digests: BTreeMap<HashAlgorithm, String>,
    size_bytes: u64,
}

impl ChecksumSet {
    /// Lowercase hex digest for `algorithm`, if it was requested.
    #[must_use]
    pub fn get(&self, algorithm: HashAlgorithm) -> Option<&str> {
        self.digests.get(&algorithm).map(String::as_str)
    }

    /// Number of bytes hashed.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Iterate `(algorithm, digest)` pairs in algorithm order.
    pub fn iter(&self) -> impl Iterator<Item = (HashAlgorithm, &str)> {
        self.digests.iter().map(|(a, d)| (*a, d.as_str()))
    }

    /// Compare a user-supplied digest (any case, surrounding whitespace
    /// ignored) against the set and return the algorithm it matches.
    #[must_use]
    pub fn verify(&self, expected: &str) -> Option<HashAlgorithm> {
        let expected = expected.trim().to_ascii_lowercase();
        self.digests
            .iter()
            .find(|(_, digest)| **digest == expected)
            .map(|(algorithm, _)| *algorithm)
    }
}

enum Accumulator {
    Md5(md5::Context),
    Sha1(Sha1),
    Sha256(Sha256),
    Sha512(Sha512),
}

impl Accumulator {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Md5 => Self::Md5(md5::Context::new()),
            HashAlgorithm::Sha1 => Self::Sha1(Sha1::new()),
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::Sha512 => Self::Sha512(Sha512::new()),
        }
    }

    fn update(&mut self, chunk: &[u8]) {
        match self {
            Self::Md5(ctx) => ctx.consume(chunk),
            Self::Sha1(h) => h.update(chunk),
            Self::Sha256(h) => h.update(chunk),
            Self::Sha512(h) => h.update(chunk),
        }
    }

    fn finalize(self) -> String {
        match self {
            Self::Md5(ctx) => format!("{:x}", ctx.compute()),
            Self::Sha1(h) => hex::encode(h.finalize()),
            Self::Sha256(h) => hex::encode(h.finalize()),
            Self::Sha512(h) => hex::encode(h.finalize()),
        }
    }
}

/// Streams bytes through a set of hash accumulators.
#[derive(Debug, Clone, Copy)]
pub struct ChecksumEngine {
    chunk_size: usize,
}

impl Default for ChecksumEngine {
    fn default() -> Self {
        Self::new(DEFAULT_CHUNK_SIZE)
    }
}

impl ChecksumEngine {
    /// Create an engine reading `chunk_size` bytes at a time (minimum 1).
    #[must_use]
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    /// Hash the file at `path` with every algorithm in `algorithms`
    /// (all supported algorithms when empty).
    ///
    /// # Errors
    /// Returns `Io` if the file cannot be opened or any read fails; no
    /// partial digests are returned.
    pub async fn compute_all<P: AsRef<Path>>(
        &self,
        path: P,
        algorithms: &[HashAlgorithm],
    ) -> Result<ChecksumSet> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| FileManagerError::io("open for checksum", path, e))?;

        let set = self
            .compute_reader(file, algorithms)
            .await
            .map_err(|e| FileManagerError::io("checksum read", path, e))?;

        tracing::debug!(
            "Computed {} digests over {} bytes of '{}'",
            set.digests.len(),
            set.size_bytes,
            path.display()
        );
        Ok(set)
    }

    /// Hash everything readable from `reader`.
    ///
    /// # Errors
    /// Propagates the first read error.
    pub async fn compute_reader<R>(
        &self,
        mut reader: R,
        algorithms: &[HashAlgorithm],
    ) -> std::io::Result<ChecksumSet>
    where
        R: AsyncRead + Unpin,
    {
        let requested: BTreeSet<HashAlgorithm> = if algorithms.is_empty() {
            HashAlgorithm::ALL.into_iter().collect()
        } else {
            algorithms.iter().copied().collect()
        };
        let mut accumulators: Vec<(HashAlgorithm, Accumulator)> = requested
            .into_iter()
            .map(|a| (a, Accumulator::new(a)))
            .collect();

        let mut buffer = vec![0u8; self.chunk_size];
        let mut size_bytes = 0u64;
        loop {
            let read = reader.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            let chunk = &buffer[..read];
            for (_, accumulator) in &mut accumulators {
                accumulator.update(chunk);
            }
            size_bytes += read as u64;
        }

        let digests = accumulators
            .into_iter()
            .map(|(algorithm, accumulator)| (algorithm, accumulator.finalize()))
            .collect();

        Ok(ChecksumSet {
            digests,
            size_bytes,
        })
    }
}

/// Hash `path` with the default chunk size.
///
/// # Errors
/// See [`ChecksumEngine::compute_all`].
pub async fn compute_all<P: AsRef<Path>>(path: P, algorithms: &[HashAlgorithm]) -> Result<ChecksumSet> {
    ChecksumEngine::default().compute_all(path, algorithms).await
}
