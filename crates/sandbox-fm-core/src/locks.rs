//! Per-directory serialization of mutating operations.

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Hands out one async mutex per directory.
///
/// Operations touching several directories lock them in sorted order, so two
/// concurrent moves in opposite directions cannot deadlock. Entries no longer
/// held by anyone are pruned on the next acquisition.
#[derive(Debug, Default)]
pub struct DirectoryLocks {
    locks: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>,
}

/// Held directory locks; released on drop.
#[derive(Debug)]
pub struct DirectoryGuard {
    directories: Vec<PathBuf>,
    _guards: Vec<OwnedMutexGuard<()>>,
}

impl DirectoryGuard {
    /// The locked directories, in acquisition order.
    #[must_use]
    pub fn directories(&self) -> &[PathBuf] {
        &self.directories
    }
}

impl DirectoryLocks {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock a single directory.
    pub async fn lock(&self, directory: &Path) -> DirectoryGuard {
        self.lock_all([directory.to_path_buf()]).await
    }

    /// Lock every directory in `directories`, deduplicated and in sorted order.
    pub async fn lock_all<I>(&self, directories: I) -> DirectoryGuard
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let ordered: BTreeSet<PathBuf> = directories.into_iter().collect();

        let handles: Vec<Arc<Mutex<()>>> = {
            let mut map = self.locks.lock().await;
            map.retain(|_, lock| Arc::strong_count(lock) > 1);
            ordered
                .iter()
                .map(|dir| {
                    map.entry(dir.clone())
                        .or_insert_with(|| Arc::new(Mutex::new(())))
                        .clone()
                })
                .collect()
        };

        let mut guards = Vec::with_capacity(handles.len());
        for handle in handles {
            guards.push(handle.lock_owned().await);
        }

        tracing::trace!("Locked {} directories", guards.len());
        DirectoryGuard {
            directories: ordered.into_iter().collect(),
            _guards: guards,
        }
    }

    /// Number of directories currently tracked.
    pub async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
