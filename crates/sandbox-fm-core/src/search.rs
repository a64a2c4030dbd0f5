//! Recursive name / content / metadata search.

use crate::error::{FileManagerError, Result};
use crate::file_types::decode_text;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

/// Default number of matches returned by a search.
pub const DEFAULT_RESULT_CAP: usize = 100;

/// Files larger than this are matched by name only.
pub const DEFAULT_MAX_CONTENT_BYTES: u64 = 8 * 1024 * 1024;

/// What to look for. Built once, then read-only.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchCriteria {
    query: String,
    case_sensitive: bool,
    search_content: bool,
    extension: Option<String>,
    min_size: Option<u64>,
    max_size: Option<u64>,
}

impl SearchCriteria {
    /// Case-insensitive name search for `query`.
    #[must_use]
    pub fn new<S: Into<String>>(query: S) -> Self {
        Self {
            query: query.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn case_sensitive(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    /// Also match files whose text content contains the query.
    #[must_use]
    pub fn search_content(mut self, search_content: bool) -> Self {
        self.search_content = search_content;
        self
    }

    /// Only consider files with this extension (leading dot optional).
    #[must_use]
    pub fn extension<S: AsRef<str>>(mut self, extension: S) -> Self {
        let ext = extension.as_ref().trim_start_matches('.');
        self.extension = (!ext.is_empty()).then(|| ext.to_string());
        self
    }

    #[must_use]
    pub fn min_size(mut self, bytes: u64) -> Self {
        self.min_size = Some(bytes);
        self
    }

    #[must_use]
    pub fn max_size(mut self, bytes: u64) -> Self {
        self.max_size = Some(bytes);
        self
    }

    #[must_use]
    pub fn query(&self) -> &str {
        &self.query
    }

    #[must_use]
    pub const fn is_case_sensitive(&self) -> bool {
        self.case_sensitive
    }

    #[must_use]
    pub const fn is_content_search(&self) -> bool {
        self.search_content
    }

    #[must_use]
    pub fn extension_filter(&self) -> Option<&str> {
        self.extension.as_deref()
    }

    fn passes_filters(&self, name: &str, size: u64) -> bool {
        if let Some(wanted) = &self.extension {
            let matches = Path::new(name)
                .extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| e.eq_ignore_ascii_case(wanted));
            if !matches {
                return false;
            }
        }
        if self.min_size.is_some_and(|min| size < min) {
            return false;
        }
        if self.max_size.is_some_and(|max| size > max) {
            return false;
        }
        true
    }
}

/// Substring matcher with the query folded once.
struct Matcher {
    needle: String,
    case_sensitive: bool,
}

impl Matcher {
    fn new(criteria: &SearchCriteria) -> Self {
        let needle = if criteria.case_sensitive {
            criteria.query.clone()
        } else {
            criteria.query.to_lowercase()
        };
        Self {
            needle,
            case_sensitive: criteria.case_sensitive,
        }
    }

    fn matches(&self, haystack: &str) -> bool {
        if self.case_sensitive {
            haystack.contains(&self.needle)
        } else {
            haystack.to_lowercase().contains(&self.needle)
        }
    }
}

/// Lazy sequence of matching files under a base directory.
///
/// Each call to [`SearchEngine::iter`] starts a fresh walk. Directories are
/// traversed but never yielded; symlinks are not followed. Unreadable
/// directories and files are logged and skipped.
pub struct SearchIter {
    walker: walkdir::IntoIter,
    criteria: SearchCriteria,
    matcher: Matcher,
    max_content_bytes: u64,
    cancel: CancellationToken,
    done: bool,
}

impl SearchIter {
    fn content_matches(&self, path: &Path) -> bool {
        let mut content = Vec::new();
        let read = std::fs::File::open(path)
            .and_then(|file| file.take(self.max_content_bytes).read_to_end(&mut content));
        if let Err(e) = read {
            tracing::warn!("Skipping content of '{}': {}", path.display(), e);
            return false;
        }
        decode_text(&content).is_some_and(|text| self.matcher.matches(text))
    }

    fn evaluate(&self, entry: &walkdir::DirEntry) -> bool {
        if !entry.file_type().is_file() {
            return false;
        }
        let Some(name) = entry.file_name().to_str() else {
            return false;
        };
        let size = match entry.metadata() {
            Ok(meta) => meta.len(),
            Err(e) => {
                tracing::warn!("Skipping '{}': {}", entry.path().display(), e);
                return false;
            }
        };

        if !self.criteria.passes_filters(name, size) {
            return false;
        }
        if self.matcher.matches(name) {
            return true;
        }
        self.criteria.search_content
            && size <= self.max_content_bytes
            && self.content_matches(entry.path())
    }
}

impl Iterator for SearchIter {
    type Item = Result<PathBuf>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            if self.cancel.is_cancelled() {
                self.done = true;
                return Some(Err(FileManagerError::Cancelled { operation: "search" }));
            }
            match self.walker.next()? {
                Ok(entry) => {
                    if self.evaluate(&entry) {
                        return Some(Ok(entry.into_path()));
                    }
                }
                Err(e) => {
                    tracing::warn!("Search walk error: {}", e);
                }
            }
        }
    }
}

/// Runs searches over directory trees.
#[derive(Debug, Clone, Copy)]
pub struct SearchEngine {
    max_content_bytes: u64,
}

impl Default for SearchEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONTENT_BYTES)
    }
}

impl SearchEngine {
    #[must_use]
    pub const fn new(max_content_bytes: u64) -> Self {
        Self { max_content_bytes }
    }

    /// Start a lazy, blocking walk of `base`.
    #[must_use]
    pub fn iter(&self, base: &Path, criteria: SearchCriteria, cancel: CancellationToken) -> SearchIter {
        let walker = WalkDir::new(base)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter();
        SearchIter {
            walker,
            matcher: Matcher::new(&criteria),
            criteria,
            max_content_bytes: self.max_content_bytes,
            cancel,
            done: false,
        }
    }

    /// Collect at most `result_cap` matches under `base` on a blocking
    /// worker and return them in one piece.
    ///
    /// # Errors
    /// Returns `NotADirectory` if `base` is not a directory and `Cancelled`
    /// if `cancel` fires before the walk completes.
    pub async fn search(
        &self,
        base: &Path,
        criteria: SearchCriteria,
        result_cap: usize,
        cancel: CancellationToken,
    ) -> Result<Vec<PathBuf>> {
        if !tokio::fs::metadata(base).await.is_ok_and(|m| m.is_dir()) {
            return Err(FileManagerError::NotADirectory {
                path: base.to_path_buf(),
            });
        }
        if result_cap == 0 {
            return Ok(Vec::new());
        }

        let iter = self.iter(base, criteria, cancel);
        let results = tokio::task::spawn_blocking(move || -> Result<Vec<PathBuf>> {
            let mut found = Vec::new();
            for item in iter {
                found.push(item?);
                if found.len() >= result_cap {
                    break;
                }
            }
            Ok(found)
        })
        .await
        .map_err(|e| FileManagerError::io("search", base, std::io::Error::other(e)))??;

        tracing::debug!(
            "Search under '{}' returned {} results",
            base.display(),
            results.len()
        );
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: [u8; 8] = [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];

    fn names(results: &[PathBuf]) -> Vec<String> {
        results
            .iter()
            .filter_map(|p| p.file_name()?.to_str().map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_content_search_skips_binary() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        std::fs::write(temp_dir.path().join("notes.txt"), "remember: TODO tests")?;
        let mut png = PNG_HEADER.to_vec();
        png.extend_from_slice(b"TODO");
        std::fs::write(temp_dir.path().join("image.png"), png)?;

        let criteria = SearchCriteria::new("TODO").search_content(true);
        let results = SearchEngine::default()
            .search(temp_dir.path(), criteria, DEFAULT_RESULT_CAP, CancellationToken::new())
            .await?;
        assert_eq!(names(&results), vec!["notes.txt"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_name_match_case_modes() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        std::fs::create_dir_all(temp_dir.path().join("Reports/2024"))?;
        std::fs::write(temp_dir.path().join("Reports/2024/Q1-report.pdf"), "x")?;
        std::fs::write(temp_dir.path().join("readme.md"), "x")?;

        let engine = SearchEngine::default();
        let insensitive = engine
            .search(temp_dir.path(), SearchCriteria::new("REPORT"), 10, CancellationToken::new())
            .await?;
        assert_eq!(names(&insensitive), vec!["Q1-report.pdf"]);

        let sensitive = engine
            .search(
                temp_dir.path(),
                SearchCriteria::new("REPORT").case_sensitive(true),
                10,
                CancellationToken::new(),
            )
            .await?;
        assert!(sensitive.is_empty(), "directories must never match");
        Ok(())
    }

    #[tokio::test]
    async fn test_extension_and_size_filters() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        std::fs::write(temp_dir.path().join("small.TXT"), "a")?;
        std::fs::write(temp_dir.path().join("big.txt"), "a".repeat(2048))?;
        std::fs::write(temp_dir.path().join("big.log"), "a".repeat(2048))?;

        let engine = SearchEngine::default();
        let by_ext = engine
            .search(temp_dir.path(), SearchCriteria::new("").extension(".txt"), 10, CancellationToken::new())
            .await?;
        assert_eq!(names(&by_ext), vec!["big.txt", "small.TXT"]);

        let by_size = engine
            .search(
                temp_dir.path(),
                SearchCriteria::new("").min_size(1000).max_size(4096),
                10,
                CancellationToken::new(),
            )
            .await?;
        assert_eq!(names(&by_size), vec!["big.log", "big.txt"]);
        Ok(())
    }

    #[tokio::test]
    async fn test_result_cap_is_exact() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        for i in 0..25 {
            std::fs::write(temp_dir.path().join(format!("match-{i:02}.txt")), "x")?;
        }

        let results = SearchEngine::default()
            .search(temp_dir.path(), SearchCriteria::new("match"), 10, CancellationToken::new())
            .await?;
        assert_eq!(results.len(), 10);
        Ok(())
    }

    #[tokio::test]
    async fn test_cancelled_search() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        std::fs::write(temp_dir.path().join("a.txt"), "x")?;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = SearchEngine::default()
            .search(temp_dir.path(), SearchCriteria::new("a"), 10, cancel)
            .await;
        assert!(matches!(result, Err(FileManagerError::Cancelled { .. })));
        Ok(())
    }

    #[test]
    fn test_iter_is_restartable() -> std::result::Result<(), Box<dyn std::error::Error>> {
        let temp_dir = tempfile::tempdir()?;
        std::fs::write(temp_dir.path().join("one.txt"), "x")?;
        std::fs::write(temp_dir.path().join("two.txt"), "x")?;

        let engine = SearchEngine::default();
        let first: Vec<PathBuf> = engine
            .iter(temp_dir.path(), SearchCriteria::new("o"), CancellationToken::new())
            .collect::<Result<_>>()?;
        let second: Vec<PathBuf> = engine
            .iter(temp_dir.path(), SearchCriteria::new("o"), CancellationToken::new())
            .collect::<Result<_>>()?;
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        Ok(())
    }
}
