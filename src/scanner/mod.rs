//! Scanner module for tree discovery and content fingerprinting.
//!
//! This module provides functionality for:
//! - Sorted, non-following directory traversal using walkdir
//! - Streaming SHA-256 file fingerprints
//! - Bottom-up directory fingerprints composed from their children
//!
//! # Architecture
//!
//! The scanner is divided into submodules:
//! - [`walker`]: Tree discovery and the parallel bottom-up fingerprint pass
//! - [`hasher`]: SHA-256 hashing of files and directory child lists
//!
//! # Example
//!
//! ```no_run
//! use dedupe_tree::scanner::{ScanFilters, TreeScanner};
//! use std::path::Path;
//!
//! let filters = ScanFilters::default().with_min_size(1024);
//! let result = TreeScanner::with_defaults()
//!     .scan(Path::new("."), &filters)
//!     .unwrap();
//!
//! for group in &result.file_groups {
//!     println!("{} copies of {}", group.len(), group.keeper().path.display());
//! }
//! ```

pub mod hasher;
pub mod walker;

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::duplicates::{DirectoryGroup, FileGroup};

// Re-export main types
pub use hasher::{hash_to_hex, hex_to_hash, ChildFingerprint, Hasher, CHUNK_SIZE};
pub use walker::{ScanConfig, TreeScanner};

/// A 256-bit SHA-256 digest.
pub type Digest = [u8; 32];

/// Whether an entry has a content fingerprint yet.
///
/// Entries start out unfingerprinted and move to `Fingerprinted` exactly once
/// during a scan. A directory whose subtree has no qualifying files stays
/// unfingerprinted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FingerprintState {
    /// No fingerprint computed (unreadable file, or directory with no files)
    #[default]
    Unfingerprinted,
    /// Content fingerprint
    Fingerprinted(Digest),
}

impl FingerprintState {
    /// The digest, if fingerprinted.
    #[must_use]
    pub fn digest(&self) -> Option<&Digest> {
        match self {
            Self::Fingerprinted(d) => Some(d),
            Self::Unfingerprinted => None,
        }
    }

    /// Check if a fingerprint is present.
    #[must_use]
    pub fn is_fingerprinted(&self) -> bool {
        matches!(self, Self::Fingerprinted(_))
    }
}

impl From<Option<Digest>> for FingerprintState {
    fn from(value: Option<Digest>) -> Self {
        value.map_or(Self::Unfingerprinted, Self::Fingerprinted)
    }
}

/// Kind of a filesystem entry that takes part in deduplication.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    /// Regular file
    File,
    /// Directory
    Directory,
}

impl EntryKind {
    /// One-byte tag used in directory fingerprint records.
    #[must_use]
    pub fn tag(self) -> u8 {
        match self {
            Self::File => b'F',
            Self::Directory => b'D',
        }
    }

    /// Lowercase name for reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Directory => "directory",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata for a discovered regular file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Absolute path to the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub modified: SystemTime,
    /// Number of path components between the scan root and this file
    pub depth: usize,
    /// Content fingerprint
    pub fingerprint: FingerprintState,
}

impl FileEntry {
    /// Create a new, unfingerprinted FileEntry.
    ///
    /// # Arguments
    ///
    /// * `path` - Absolute path to the file
    /// * `size` - File size in bytes
    /// * `modified` - Last modification time
    /// * `depth` - Nesting depth below the scan root
    #[must_use]
    pub fn new(path: PathBuf, size: u64, modified: SystemTime, depth: usize) -> Self {
        Self {
            path,
            size,
            modified,
            depth,
            fingerprint: FingerprintState::Unfingerprinted,
        }
    }

    /// Attach a fingerprint.
    #[must_use]
    pub fn with_fingerprint(mut self, digest: Digest) -> Self {
        self.fingerprint = FingerprintState::Fingerprinted(digest);
        self
    }
}

/// Metadata for a discovered directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    /// Absolute path to the directory
    pub path: PathBuf,
    /// Number of path components between the scan root and this directory
    pub depth: usize,
    /// Recursive count of qualifying files
    pub file_count: usize,
    /// Aggregate size of qualifying files in bytes
    pub size: u64,
    /// Composite fingerprint of the subtree
    pub fingerprint: FingerprintState,
    /// True when every descendant took part in the fingerprint: nothing was
    /// filtered out, unreadable, a symlink or a special file.
    pub complete: bool,
}

impl DirectoryEntry {
    /// Create a new, empty DirectoryEntry.
    #[must_use]
    pub fn new(path: PathBuf, depth: usize) -> Self {
        Self {
            path,
            depth,
            file_count: 0,
            size: 0,
            fingerprint: FingerprintState::Unfingerprinted,
            complete: true,
        }
    }
}

/// Filters applied while scanning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanFilters {
    /// Allowed extensions, lowercase without the leading dot. Empty allows all.
    pub extensions: BTreeSet<String>,
    /// Minimum file size for file-level deduplication
    pub min_size: u64,
    /// Minimum recursive file count for directory-level deduplication.
    /// Zero disables the filter.
    pub min_files: usize,
    /// Minimum aggregate size for directory-level deduplication
    pub min_dir_size: u64,
}

impl ScanFilters {
    /// Set the extension allow-list.
    ///
    /// Extensions are normalized to lowercase and a leading dot is optional,
    /// so `".TXT"` and `"txt"` are the same entry.
    #[must_use]
    pub fn with_extensions<I, S>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.extensions = extensions
            .into_iter()
            .filter_map(|ext| normalize_extension(ext.as_ref()))
            .collect();
        self
    }

    /// Set the minimum file size.
    #[must_use]
    pub fn with_min_size(mut self, min_size: u64) -> Self {
        self.min_size = min_size;
        self
    }

    /// Set the minimum file count for directories.
    #[must_use]
    pub fn with_min_files(mut self, min_files: usize) -> Self {
        self.min_files = min_files;
        self
    }

    /// Set the minimum aggregate directory size.
    #[must_use]
    pub fn with_min_dir_size(mut self, min_dir_size: u64) -> Self {
        self.min_dir_size = min_dir_size;
        self
    }

    /// Check a path against the extension allow-list.
    #[must_use]
    pub fn passes_extension(&self, path: &Path) -> bool {
        if self.extensions.is_empty() {
            return true;
        }
        path.extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| self.extensions.contains(&ext.to_lowercase()))
    }

    /// Check a size against the minimum file size.
    #[must_use]
    pub fn passes_size(&self, size: u64) -> bool {
        size >= self.min_size
    }

    /// Check whether a file takes part in the scan at all.
    #[must_use]
    pub fn accepts_file(&self, path: &Path, size: u64) -> bool {
        self.passes_extension(path) && self.passes_size(size)
    }

    /// Check whether a scanned directory may take part in directory-level
    /// deduplication.
    #[must_use]
    pub fn accepts_directory(&self, dir: &DirectoryEntry) -> bool {
        dir.complete
            && dir.fingerprint.is_fingerprinted()
            && dir.file_count >= self.min_files
            && dir.size >= self.min_dir_size
    }
}

/// Normalize a user-supplied extension: trim, drop a leading dot, lowercase.
#[must_use]
pub fn normalize_extension(ext: &str) -> Option<String> {
    let trimmed = ext.trim();
    let trimmed = trimmed.strip_prefix('.').unwrap_or(trimmed);
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

/// A non-fatal problem encountered during scanning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScanWarning {
    /// Path the problem relates to
    pub path: PathBuf,
    /// Human-readable description
    pub message: String,
}

impl ScanWarning {
    /// Create a warning.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ScanWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.path.display(), self.message)
    }
}

/// Counters collected during a scan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    /// Regular files discovered
    pub files_seen: usize,
    /// Files that were fingerprinted
    pub files_fingerprinted: usize,
    /// Files excluded by extension or size filters
    pub files_filtered: usize,
    /// Files that could not be fingerprinted
    pub files_failed: usize,
    /// Symbolic links skipped
    pub symlinks_skipped: usize,
    /// Special files (sockets, fifos, devices) skipped
    pub special_skipped: usize,
    /// Directories discovered, including the root
    pub directories_seen: usize,
    /// Total bytes of fingerprinted files
    pub bytes_scanned: u64,
    /// Fingerprints served from the cache
    pub cache_hits: usize,
    /// Fingerprints computed because the cache had no usable record
    pub cache_misses: usize,
    /// Wall-clock duration of the scan
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

mod duration_ms {
    use serde::Serializer;
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }
}

/// Everything a scan produces.
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Canonicalized scan root
    pub root: PathBuf,
    /// Every discovered regular file that passed the filters
    pub files: Vec<FileEntry>,
    /// Every discovered directory, including the root
    pub directories: Vec<DirectoryEntry>,
    /// Files sharing a fingerprint, two or more per group
    pub file_groups: Vec<FileGroup>,
    /// Eligible directories sharing a fingerprint, two or more per group
    pub directory_groups: Vec<DirectoryGroup>,
    /// Non-fatal problems
    pub warnings: Vec<ScanWarning>,
    /// Counters
    pub stats: ScanStats,
}

/// Errors that end a scan.
#[derive(thiserror::Error, Debug)]
pub enum ScanError {
    /// The scan root is missing or not a directory.
    #[error("Invalid scan root {path}: {reason}")]
    InvalidRoot {
        /// The root as given
        path: PathBuf,
        /// Why it was rejected
        reason: String,
    },

    /// An I/O error occurred while accessing a path.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The worker pool could not be built.
    #[error("Failed to build fingerprint thread pool: {0}")]
    ThreadPool(String),

    /// The scan was interrupted by a shutdown request.
    #[error("Scan interrupted")]
    Interrupted,
}

/// Errors that can occur during file hashing.
#[derive(thiserror::Error, Debug)]
pub enum HashError {
    /// The specified file was not found.
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    /// Permission was denied when reading the file.
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),

    /// An I/O error occurred while reading the file.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// Hashing stopped because a shutdown was requested.
    #[error("Hashing interrupted: {0}")]
    Interrupted(PathBuf),
}

impl HashError {
    /// Classify an I/O error for a path.
    #[must_use]
    pub fn from_io(path: &Path, error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.to_path_buf()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_path_buf()),
            _ => Self::Io {
                path: path.to_path_buf(),
                source: error,
            },
        }
    }
}
