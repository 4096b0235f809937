//! Cache entry definitions.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use crate::scanner::FileEntry;

/// Key of a fingerprint record: the file's path, size and modification time.
///
/// A record is only reused when all three match the file as it is now.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CacheEntry {
    /// Absolute path of the file
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modification time
    pub mtime: SystemTime,
}

impl CacheEntry {
    /// Create a cache key.
    #[must_use]
    pub fn new(path: impl Into<PathBuf>, size: u64, mtime: SystemTime) -> Self {
        Self {
            path: path.into(),
            size,
            mtime,
        }
    }

    /// Path as stored in the database.
    #[must_use]
    pub fn path_bytes(&self) -> &[u8] {
        path_to_bytes(&self.path)
    }

    /// Modification time in nanoseconds since the Unix epoch.
    #[must_use]
    pub fn mtime_nanos(&self) -> i64 {
        system_time_to_nanos(self.mtime)
    }

    /// Size as stored in the database.
    #[must_use]
    pub fn size_i64(&self) -> i64 {
        i64::try_from(self.size).unwrap_or(i64::MAX)
    }
}

impl From<&FileEntry> for CacheEntry {
    fn from(entry: &FileEntry) -> Self {
        Self::new(entry.path.clone(), entry.size, entry.modified)
    }
}

/// Raw bytes of a path, lossless on every platform.
#[must_use]
pub fn path_to_bytes(path: &Path) -> &[u8] {
    path.as_os_str().as_encoded_bytes()
}

/// Convert a timestamp to signed nanoseconds since the Unix epoch.
///
/// Times before the epoch become negative; values beyond the `i64` range
/// saturate.
#[must_use]
pub fn system_time_to_nanos(time: SystemTime) -> i64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_nanos()).unwrap_or(i64::MAX),
        Err(before) => i64::try_from(before.duration().as_nanos())
            .map(|n| -n)
            .unwrap_or(i64::MIN),
    }
}

/// Inverse of [`system_time_to_nanos`].
#[must_use]
pub fn nanos_to_system_time(nanos: i64) -> SystemTime {
    let magnitude = Duration::from_nanos(nanos.unsigned_abs());
    if nanos >= 0 {
        UNIX_EPOCH + magnitude
    } else {
        UNIX_EPOCH - magnitude
    }
}
