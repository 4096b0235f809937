//! SQLite-backed fingerprint cache.
//!
//! Records map `(path, size, mtime)` to a SHA-256 digest. Lookups only hit
//! when all three key parts match, so a stale record can never be returned
//! for a changed file.
//!
//! The connection is guarded by a [`Mutex`] so the fingerprint workers can
//! share one cache. WAL journaling and a busy timeout let several processes
//! use the same file.

use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, SystemTime};

use rusqlite::{params, Connection, ErrorCode, OptionalExtension};

use super::entry::{path_to_bytes, system_time_to_nanos, CacheEntry};
use crate::scanner::Digest;

/// On-disk layout version, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 1;

/// File name of the default cache inside the cache directory.
pub const DEFAULT_CACHE_FILE: &str = "checksums.db";

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS fingerprints (
        path BLOB PRIMARY KEY NOT NULL,
        size INTEGER NOT NULL,
        mtime_ns INTEGER NOT NULL,
        digest BLOB NOT NULL
    );
    CREATE INDEX IF NOT EXISTS idx_fingerprints_mtime ON fingerprints(mtime_ns);
";

/// Errors that can occur when using the fingerprint cache.
#[derive(thiserror::Error, Debug)]
pub enum CacheError {
    /// A query or statement failed.
    #[error("Cache database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The cache file exists but is not a usable SQLite database.
    #[error("Cache file is corrupted: {path}: {source}")]
    Corrupted {
        /// The cache file
        path: PathBuf,
        /// The error SQLite reported
        #[source]
        source: rusqlite::Error,
    },

    /// Filesystem error around the cache file.
    #[error("Cache I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// A worker panicked while holding the connection.
    #[error("Cache connection lock poisoned")]
    Poisoned,
}

/// Result alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Aggregate numbers about the cache contents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct CacheStats {
    /// Number of stored records
    pub total_entries: u64,
    /// Number of distinct digests among them
    pub unique_fingerprints: u64,
}

/// Persistent fingerprint cache.
///
/// A cache without a connection is *disabled*: every lookup misses and every
/// store is a no-op.
pub struct FingerprintCache {
    conn: Option<Mutex<Connection>>,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for FingerprintCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FingerprintCache")
            .field("path", &self.path)
            .field("enabled", &self.is_enabled())
            .finish()
    }
}

impl FingerprintCache {
    /// Open or create a cache file.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Corrupted`] if the file is not a SQLite
    /// database, or another [`CacheError`] if it cannot be opened.
    pub fn new(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| CacheError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let conn = Connection::open(path).map_err(|e| classify(path, e))?;
        configure(&conn).map_err(|e| classify(path, e))?;
        migrate(&conn).map_err(|e| classify(path, e))?;

        log::debug!("Opened fingerprint cache at {}", path.display());
        Ok(Self {
            conn: Some(Mutex::new(conn)),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory cache.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError::Database`] if SQLite cannot create the database.
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        migrate(&conn)?;
        Ok(Self {
            conn: Some(Mutex::new(conn)),
            path: None,
        })
    }

    /// Open a cache file, recovering from corruption.
    ///
    /// A corrupted file is deleted together with its WAL side files and
    /// recreated. If the cache still cannot be opened, a disabled cache is
    /// returned and the run proceeds without one.
    #[must_use]
    pub fn open_or_recover(path: &Path) -> Self {
        match Self::new(path) {
            Ok(cache) => cache,
            Err(CacheError::Corrupted { source, .. }) => {
                log::warn!(
                    "Fingerprint cache {} is corrupted ({}); recreating it",
                    path.display(),
                    source
                );
                remove_database_files(path);
                Self::new(path).unwrap_or_else(|e| {
                    log::warn!("Could not recreate fingerprint cache: {e}; continuing without cache");
                    Self::disabled()
                })
            }
            Err(e) => {
                log::warn!("Could not open fingerprint cache: {e}; continuing without cache");
                Self::disabled()
            }
        }
    }

    /// A cache that never hits and never stores.
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            conn: None,
            path: None,
        }
    }

    /// Default cache location under the user's cache directory.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "dedupe-tree")
            .map(|dirs| dirs.cache_dir().join(DEFAULT_CACHE_FILE))
    }

    /// Whether this cache is backed by a database.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    /// The cache file, if any.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn lock(&self) -> CacheResult<Option<MutexGuard<'_, Connection>>> {
        match &self.conn {
            None => Ok(None),
            Some(conn) => conn.lock().map(Some).map_err(|_| CacheError::Poisoned),
        }
    }

    /// Look up the digest recorded for a file with this exact size and mtime.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the query fails.
    pub fn lookup(&self, path: &Path, size: u64, mtime: SystemTime) -> CacheResult<Option<Digest>> {
        let Some(conn) = self.lock()? else {
            return Ok(None);
        };

        let blob: Option<Vec<u8>> = conn
            .query_row(
                "SELECT digest FROM fingerprints WHERE path = ?1 AND size = ?2 AND mtime_ns = ?3",
                params![
                    path_to_bytes(path),
                    i64::try_from(size).unwrap_or(i64::MAX),
                    system_time_to_nanos(mtime)
                ],
                |row| row.get(0),
            )
            .optional()?;

        Ok(blob.and_then(|bytes| Digest::try_from(bytes.as_slice()).ok()))
    }

    /// Record the digest of a file, replacing any previous record for its path.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the insert fails.
    pub fn store(&self, entry: &CacheEntry, digest: Digest) -> CacheResult<()> {
        let Some(conn) = self.lock()? else {
            return Ok(());
        };

        conn.execute(
            "INSERT OR REPLACE INTO fingerprints (path, size, mtime_ns, digest) VALUES (?1, ?2, ?3, ?4)",
            params![
                entry.path_bytes(),
                entry.size_i64(),
                entry.mtime_nanos(),
                &digest[..]
            ],
        )?;
        Ok(())
    }

    /// Count records and distinct digests.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the query fails.
    pub fn stats(&self) -> CacheResult<CacheStats> {
        let Some(conn) = self.lock()? else {
            return Ok(CacheStats::default());
        };

        let (total, unique): (i64, i64) = conn.query_row(
            "SELECT COUNT(*), COUNT(DISTINCT digest) FROM fingerprints",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        Ok(CacheStats {
            total_entries: u64::try_from(total).unwrap_or(0),
            unique_fingerprints: u64::try_from(unique).unwrap_or(0),
        })
    }

    /// Drop records for files last modified more than `max_age_days` ago.
    ///
    /// Returns the number of records removed.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the delete fails.
    pub fn cleanup_stale(&self, max_age_days: u64) -> CacheResult<usize> {
        let Some(conn) = self.lock()? else {
            return Ok(0);
        };

        let age = Duration::from_secs(max_age_days.saturating_mul(24 * 60 * 60));
        let cutoff = SystemTime::now()
            .checked_sub(age)
            .unwrap_or(SystemTime::UNIX_EPOCH);
        let removed = conn.execute(
            "DELETE FROM fingerprints WHERE mtime_ns < ?1",
            params![system_time_to_nanos(cutoff)],
        )?;

        log::debug!("Removed {removed} stale cache records older than {max_age_days} days");
        Ok(removed)
    }

    /// Remove every record.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the delete fails.
    pub fn clear(&self) -> CacheResult<()> {
        if let Some(conn) = self.lock()? {
            conn.execute("DELETE FROM fingerprints", [])?;
        }
        Ok(())
    }

    /// Checkpoint the WAL and close the connection.
    ///
    /// # Errors
    ///
    /// Returns [`CacheError`] if the checkpoint or close fails.
    pub fn close(self) -> CacheResult<()> {
        let Some(conn) = self.conn else {
            return Ok(());
        };
        let conn = conn.into_inner().map_err(|_| CacheError::Poisoned)?;

        if self.path.is_some() {
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
        }
        conn.close().map_err(|(_, e)| CacheError::Database(e))
    }
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    // journal_mode answers with the resulting mode, so it has to be read as a row
    let mode: String = conn.query_row("PRAGMA journal_mode = WAL", [], |row| row.get(0))?;
    conn.execute_batch(
        "PRAGMA synchronous = NORMAL;
         PRAGMA busy_timeout = 5000;",
    )?;
    log::trace!("Cache journal mode: {mode}");
    Ok(())
}

/// Bring the schema to [`SCHEMA_VERSION`].
///
/// Records are derived data, so any other version is dropped and recreated.
fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    let version: i64 = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;

    if version != SCHEMA_VERSION {
        if version != 0 {
            log::debug!("Cache schema version {version} != {SCHEMA_VERSION}, recreating");
        }
        conn.execute_batch("DROP TABLE IF EXISTS fingerprints;")?;
    }

    conn.execute_batch(SCHEMA)?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(())
}

fn classify(path: &Path, error: rusqlite::Error) -> CacheError {
    match error.sqlite_error_code() {
        Some(ErrorCode::NotADatabase | ErrorCode::DatabaseCorrupt) => CacheError::Corrupted {
            path: path.to_path_buf(),
            source: error,
        },
        _ => CacheError::Database(error),
    }
}

fn remove_database_files(path: &Path) {
    let mut targets = vec![path.to_path_buf()];
    for suffix in ["-wal", "-shm"] {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        targets.push(PathBuf::from(name));
    }

    for target in targets {
        if let Err(e) = std::fs::remove_file(&target) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::debug!("Failed to remove {}: {}", target.display(), e);
            }
        }
    }
}
