use dedupe_tree::cache::{CacheEntry, CacheError, FingerprintCache};
use rusqlite::Connection;
use std::fs;
use std::path::Path;
use std::time::SystemTime;
use tempfile::tempdir;

fn garbage(path: &Path) {
    fs::write(path, vec![0xA5u8; 8192]).unwrap();
}

#[test]
fn test_open_corrupted_database_fails() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("checksums.db");
    garbage(&path);

    let err = FingerprintCache::new(&path).unwrap_err();
    assert!(matches!(err, CacheError::Corrupted { .. }));
}

#[test]
fn test_open_or_recover_recreates_corrupted_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("checksums.db");
    garbage(&path);
    fs::write(dir.path().join("checksums.db-wal"), b"stale wal").unwrap();

    let cache = FingerprintCache::open_or_recover(&path);
    assert!(cache.is_enabled());

    let mtime = SystemTime::now();
    cache.store(&CacheEntry::new("/f", 3, mtime), [4; 32]).unwrap();
    assert_eq!(cache.lookup(Path::new("/f"), 3, mtime).unwrap(), Some([4; 32]));
}

#[test]
fn test_open_or_recover_falls_back_to_disabled() {
    let dir = tempdir().unwrap();
    // a directory where the database file should be cannot be opened
    let path = dir.path().join("is_a_dir");
    fs::create_dir(&path).unwrap();

    let cache = FingerprintCache::open_or_recover(&path);
    assert!(!cache.is_enabled());
    assert!(cache
        .lookup(Path::new("/any"), 0, SystemTime::now())
        .unwrap()
        .is_none());
    cache
        .store(&CacheEntry::new("/any", 0, SystemTime::now()), [0; 32])
        .unwrap();
    assert_eq!(cache.stats().unwrap().total_entries, 0);
}

#[test]
fn test_unknown_schema_version_starts_empty() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("checksums.db");
    {
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(
            "CREATE TABLE fingerprints (path TEXT PRIMARY KEY, hash TEXT);
             INSERT INTO fingerprints VALUES ('/x', 'deadbeef');
             PRAGMA user_version = 42;",
        )
        .unwrap();
    }

    let cache = FingerprintCache::new(&path).unwrap();
    assert_eq!(cache.stats().unwrap().total_entries, 0);
    let mtime = SystemTime::now();
    cache.store(&CacheEntry::new("/x", 1, mtime), [5; 32]).unwrap();
    assert_eq!(cache.lookup(Path::new("/x"), 1, mtime).unwrap(), Some([5; 32]));
}
