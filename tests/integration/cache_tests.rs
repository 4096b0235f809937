use dedupe_tree::cache::{CacheEntry, FingerprintCache};
use dedupe_tree::scanner::{ScanConfig, ScanFilters, ScanResult, TreeScanner};
use filetime::{set_file_mtime, FileTime};
use std::fs;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn scan_with(root: &Path, cache: &Arc<FingerprintCache>) -> ScanResult {
    TreeScanner::new(ScanConfig::default().with_cache(Arc::clone(cache)))
        .scan(root, &ScanFilters::default())
        .unwrap()
}

fn build_tree(root: &Path) {
    write(root, "a/one.txt", b"one");
    write(root, "a/two.txt", b"two");
    write(root, "b/one.txt", b"one");
    write(root, "b/two.txt", b"two");
    write(root, "c/three.txt", b"three");
}

#[test]
fn test_warm_cache_gives_identical_groups() {
    let data = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    build_tree(data.path());

    let cache = Arc::new(FingerprintCache::new(&cache_dir.path().join("c.db")).unwrap());
    let cold = scan_with(data.path(), &cache);
    let warm = scan_with(data.path(), &cache);

    assert_eq!(cold.stats.cache_hits, 0);
    assert_eq!(cold.stats.cache_misses, 5);
    assert_eq!(warm.stats.cache_hits, 5);
    assert_eq!(warm.stats.cache_misses, 0);

    assert_eq!(cold.file_groups, warm.file_groups);
    assert_eq!(cold.directory_groups, warm.directory_groups);
    assert_eq!(cold.directories, warm.directories);
}

#[test]
fn test_cached_results_match_uncached_scan() {
    let data = tempdir().unwrap();
    build_tree(data.path());

    let cache = Arc::new(FingerprintCache::open_in_memory().unwrap());
    scan_with(data.path(), &cache);
    let warm = scan_with(data.path(), &cache);
    let uncached = TreeScanner::with_defaults()
        .scan(data.path(), &ScanFilters::default())
        .unwrap();

    assert_eq!(warm.file_groups, uncached.file_groups);
    assert_eq!(warm.directory_groups, uncached.directory_groups);
}

#[test]
fn test_modified_file_is_rehashed() {
    let data = tempdir().unwrap();
    build_tree(data.path());
    let cache = Arc::new(FingerprintCache::open_in_memory().unwrap());
    scan_with(data.path(), &cache);

    // same size, new content, new mtime
    let target = data.path().join("b/two.txt");
    fs::write(&target, b"TWO").unwrap();
    set_file_mtime(&target, FileTime::from_unix_time(1_000_000, 0)).unwrap();

    let rescan = scan_with(data.path(), &cache);
    assert_eq!(rescan.stats.cache_misses, 1);
    assert_eq!(rescan.stats.cache_hits, 4);
    // a and b no longer match
    assert!(rescan.directory_groups.is_empty());
}

#[test]
fn test_cache_persists_across_reopen() {
    let data = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let db = cache_dir.path().join("nested/dir/checksums.db");
    build_tree(data.path());

    {
        let cache = Arc::new(FingerprintCache::new(&db).unwrap());
        scan_with(data.path(), &cache);
        Arc::try_unwrap(cache).unwrap().close().unwrap();
    }

    let cache = Arc::new(FingerprintCache::new(&db).unwrap());
    assert_eq!(cache.stats().unwrap().total_entries, 5);
    assert_eq!(cache.stats().unwrap().unique_fingerprints, 3);
    let warm = scan_with(data.path(), &cache);
    assert_eq!(warm.stats.cache_hits, 5);
}

#[test]
fn test_cleanup_stale_drops_old_records() {
    let cache = FingerprintCache::open_in_memory().unwrap();
    let old = SystemTime::now() - Duration::from_secs(90 * 24 * 60 * 60);
    let recent = SystemTime::now() - Duration::from_secs(60);

    cache.store(&CacheEntry::new("/old", 1, old), [1; 32]).unwrap();
    cache.store(&CacheEntry::new("/recent", 1, recent), [2; 32]).unwrap();

    assert_eq!(cache.cleanup_stale(30).unwrap(), 1);
    assert!(cache.lookup(Path::new("/old"), 1, old).unwrap().is_none());
    assert_eq!(
        cache.lookup(Path::new("/recent"), 1, recent).unwrap(),
        Some([2; 32])
    );
}

#[test]
fn test_disabled_cache_is_transparent() {
    let data = tempdir().unwrap();
    build_tree(data.path());
    let cache = Arc::new(FingerprintCache::disabled());

    let first = scan_with(data.path(), &cache);
    let second = scan_with(data.path(), &cache);

    assert_eq!(second.stats.cache_hits, 0);
    assert_eq!(first.file_groups, second.file_groups);
}
