use dedupe_tree::scanner::{ScanConfig, ScanError, ScanFilters, TreeScanner};
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn scan(root: &Path, filters: &ScanFilters) -> dedupe_tree::scanner::ScanResult {
    TreeScanner::with_defaults().scan(root, filters).unwrap()
}

#[test]
fn test_scan_empty_directory() {
    let dir = tempdir().unwrap();
    let result = scan(dir.path(), &ScanFilters::default());

    assert!(result.files.is_empty());
    assert_eq!(result.directories.len(), 1);
    assert!(result.file_groups.is_empty());
    assert!(result.directory_groups.is_empty());
    assert!(!result.directories[0].fingerprint.is_fingerprinted());
}

#[test]
fn test_scan_unique_files() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"content a");
    write(dir.path(), "b.txt", b"content b");
    write(dir.path(), "c.txt", b"content c");

    let result = scan(dir.path(), &ScanFilters::default());

    assert_eq!(result.files.len(), 3);
    assert!(result.file_groups.is_empty());
    assert_eq!(result.stats.bytes_scanned, 27);
}

#[test]
fn test_scan_duplicate_files_across_levels() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a.txt", b"duplicate");
    write(dir.path(), "sub/deeper/b.txt", b"duplicate");
    write(dir.path(), "sub/c.txt", b"unique");

    let result = scan(dir.path(), &ScanFilters::default());

    assert_eq!(result.file_groups.len(), 1);
    let group = &result.file_groups[0];
    assert_eq!(group.len(), 2);
    assert!(group.keeper().path.ends_with("a.txt"));
    assert_eq!(group.keeper().depth, 1);
    assert_eq!(group.redundant()[0].depth, 3);
}

#[test]
fn test_identical_trees_form_directory_group() {
    let dir = tempdir().unwrap();
    for tree in ["a", "b"] {
        write(dir.path(), &format!("{tree}/one.txt"), b"1111");
        write(dir.path(), &format!("{tree}/nested/two.txt"), b"2222");
    }

    let result = scan(dir.path(), &ScanFilters::default());

    // a ~ b, and a/nested ~ b/nested
    assert_eq!(result.directory_groups.len(), 2);
    let top = result
        .directory_groups
        .iter()
        .find(|g| g.keeper().depth == 1)
        .unwrap();
    assert!(top.keeper().path.ends_with("a"));
    assert!(top.redundant()[0].path.ends_with("b"));
    assert_eq!(top.keeper().file_count, 2);
    assert_eq!(top.keeper().size, 8);
}

#[test]
fn test_avalanche_changes_every_ancestor() {
    let dir = tempdir().unwrap();
    write(dir.path(), "x/y/z/leaf.txt", b"leaf content");
    write(dir.path(), "x/side.txt", b"side");

    let before = scan(dir.path(), &ScanFilters::default());
    write(dir.path(), "x/y/z/leaf.txt", b"leaf contenT");
    let after = scan(dir.path(), &ScanFilters::default());

    assert_eq!(before.directories.len(), after.directories.len());
    for (b, a) in before.directories.iter().zip(&after.directories) {
        assert_eq!(b.path, a.path);
        assert_ne!(b.fingerprint, a.fingerprint, "{} unchanged", b.path.display());
    }
    let side_before = before.files.iter().find(|f| f.path.ends_with("side.txt"));
    let side_after = after.files.iter().find(|f| f.path.ends_with("side.txt"));
    assert_eq!(
        side_before.unwrap().fingerprint,
        side_after.unwrap().fingerprint
    );
}

#[test]
fn test_fingerprints_deterministic_across_scans() {
    let dir = tempdir().unwrap();
    write(dir.path(), "p/q.bin", &[7u8; 200_000]);
    write(dir.path(), "p/r.bin", b"r");

    let first = scan(dir.path(), &ScanFilters::default());
    let second = scan(dir.path(), &ScanFilters::default());

    let digests = |r: &dedupe_tree::scanner::ScanResult| {
        r.directories
            .iter()
            .map(|d| (d.path.clone(), d.fingerprint))
            .collect::<Vec<_>>()
    };
    assert_eq!(digests(&first), digests(&second));
}

#[test]
fn test_min_size_excludes_small_pair() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a/small.txt", b"0123456789");
    write(dir.path(), "b/small.txt", b"0123456789");

    let filters = ScanFilters::default().with_min_size(1024);
    let result = scan(dir.path(), &filters);

    assert!(result.file_groups.is_empty());
    assert!(result.directory_groups.is_empty());
    assert_eq!(result.stats.files_filtered, 2);
}

#[test]
fn test_extension_filter_is_case_insensitive() {
    let dir = tempdir().unwrap();
    write(dir.path(), "one/DOC.TXT", b"same");
    write(dir.path(), "two/doc.txt", b"same");
    write(dir.path(), "three/doc.md", b"same");

    let filters = ScanFilters::default().with_extensions([".txt"]);
    let result = scan(dir.path(), &filters);

    assert_eq!(result.file_groups.len(), 1);
    assert_eq!(result.file_groups[0].len(), 2);
    assert!(result
        .files
        .iter()
        .all(|f| !f.path.to_string_lossy().ends_with(".md")));
}

#[test]
fn test_min_files_limits_directory_groups() {
    let dir = tempdir().unwrap();
    for tree in ["a", "b"] {
        write(dir.path(), &format!("{tree}/only.txt"), b"single");
    }

    let loose = scan(dir.path(), &ScanFilters::default());
    assert_eq!(loose.directory_groups.len(), 1);

    let strict = scan(dir.path(), &ScanFilters::default().with_min_files(2));
    assert!(strict.directory_groups.is_empty());
    // files stay eligible on their own
    assert_eq!(strict.file_groups.len(), 1);
}

#[test]
fn test_min_dir_size_limits_directory_groups() {
    let dir = tempdir().unwrap();
    for tree in ["a", "b"] {
        write(dir.path(), &format!("{tree}/data.bin"), &[1u8; 100]);
    }

    let result = scan(dir.path(), &ScanFilters::default().with_min_dir_size(101));
    assert!(result.directory_groups.is_empty());
    assert_eq!(result.file_groups.len(), 1);
}

#[test]
fn test_invalid_root_is_fatal() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing");
    let err = TreeScanner::with_defaults()
        .scan(&missing, &ScanFilters::default())
        .unwrap_err();
    assert!(matches!(err, ScanError::InvalidRoot { .. }));

    let file = dir.path().join("file.txt");
    fs::write(&file, b"x").unwrap();
    let err = TreeScanner::with_defaults()
        .scan(&file, &ScanFilters::default())
        .unwrap_err();
    assert!(matches!(err, ScanError::InvalidRoot { .. }));
}

#[test]
fn test_single_thread_matches_many_threads() {
    let dir = tempdir().unwrap();
    for i in 0..20 {
        write(dir.path(), &format!("d{}/f{}.txt", i % 4, i % 5), format!("{}", i % 3).as_bytes());
    }

    let serial = TreeScanner::new(ScanConfig::default().with_io_threads(1))
        .scan(dir.path(), &ScanFilters::default())
        .unwrap();
    let parallel = TreeScanner::new(ScanConfig::default().with_io_threads(8))
        .scan(dir.path(), &ScanFilters::default())
        .unwrap();

    assert_eq!(serial.files, parallel.files);
    assert_eq!(serial.directories, parallel.directories);
    assert_eq!(serial.file_groups, parallel.file_groups);
    assert_eq!(serial.directory_groups, parallel.directory_groups);
}

#[cfg(unix)]
#[test]
fn test_symlinked_content_breaks_coverage() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a/x.txt", b"same");
    write(dir.path(), "b/x.txt", b"same");
    std::os::unix::fs::symlink(dir.path().join("a/x.txt"), dir.path().join("b/link")).unwrap();

    let result = scan(dir.path(), &ScanFilters::default());

    assert_eq!(result.stats.symlinks_skipped, 1);
    let b = result
        .directories
        .iter()
        .find(|d| d.path.ends_with("b"))
        .unwrap();
    assert!(!b.complete);
    assert!(result.directory_groups.is_empty());
    assert_eq!(result.file_groups.len(), 1);
}
