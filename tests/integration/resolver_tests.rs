use dedupe_tree::duplicates::{resolve, FileGroup};
use dedupe_tree::scanner::{EntryKind, FileEntry, ScanFilters, TreeScanner};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn plan_for(root: &Path, filters: &ScanFilters) -> dedupe_tree::duplicates::Plan {
    let result = TreeScanner::with_defaults().scan(root, filters).unwrap();
    resolve(&result.file_groups, &result.directory_groups)
}

fn entry(path: &str, depth: usize) -> FileEntry {
    FileEntry::new(PathBuf::from(path), 4, SystemTime::UNIX_EPOCH, depth).with_fingerprint([9; 32])
}

#[test]
fn test_keeper_is_shallowest_member() {
    let group = FileGroup::new(
        [9; 32],
        vec![entry("/r/a/b/c", 3), entry("/r/z", 1), entry("/r/a/b", 2)],
    );
    let plan = resolve(&[group], &[]);

    assert_eq!(plan.len(), 2);
    assert!(plan
        .entries
        .iter()
        .all(|e| e.keeper_path == PathBuf::from("/r/z")));
}

#[test]
fn test_keeper_tie_broken_by_path() {
    let group = FileGroup::new([9; 32], vec![entry("/a/c/x", 2), entry("/a/b/x", 2)]);
    let plan = resolve(&[group], &[]);

    assert_eq!(plan.entries[0].keeper_path, PathBuf::from("/a/b/x"));
    assert_eq!(plan.entries[0].redundant_path, PathBuf::from("/a/c/x"));
}

#[test]
fn test_deeper_copy_linked_to_shallower_file() {
    let dir = tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    write(&root, "docs/report.txt", b"X");
    write(&root, "docs/index.md", b"docs only");
    write(&root, "backup/2023/report.txt", b"X");
    write(&root, "backup/2023/notes.txt", b"backup only");

    let plan = plan_for(&root, &ScanFilters::default());

    assert_eq!(plan.len(), 1);
    let entry = &plan.entries[0];
    assert_eq!(entry.kind, EntryKind::File);
    assert_eq!(entry.redundant_path, root.join("backup/2023/report.txt"));
    assert_eq!(entry.keeper_path, root.join("docs/report.txt"));
    assert_eq!(entry.size, 1);
}

#[test]
fn test_same_depth_copies_keep_lexicographically_first() {
    let dir = tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    write(&root, "docs/report.txt", b"X");
    write(&root, "docs/a.txt", b"a");
    write(&root, "backup/report.txt", b"X");
    write(&root, "backup/b.txt", b"b");

    let plan = plan_for(&root, &ScanFilters::default());

    assert_eq!(plan.len(), 1);
    assert_eq!(plan.entries[0].keeper_path, root.join("backup/report.txt"));
    assert_eq!(plan.entries[0].redundant_path, root.join("docs/report.txt"));
}

#[test]
fn test_identical_trees_replaced_as_a_whole() {
    let dir = tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    write(&root, "a/one.txt", b"one");
    write(&root, "a/sub/two.txt", b"two");
    write(&root, "x/b/one.txt", b"one");
    write(&root, "x/b/sub/two.txt", b"two");
    write(&root, "x/other.txt", b"keeps x distinct");

    let plan = plan_for(&root, &ScanFilters::default());

    assert_eq!(plan.len(), 1);
    let entry = &plan.entries[0];
    assert_eq!(entry.kind, EntryKind::Directory);
    assert_eq!(entry.redundant_path, root.join("x/b"));
    assert_eq!(entry.keeper_path, root.join("a"));
    assert_eq!(entry.size, 6);

    // nothing inside x/b is planned separately
    let b = root.join("x/b");
    assert!(plan
        .entries
        .iter()
        .all(|e| e.redundant_path == b || !e.redundant_path.starts_with(&b)));
    assert!(plan.subsumed.contains(&root.join("x/b/one.txt")));
    assert!(plan.subsumed.contains(&root.join("x/b/sub")));
}

#[test]
fn test_min_size_leaves_plan_empty() {
    let dir = tempdir().unwrap();
    write(dir.path(), "a/ten.txt", b"0123456789");
    write(dir.path(), "deep/er/ten.txt", b"0123456789");

    let plan = plan_for(dir.path(), &ScanFilters::default().with_min_size(1024));
    assert!(plan.is_empty());
    assert_eq!(plan.reclaimable_bytes(), 0);
}

#[test]
fn test_incomplete_directory_not_replaced() {
    let dir = tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    write(&root, "a/keep.txt", b"same");
    write(&root, "b/keep.txt", b"same");
    write(&root, "b/skipped.log", b"only in b");

    let filters = ScanFilters::default().with_extensions(["txt"]);
    let plan = plan_for(&root, &filters);

    // b would lose skipped.log if replaced by a link to a
    assert_eq!(plan.len(), 1);
    assert_eq!(plan.entries[0].kind, EntryKind::File);
    assert_eq!(plan.entries[0].redundant_path, root.join("b/keep.txt"));
}

#[test]
fn test_resolve_is_repeatable() {
    let dir = tempdir().unwrap();
    for tree in ["p", "q/r", "s/t/u"] {
        write(dir.path(), &format!("{tree}/f.txt"), b"f");
        write(dir.path(), &format!("{tree}/g/h.txt"), b"h");
    }
    write(dir.path(), "loose.txt", b"h");

    let result = TreeScanner::with_defaults()
        .scan(dir.path(), &ScanFilters::default())
        .unwrap();
    let first = resolve(&result.file_groups, &result.directory_groups);

    let mut files = result.file_groups.clone();
    let mut dirs = result.directory_groups.clone();
    files.reverse();
    dirs.reverse();
    let second = resolve(&files, &dirs);

    assert_eq!(first, second);
}
