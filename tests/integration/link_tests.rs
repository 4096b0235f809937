use dedupe_tree::actions::{ActionKind, ExecutionMode, LinkExecutor, TerminalAction};
use dedupe_tree::duplicates::{resolve, Plan};
use dedupe_tree::scanner::{ScanFilters, TreeScanner};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn plan_for(root: &Path) -> Plan {
    let result = TreeScanner::with_defaults()
        .scan(root, &ScanFilters::default())
        .unwrap();
    resolve(&result.file_groups, &result.directory_groups)
}

/// a/ and x/b/ are identical; loose.txt duplicates a file outside both.
fn build_tree(root: &Path) {
    write(root, "a/one.txt", b"one");
    write(root, "a/sub/two.txt", b"two");
    write(root, "x/b/one.txt", b"one");
    write(root, "x/b/sub/two.txt", b"two");
    write(root, "x/other.txt", b"other");
    write(root, "y/z/other.txt", b"other");
}

#[test]
fn test_dry_run_leaves_tree_untouched() {
    let dir = tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    build_tree(&root);

    let plan = plan_for(&root);
    let report = LinkExecutor::new(ExecutionMode::DryRun, TerminalAction::ReplaceWithLink)
        .execute(&plan);

    assert_eq!(report.entries.len(), plan.len());
    assert_eq!(report.bytes_reclaimed, plan.reclaimable_bytes());
    assert!(!fs::symlink_metadata(root.join("x/b")).unwrap().file_type().is_symlink());
    assert!(!fs::symlink_metadata(root.join("y/z/other.txt"))
        .unwrap()
        .file_type()
        .is_symlink());
}

#[cfg(unix)]
#[test]
fn test_apply_matches_dry_run_plan() {
    let dir = tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    build_tree(&root);

    let plan = plan_for(&root);
    let dry = LinkExecutor::new(ExecutionMode::DryRun, TerminalAction::ReplaceWithLink)
        .execute(&plan);
    let applied = LinkExecutor::new(ExecutionMode::Apply, TerminalAction::ReplaceWithLink)
        .execute(&plan);

    let pairs = |r: &dedupe_tree::actions::Report| {
        r.entries
            .iter()
            .map(|e| (e.kind, e.action, e.redundant_path.clone(), e.keeper_path.clone()))
            .collect::<Vec<_>>()
    };
    assert_eq!(pairs(&dry), pairs(&applied));
    assert_eq!(applied.directories_linked, 1);
    assert_eq!(applied.files_linked, 1);
    assert_eq!(applied.skipped_count(), 0);
}

#[cfg(unix)]
#[test]
fn test_apply_replaces_tree_with_link() {
    let dir = tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    build_tree(&root);

    let plan = plan_for(&root);
    let report = LinkExecutor::new(ExecutionMode::Apply, TerminalAction::ReplaceWithLink)
        .execute(&plan);
    assert_eq!(report.bytes_reclaimed, 11);

    let b = root.join("x/b");
    assert!(fs::symlink_metadata(&b).unwrap().file_type().is_symlink());
    assert_eq!(fs::read_link(&b).unwrap(), root.join("a"));
    // content still reachable through the link
    assert_eq!(fs::read(b.join("sub/two.txt")).unwrap(), b"two");

    let other = root.join("y/z/other.txt");
    assert_eq!(fs::read_link(&other).unwrap(), root.join("x/other.txt"));
    assert_eq!(fs::read(&other).unwrap(), b"other");

    // no staging leftovers
    let leftovers: Vec<PathBuf> = fs::read_dir(root.join("x"))
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| p.to_string_lossy().ends_with(".tmp"))
        .collect();
    assert!(leftovers.is_empty());
}

#[cfg(unix)]
#[test]
fn test_second_run_finds_nothing() {
    let dir = tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    build_tree(&root);

    let plan = plan_for(&root);
    LinkExecutor::new(ExecutionMode::Apply, TerminalAction::ReplaceWithLink).execute(&plan);

    let again = plan_for(&root);
    assert!(again.is_empty());
}

#[test]
fn test_changed_file_is_skipped_and_others_continue() {
    let dir = tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    build_tree(&root);

    let plan = plan_for(&root);
    // grow the redundant file after planning
    fs::write(root.join("y/z/other.txt"), b"other, but longer").unwrap();

    let report = LinkExecutor::new(ExecutionMode::Apply, TerminalAction::Delete).execute(&plan);

    let skipped: Vec<_> = report.skipped().collect();
    assert_eq!(skipped.len(), 1);
    assert_eq!(skipped[0].redundant_path, root.join("y/z/other.txt"));
    assert!(skipped[0].reason.as_deref().unwrap().contains("size changed"));
    assert!(root.join("y/z/other.txt").exists());

    // the directory entry still went through
    assert_eq!(report.entries_deleted, 1);
    assert!(!root.join("x/b").exists());
}

#[test]
fn test_delete_action_removes_copies() {
    let dir = tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    build_tree(&root);

    let plan = plan_for(&root);
    let report = LinkExecutor::new(ExecutionMode::Apply, TerminalAction::Delete).execute(&plan);

    assert_eq!(report.entries_deleted, 2);
    assert!(report.entries.iter().all(|e| e.action == ActionKind::Delete));
    assert!(!root.join("x/b").exists());
    assert!(!root.join("y/z/other.txt").exists());
    assert!(root.join("a/sub/two.txt").exists());
    assert!(root.join("x/other.txt").exists());
}

#[cfg(unix)]
#[test]
fn test_apply_keeps_empty_directory_in_near_copy() {
    let dir = tempdir().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();
    write(&root, "a/f.txt", b"same");
    write(&root, "b/f.txt", b"same");
    fs::create_dir_all(root.join("b/hollow")).unwrap();

    let plan = plan_for(&root);
    assert!(plan
        .entries
        .iter()
        .all(|e| e.redundant_path != root.join("b")));

    LinkExecutor::new(ExecutionMode::Apply, TerminalAction::ReplaceWithLink).execute(&plan);

    assert!(!fs::symlink_metadata(root.join("b")).unwrap().file_type().is_symlink());
    assert!(root.join("b/hollow").is_dir());
    assert_eq!(fs::read_link(root.join("b/f.txt")).unwrap(), root.join("a/f.txt"));
}
