use clap::Parser;
use dedupe_tree::cli::Cli;
use dedupe_tree::error::ExitCode;
use dedupe_tree::run_app;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write(root: &Path, rel: &str, content: &[u8]) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

fn cli(args: &[&str]) -> Cli {
    let mut argv = vec!["dedupe-tree", "-q", "--no-color"];
    argv.extend_from_slice(args);
    Cli::try_parse_from(argv).unwrap()
}

#[test]
fn test_dry_run_writes_report_file() {
    let data = tempdir().unwrap();
    write(data.path(), "a/f.txt", b"same");
    write(data.path(), "b/c/f.txt", b"same");
    write(data.path(), "b/other.txt", b"other");
    let out = tempdir().unwrap();
    let report = out.path().join("report.txt");

    let code = run_app(cli(&[
        data.path().to_str().unwrap(),
        "--no-cache",
        "--report-file",
        report.to_str().unwrap(),
    ]))
    .unwrap();

    assert_eq!(code, ExitCode::Success);
    let text = fs::read_to_string(&report).unwrap();
    assert!(text.contains("Mode: dry run (link)"));
    assert!(text.contains("Would reclaim 4 bytes"));
    assert!(!text.contains('\u{1b}'));
    // nothing changed on disk
    assert!(!fs::symlink_metadata(data.path().join("b/c/f.txt"))
        .unwrap()
        .file_type()
        .is_symlink());
}

#[cfg(unix)]
#[test]
fn test_apply_with_yes_links_directory() {
    let data = tempdir().unwrap();
    let root = fs::canonicalize(data.path()).unwrap();
    write(&root, "a/x.txt", b"x");
    write(&root, "a/y.txt", b"y");
    write(&root, "deep/b/x.txt", b"x");
    write(&root, "deep/b/y.txt", b"y");
    write(&root, "deep/note.txt", b"note");

    let code = run_app(cli(&[root.to_str().unwrap(), "--no-cache", "--apply", "--yes"])).unwrap();

    assert_eq!(code, ExitCode::Success);
    assert_eq!(fs::read_link(root.join("deep/b")).unwrap(), root.join("a"));
}

#[test]
fn test_scope_files_only_ignores_directory_groups() {
    let data = tempdir().unwrap();
    let root = fs::canonicalize(data.path()).unwrap();
    write(&root, "a/x.txt", b"x");
    write(&root, "b/x.txt", b"x");
    let report = tempdir().unwrap();
    let report_path = report.path().join("report.json");

    run_app(cli(&[
        root.to_str().unwrap(),
        "--no-cache",
        "--scope",
        "files",
        "--output",
        "json",
        "--report-file",
        report_path.to_str().unwrap(),
    ]))
    .unwrap();

    let value: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&report_path).unwrap()).unwrap();
    assert!(value["directory_groups"].as_array().unwrap().is_empty());
    let entries = value["report"]["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["kind"], "file");
    assert_eq!(
        entries[0]["redundant_path"],
        root.join("b/x.txt").to_string_lossy().as_ref()
    );
}

#[test]
fn test_cache_file_created_and_reused() {
    let data = tempdir().unwrap();
    let cache_dir = tempdir().unwrap();
    let db = cache_dir.path().join("cache.db");
    write(data.path(), "one.txt", b"1");
    write(data.path(), "sub/two.txt", b"1");

    let args = [data.path().to_str().unwrap(), "--cache", db.to_str().unwrap()];
    run_app(cli(&args)).unwrap();
    assert!(db.exists());
    run_app(cli(&args)).unwrap();
}

#[test]
fn test_invalid_root_maps_to_exit_code_two() {
    let data = tempdir().unwrap();
    let missing = data.path().join("missing");

    let err = run_app(cli(&[missing.to_str().unwrap(), "--no-cache"])).unwrap_err();
    assert_eq!(ExitCode::for_error(&err), ExitCode::InvalidRoot);
}

#[test]
fn test_failed_scan_still_closes_cache() {
    let state = tempdir().unwrap();
    let cache_path = state.path().join("checksums.db");
    let missing = state.path().join("missing");

    let err = run_app(cli(&[
        missing.to_str().unwrap(),
        "--cache",
        cache_path.to_str().unwrap(),
    ]))
    .unwrap_err();

    assert_eq!(ExitCode::for_error(&err), ExitCode::InvalidRoot);
    assert!(cache_path.exists());
    // checkpointed and closed: no write-ahead log left behind
    assert!(!state.path().join("checksums.db-wal").exists());
    let cache = dedupe_tree::cache::FingerprintCache::new(&cache_path).unwrap();
    assert_eq!(cache.stats().unwrap().total_entries, 0);
}
