use clap::Parser;
use dedupe_tree::cli::{ActionArg, Cli, ScopeArg};
use dedupe_tree::config::Config;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use std::fs;
use std::path::PathBuf;
use tempfile::tempdir;

#[test]
fn test_config_load_defaults() {
    // figment without Env, so other tests' variables cannot interfere
    let figment = Figment::from(Serialized::defaults(Config::default()));
    let config: Config = figment.extract().unwrap();
    assert_eq!(config, Config::default());
    assert_eq!(config.io_threads, 4);
    assert_eq!(config.action, ActionArg::Link);
}

#[test]
fn test_config_load_from_toml() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(
        &config_path,
        r#"
io_threads = 8
min_size = 4096
min_dir_size = 65536
extensions = ["txt", ".MD"]
cache_path = "/var/cache/dt.db"
use_cache = false
scope = "directories"
"#,
    )
    .unwrap();

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract()
        .unwrap();

    assert_eq!(config.io_threads, 8);
    assert_eq!(config.min_size, 4096);
    assert_eq!(config.min_dir_size, 65536);
    assert_eq!(config.extensions, vec!["txt", ".MD"]);
    assert_eq!(config.cache_path, Some(PathBuf::from("/var/cache/dt.db")));
    assert!(!config.use_cache);
    assert_eq!(config.scope, ScopeArg::Directories);
    // keys missing from the file keep their defaults
    assert_eq!(config.min_files, 0);

    let filters = config.scan_filters();
    assert!(filters.extensions.contains("md"));
}

#[test]
fn test_config_load_from_env() {
    std::env::set_var("DEDUPE_TREE_MIN_FILES", "3");
    std::env::set_var("DEDUPE_TREE_ACTION", "delete");

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Env::prefixed("DEDUPE_TREE_"))
        .extract()
        .unwrap();

    assert_eq!(config.min_files, 3);
    assert_eq!(config.action, ActionArg::Delete);

    std::env::remove_var("DEDUPE_TREE_MIN_FILES");
    std::env::remove_var("DEDUPE_TREE_ACTION");
}

#[test]
fn test_cli_flags_override_file() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "min_size = 4096\nscope = \"files\"\n").unwrap();

    let cli = Cli::try_parse_from([
        "dedupe-tree",
        "/data",
        "--config",
        config_path.to_str().unwrap(),
        "--min-size",
        "1KiB",
    ])
    .unwrap();
    let config = Config::load(cli.config.as_deref()).merge_cli(&cli);

    assert_eq!(config.min_size, 1024);
    assert_eq!(config.scope, ScopeArg::Files);
}

#[test]
fn test_config_invalid_toml_fallback() {
    let temp_dir = tempdir().unwrap();
    let config_path = temp_dir.path().join("config.toml");
    fs::write(&config_path, "invalid = toml").unwrap();

    let result: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(&config_path))
        .extract();
    assert!(result.is_err());

    let loaded = Config::load(Some(&config_path));
    assert_eq!(loaded.min_size, Config::default().min_size);
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let temp_dir = tempdir().unwrap();
    let config = Config::load(Some(&temp_dir.path().join("absent.toml")));
    assert_eq!(config.scope, ScopeArg::All);
    assert!(config.use_cache);
}
