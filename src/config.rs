//! Application configuration management.
//!
//! Settings are layered with `figment`, later layers winning:
//!
//! 1. built-in defaults
//! 2. `config.toml` in the platform config directory (or `--config PATH`)
//! 3. `DEDUPE_TREE_*` environment variables
//! 4. command-line flags ([`Config::merge_cli`])
//!
//! ```toml
//! io_threads = 8
//! min_size = 1024
//! extensions = ["txt", "md"]
//! action = "link"
//! scope = "all"
//! ```

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cli::{ActionArg, Cli, ScopeArg};
use crate::scanner::walker::DEFAULT_IO_THREADS;
use crate::scanner::ScanFilters;

/// Environment variable prefix, e.g. `DEDUPE_TREE_IO_THREADS=8`.
pub const ENV_PREFIX: &str = "DEDUPE_TREE_";

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Worker threads for fingerprinting
    pub io_threads: usize,
    /// Minimum file size for file deduplication
    pub min_size: u64,
    /// Minimum recursive file count for directory deduplication
    pub min_files: usize,
    /// Minimum aggregate size for directory deduplication
    pub min_dir_size: u64,
    /// Extension allow-list; empty allows every file
    pub extensions: Vec<String>,
    /// Cache database location; `None` uses the platform default
    pub cache_path: Option<PathBuf>,
    /// Whether the fingerprint cache is used at all
    pub use_cache: bool,
    /// What happens to redundant copies in apply mode
    pub action: ActionArg,
    /// Which duplicate kinds are planned
    pub scope: ScopeArg,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            io_threads: DEFAULT_IO_THREADS,
            min_size: 0,
            min_files: 0,
            min_dir_size: 0,
            extensions: Vec::new(),
            cache_path: None,
            use_cache: true,
            action: ActionArg::Link,
            scope: ScopeArg::All,
        }
    }
}

impl Config {
    /// Load defaults, the config file and the environment.
    ///
    /// `explicit` replaces the default config file location. Any failure
    /// falls back to the defaults.
    #[must_use]
    pub fn load(explicit: Option<&Path>) -> Self {
        match Self::load_internal(explicit) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {e:#}");
                Self::default()
            }
        }
    }

    fn load_internal(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => {
                if !path.exists() {
                    log::warn!("Config file {} does not exist", path.display());
                }
                Some(path.to_path_buf())
            }
            None => Self::config_path(),
        };

        let config: Self = Self::figment(path.as_deref())
            .extract()
            .context("invalid configuration")?;
        log::debug!("Configuration loaded: {config:?}");
        Ok(config)
    }

    /// The layered figment without CLI flags.
    #[must_use]
    pub fn figment(config_file: Option<&Path>) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));
        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX))
    }

    /// Default platform-specific configuration file path.
    #[must_use]
    pub fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "dedupe-tree").map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Overlay the flags the user actually passed.
    #[must_use]
    pub fn merge_cli(mut self, cli: &Cli) -> Self {
        if let Some(io_threads) = cli.io_threads {
            self.io_threads = io_threads;
        }
        if let Some(min_size) = cli.min_size {
            self.min_size = min_size;
        }
        if let Some(min_files) = cli.min_files {
            self.min_files = min_files;
        }
        if let Some(min_dir_size) = cli.min_dir_size {
            self.min_dir_size = min_dir_size;
        }
        if !cli.extensions.is_empty() {
            self.extensions.clone_from(&cli.extensions);
        }
        if let Some(cache) = &cli.cache {
            self.cache_path = Some(cache.clone());
        }
        if cli.no_cache {
            self.use_cache = false;
        }
        if let Some(action) = cli.action {
            self.action = action;
        }
        if let Some(scope) = cli.scope {
            self.scope = scope;
        }
        self.io_threads = self.io_threads.max(1);
        self
    }

    /// Scan filters described by this configuration.
    #[must_use]
    pub fn scan_filters(&self) -> ScanFilters {
        ScanFilters::default()
            .with_extensions(&self.extensions)
            .with_min_size(self.min_size)
            .with_min_files(self.min_files)
            .with_min_dir_size(self.min_dir_size)
    }
}
