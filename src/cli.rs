//! Command-line interface definitions for dedupe-tree.
//!
//! All arguments and options are declared with the clap derive API. There is
//! a single command: scan a tree, plan replacements, and (with `--apply`)
//! carry them out.
//!
//! # Example
//!
//! ```bash
//! # Dry run: list what would be replaced
//! dedupe-tree ~/Archive
//!
//! # Only consider Markdown and text files of at least 1 KiB
//! dedupe-tree ~/Archive --extensions .md,.txt --min-size 1KiB
//!
//! # Replace redundant copies with symlinks without prompting
//! dedupe-tree ~/Archive --apply --yes
//!
//! # JSON report for scripting
//! dedupe-tree ~/Archive --output json
//! ```

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::actions::TerminalAction;

/// Find duplicate files and directory trees and replace the deeper copies
/// with symbolic links.
///
/// Without `--apply` nothing on disk is changed; the planned replacements
/// are reported instead.
#[derive(Debug, Parser)]
#[command(name = "dedupe-tree")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Disable colored output
    #[arg(long, global = true, env = "NO_COLOR")]
    pub no_color: bool,

    /// Print fatal errors as JSON on stderr
    #[arg(long, global = true)]
    pub json_errors: bool,

    /// Root directory to deduplicate
    #[arg(value_name = "PATH")]
    pub path: PathBuf,

    /// Carry out the plan (default is a dry run)
    #[arg(long)]
    pub apply: bool,

    /// Skip the confirmation prompt in apply mode
    #[arg(short = 'y', long)]
    pub yes: bool,

    /// What to do with each redundant copy
    #[arg(long, value_enum, value_name = "ACTION")]
    pub action: Option<ActionArg>,

    /// Only consider files with these extensions (comma separated, e.g. .txt,.md)
    #[arg(short, long, value_name = "EXTS", value_delimiter = ',')]
    pub extensions: Vec<String>,

    /// Minimum file size for file deduplication (e.g., 1KB, 1MiB)
    ///
    /// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_size: Option<u64>,

    /// Minimum number of files a directory must hold to be deduplicated as a whole
    #[arg(long, value_name = "N")]
    pub min_files: Option<usize>,

    /// Minimum aggregate size for directory deduplication (e.g., 10MB)
    #[arg(long, value_name = "SIZE", value_parser = parse_size)]
    pub min_dir_size: Option<u64>,

    /// Which kinds of duplicates to act on
    #[arg(long, value_enum, value_name = "SCOPE")]
    pub scope: Option<ScopeArg>,

    /// Path to the fingerprint cache database
    ///
    /// If not specified, a default platform-specific path is used.
    #[arg(long, value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Disable fingerprint caching
    #[arg(long, conflicts_with = "cache")]
    pub no_cache: bool,

    /// Clear the fingerprint cache before scanning
    #[arg(long)]
    pub clear_cache: bool,

    /// Drop cache records for files not modified in this many days
    #[arg(long, value_name = "DAYS")]
    pub cache_cleanup_days: Option<u32>,

    /// Number of I/O threads for hashing (default: 4)
    ///
    /// Lower values reduce disk thrashing on HDDs.
    #[arg(long, value_name = "N")]
    pub io_threads: Option<usize>,

    /// Report format
    #[arg(short, long, value_enum, default_value = "text")]
    pub output: OutputFormat,

    /// Also write the rendered report to this file
    #[arg(long, value_name = "PATH")]
    pub report_file: Option<PathBuf>,

    /// Configuration file to use instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Report format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable report
    Text,
    /// Pretty-printed JSON
    Json,
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// Terminal action as accepted on the command line and in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionArg {
    /// Replace redundant copies with symbolic links
    #[default]
    Link,
    /// Delete redundant copies
    Delete,
}

impl From<ActionArg> for TerminalAction {
    fn from(arg: ActionArg) -> Self {
        match arg {
            ActionArg::Link => TerminalAction::ReplaceWithLink,
            ActionArg::Delete => TerminalAction::Delete,
        }
    }
}

/// Which duplicate kinds are planned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScopeArg {
    /// Files and directories
    #[default]
    All,
    /// Individual files only
    Files,
    /// Whole directories only
    Directories,
}

impl ScopeArg {
    /// Whether file groups take part in planning.
    #[must_use]
    pub fn includes_files(self) -> bool {
        matches!(self, Self::All | Self::Files)
    }

    /// Whether directory groups take part in planning.
    #[must_use]
    pub fn includes_directories(self) -> bool {
        matches!(self, Self::All | Self::Directories)
    }
}

/// Parse a human-readable size string into bytes.
///
/// Supports suffixes: B, KB, KiB, MB, MiB, GB, GiB, TB, TiB
/// Case-insensitive. Numbers without suffix are treated as bytes.
///
/// # Examples
///
/// ```
/// use dedupe_tree::cli::parse_size;
///
/// assert_eq!(parse_size("1024").unwrap(), 1024);
/// assert_eq!(parse_size("1KB").unwrap(), 1000);
/// assert_eq!(parse_size("1KiB").unwrap(), 1024);
/// assert_eq!(parse_size("1MB").unwrap(), 1_000_000);
/// ```
/// # Errors
///
/// Returns an error if the string is empty, contains an invalid number,
/// a negative number, or an unknown size suffix.
pub fn parse_size(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Size cannot be empty".to_string());
    }
    if s.starts_with('-') {
        return Err("Size cannot be negative".to_string());
    }

    let (num_str, suffix) = match s.find(|c: char| !c.is_ascii_digit() && c != '.') {
        Some(idx) => (&s[..idx], s[idx..].trim().to_uppercase()),
        None => (s, String::new()),
    };

    let num: f64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: '{num_str}'"))?;

    let multiplier: u64 = match suffix.as_str() {
        "" | "B" => 1,
        "KB" | "K" => 1_000,
        "KIB" => 1_024,
        "MB" | "M" => 1_000_000,
        "MIB" => 1_048_576,
        "GB" | "G" => 1_000_000_000,
        "GIB" => 1_073_741_824,
        "TB" | "T" => 1_000_000_000_000,
        "TIB" => 1_099_511_627_776,
        _ => return Err(format!("Unknown size suffix: '{suffix}'")),
    };

    Ok((num * multiplier as f64) as u64)
}
