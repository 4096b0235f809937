//! Report rendering.
//!
//! Two formats are provided:
//! - [`text`] for people, with human-readable sizes and optional color
//! - [`json`] for scripts
//!
//! Both render the same three inputs: the [`ScanResult`], the resolved
//! [`Plan`] and the executor's [`Report`].
//!
//! # Example
//!
//! ```no_run
//! use dedupe_tree::actions::{ExecutionMode, LinkExecutor, TerminalAction};
//! use dedupe_tree::duplicates::resolve;
//! use dedupe_tree::output::TextOutput;
//! use dedupe_tree::scanner::{ScanFilters, TreeScanner};
//! use std::path::Path;
//!
//! let scan = TreeScanner::with_defaults()
//!     .scan(Path::new("."), &ScanFilters::default())
//!     .unwrap();
//! let plan = resolve(&scan.file_groups, &scan.directory_groups);
//! let report = LinkExecutor::new(ExecutionMode::DryRun, TerminalAction::ReplaceWithLink)
//!     .execute(&plan);
//!
//! print!("{}", TextOutput::new(&scan, &plan, &report).render());
//! ```

pub mod json;
pub mod text;

use bytesize::ByteSize;
use serde::Serialize;
use std::time::Duration;

use crate::actions::Report;
use crate::duplicates::Plan;
use crate::scanner::ScanResult;

pub use json::{JsonOutput, JsonOutputError};
pub use text::TextOutput;

/// Headline numbers of one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunSummary {
    /// Regular files discovered
    pub files_scanned: usize,
    /// Directories discovered, including the root
    pub directories_scanned: usize,
    /// Bytes of fingerprinted files
    pub bytes_scanned: u64,
    /// Duplicate file groups found
    pub file_groups: usize,
    /// Duplicate directory groups found
    pub directory_groups: usize,
    /// Files planned for replacement
    pub redundant_files: usize,
    /// Directories planned for replacement
    pub redundant_directories: usize,
    /// Redundant entries covered by an enclosing directory replacement
    pub subsumed: usize,
    /// Bytes the plan would reclaim
    pub reclaimable_bytes: u64,
    /// Bytes actually reclaimed (estimated in dry-run mode)
    pub bytes_reclaimed: u64,
    /// Reclaimable bytes as a share of scanned bytes
    pub savings_percent: f64,
    /// Entries that were not acted on
    pub skipped: usize,
    /// Non-fatal scan problems
    pub warnings: usize,
    /// Fingerprints served from the cache
    pub cache_hits: usize,
    /// Fingerprints computed
    pub cache_misses: usize,
    /// Scan duration in milliseconds
    pub scan_duration_ms: u64,
    /// Whether the executor was interrupted
    pub interrupted: bool,
}

impl RunSummary {
    /// Collect the summary numbers.
    #[must_use]
    pub fn new(scan: &ScanResult, plan: &Plan, report: &Report) -> Self {
        let stats = &scan.stats;
        let reclaimable_bytes = plan.reclaimable_bytes();
        Self {
            files_scanned: stats.files_seen,
            directories_scanned: stats.directories_seen,
            bytes_scanned: stats.bytes_scanned,
            file_groups: scan.file_groups.len(),
            directory_groups: scan.directory_groups.len(),
            redundant_files: plan.files().count(),
            redundant_directories: plan.directories().count(),
            subsumed: plan.subsumed.len(),
            reclaimable_bytes,
            bytes_reclaimed: report.bytes_reclaimed,
            savings_percent: savings_percent(reclaimable_bytes, stats.bytes_scanned),
            skipped: report.skipped_count(),
            warnings: scan.warnings.len(),
            cache_hits: stats.cache_hits,
            cache_misses: stats.cache_misses,
            scan_duration_ms: duration_ms(stats.duration),
            interrupted: report.interrupted,
        }
    }
}

/// Format bytes as human-readable size.
///
/// Uses IEC binary units (KiB, MiB, GiB) via the bytesize crate.
///
/// ```
/// use dedupe_tree::output::format_size;
///
/// assert_eq!(format_size(1024), "1.0 KiB");
/// ```
#[must_use]
pub fn format_size(bytes: u64) -> String {
    ByteSize::b(bytes).to_string()
}

fn savings_percent(reclaimable: u64, scanned: u64) -> f64 {
    if scanned == 0 {
        0.0
    } else {
        reclaimable as f64 / scanned as f64 * 100.0
    }
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
