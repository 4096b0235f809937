//! JSON report for scripting and automation.
//!
//! # Output Schema
//!
//! ```json
//! {
//!   "generated_at": "2024-05-01T12:00:00Z",
//!   "root": "/data",
//!   "directory_groups": [
//!     { "kind": "directory", "hash": "ab12...", "size": 2048,
//!       "keeper": "/data/a", "redundant": ["/data/b"] }
//!   ],
//!   "file_groups": [],
//!   "report": {
//!     "mode": "dry_run",
//!     "action": "link",
//!     "entries": [
//!       { "kind": "directory", "action": "link", "redundant_path": "/data/b",
//!         "keeper_path": "/data/a", "reclaimed_bytes": 2048 }
//!     ],
//!     "files_linked": 0, "directories_linked": 1, "entries_deleted": 0,
//!     "bytes_reclaimed": 2048, "interrupted": false
//!   },
//!   "subsumed": ["/data/b/x.txt"],
//!   "warnings": [],
//!   "summary": { "files_scanned": 4, "reclaimable_bytes": 2048, "...": "..." },
//!   "exit_code": 0,
//!   "exit_code_name": "DT000"
//! }
//! ```

use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::RunSummary;
use crate::actions::Report;
use crate::duplicates::{DuplicateGroup, GroupMember, Plan};
use crate::error::ExitCode;
use crate::scanner::{EntryKind, ScanResult, ScanWarning};

/// A duplicate group in JSON form.
#[derive(Debug, Clone, Serialize)]
pub struct JsonGroup {
    /// File or directory
    pub kind: EntryKind,
    /// SHA-256 fingerprint as 64 hex characters
    pub hash: String,
    /// Bytes held by one copy
    pub size: u64,
    /// The copy that is kept
    pub keeper: String,
    /// The other copies, in keeper order
    pub redundant: Vec<String>,
}

impl JsonGroup {
    /// Convert a duplicate group.
    #[must_use]
    pub fn from_group<E: GroupMember>(group: &DuplicateGroup<E>) -> Self {
        Self {
            kind: E::KIND,
            hash: group.hash_hex(),
            size: group.size(),
            keeper: path_string(group.keeper().path()),
            redundant: group
                .redundant()
                .iter()
                .map(|m| path_string(m.path()))
                .collect(),
        }
    }
}

/// Complete JSON output structure.
#[derive(Debug, Serialize)]
pub struct JsonOutput<'a> {
    /// When the report was produced
    pub generated_at: DateTime<Utc>,
    /// Scan root
    pub root: String,
    /// Duplicate directory groups
    pub directory_groups: Vec<JsonGroup>,
    /// Duplicate file groups
    pub file_groups: Vec<JsonGroup>,
    /// Executor results, one entry per plan entry
    pub report: &'a Report,
    /// Redundant entries covered by an enclosing directory replacement
    pub subsumed: &'a [PathBuf],
    /// Non-fatal scan problems
    pub warnings: &'a [ScanWarning],
    /// Headline numbers
    pub summary: RunSummary,
    /// The exit code number
    pub exit_code: i32,
    /// The machine-readable exit code name (e.g., "DT000")
    pub exit_code_name: String,
}

impl<'a> JsonOutput<'a> {
    /// Build the JSON report.
    #[must_use]
    pub fn new(scan: &'a ScanResult, plan: &'a Plan, report: &'a Report, exit_code: ExitCode) -> Self {
        Self {
            generated_at: Utc::now(),
            root: path_string(&scan.root),
            directory_groups: scan.directory_groups.iter().map(JsonGroup::from_group).collect(),
            file_groups: scan.file_groups.iter().map(JsonGroup::from_group).collect(),
            report,
            subsumed: &plan.subsumed,
            warnings: &scan.warnings,
            summary: RunSummary::new(scan, plan, report),
            exit_code: exit_code.as_i32(),
            exit_code_name: exit_code.code_prefix().to_string(),
        }
    }

    /// Serialize to pretty-printed JSON string.
    ///
    /// # Errors
    ///
    /// Returns an error if a path cannot be represented as a JSON string.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Write pretty JSON followed by a newline.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<(), JsonOutputError> {
        let json = self.to_json_pretty()?;
        writer.write_all(json.as_bytes())?;
        writer.write_all(b"\n")?;
        Ok(())
    }
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Errors that can occur during JSON output.
#[derive(thiserror::Error, Debug)]
pub enum JsonOutputError {
    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error during writing
    #[error("I/O error during JSON generation: {0}")]
    Io(#[from] std::io::Error),
}
