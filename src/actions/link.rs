//! Plan execution: replace redundant copies with symbolic links.
//!
//! # Overview
//!
//! [`LinkExecutor::execute`] walks a [`Plan`] serially. In dry-run mode it
//! only reports what would happen. In apply mode every entry is verified
//! against the filesystem first, then replaced:
//!
//! - **File:** a symlink to the keeper is created under a temporary sibling
//!   name and renamed over the redundant file in one step.
//! - **Directory:** the directory is renamed to a temporary sibling, the
//!   symlink is created at the original path (the rename is rolled back if
//!   that fails), and the renamed tree is removed.
//!
//! With [`TerminalAction::Delete`] the redundant copy is removed instead.
//!
//! Entries are independent: a failure is recorded and execution moves on.
//! A shutdown request is honoured between entries, never in the middle of
//! one.
//!
//! # Example
//!
//! ```no_run
//! use dedupe_tree::actions::link::{ExecutionMode, LinkExecutor, TerminalAction};
//! use dedupe_tree::duplicates::Plan;
//!
//! let plan = Plan::default();
//! let report = LinkExecutor::new(ExecutionMode::DryRun, TerminalAction::ReplaceWithLink)
//!     .execute(&plan);
//! println!("{}", report.summary());
//! ```

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use walkdir::WalkDir;

use crate::duplicates::{Plan, PlanEntry};
use crate::progress::{ProgressCallback, PHASE_APPLY};
use crate::scanner::EntryKind;

/// Whether the executor touches the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionMode {
    /// Report only
    #[default]
    DryRun,
    /// Verify and replace
    Apply,
}

/// What happens to a redundant copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TerminalAction {
    /// Replace it with a symbolic link to the keeper
    #[default]
    #[serde(rename = "link")]
    ReplaceWithLink,
    /// Remove it
    #[serde(rename = "delete")]
    Delete,
}

impl TerminalAction {
    fn planned(self) -> ActionKind {
        match self {
            Self::ReplaceWithLink => ActionKind::Link,
            Self::Delete => ActionKind::Delete,
        }
    }
}

/// Outcome recorded for one plan entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    /// Replaced (or would be replaced) by a link
    Link,
    /// Removed (or would be removed)
    Delete,
    /// Left untouched
    Skip,
}

/// Error type for plan execution.
#[derive(Debug, Error)]
pub enum LinkError {
    /// The filesystem no longer matches what the scan recorded.
    #[error("verification failed for {path}: {reason}")]
    VerificationMismatch {
        /// The path that did not match
        path: PathBuf,
        /// What differed
        reason: String,
    },

    /// A filesystem operation failed; the entry was left as it was.
    #[error("I/O error for {path}: {source}")]
    Io {
        /// Path where the error occurred
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },

    /// The link is in place but the displaced tree could not be removed.
    #[error("could not remove displaced copy {path}: {source}")]
    Cleanup {
        /// The temporary path still holding the old tree
        path: PathBuf,
        /// The underlying I/O error
        #[source]
        source: io::Error,
    },
}

impl LinkError {
    /// Get the path associated with this error.
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Self::VerificationMismatch { path, .. }
            | Self::Io { path, .. }
            | Self::Cleanup { path, .. } => path,
        }
    }

    fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    fn mismatch(path: &Path, reason: impl Into<String>) -> Self {
        Self::VerificationMismatch {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// One line of an execution report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportEntry {
    /// File or directory
    pub kind: EntryKind,
    /// What was (or would be) done
    pub action: ActionKind,
    /// The redundant copy
    pub redundant_path: PathBuf,
    /// The retained copy
    pub keeper_path: PathBuf,
    /// Bytes reclaimed (estimated in dry-run mode)
    pub reclaimed_bytes: u64,
    /// Why the entry was skipped, or a note about a partial failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl ReportEntry {
    fn new(entry: &PlanEntry, action: ActionKind, reclaimed_bytes: u64) -> Self {
        Self {
            kind: entry.kind,
            action,
            redundant_path: entry.redundant_path.clone(),
            keeper_path: entry.keeper_path.clone(),
            reclaimed_bytes,
            reason: None,
        }
    }

    fn skipped(entry: &PlanEntry, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new(entry, ActionKind::Skip, 0)
        }
    }
}

/// Results of executing a plan.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Report {
    /// Mode the plan ran in
    pub mode: ExecutionMode,
    /// Terminal action used
    pub action: TerminalAction,
    /// One entry per plan entry, in plan order
    pub entries: Vec<ReportEntry>,
    /// Files replaced by links
    pub files_linked: usize,
    /// Directories replaced by links
    pub directories_linked: usize,
    /// Files or directories removed
    pub entries_deleted: usize,
    /// Total bytes reclaimed
    pub bytes_reclaimed: u64,
    /// True when a shutdown request stopped execution early
    pub interrupted: bool,
}

impl Report {
    fn new(mode: ExecutionMode, action: TerminalAction) -> Self {
        Self {
            mode,
            action,
            ..Self::default()
        }
    }

    fn record(&mut self, entry: ReportEntry) {
        match (entry.action, entry.kind) {
            (ActionKind::Link, EntryKind::File) => self.files_linked += 1,
            (ActionKind::Link, EntryKind::Directory) => self.directories_linked += 1,
            (ActionKind::Delete, _) => self.entries_deleted += 1,
            (ActionKind::Skip, _) => {}
        }
        self.bytes_reclaimed += entry.reclaimed_bytes;
        self.entries.push(entry);
    }

    /// Entries that were not acted on.
    pub fn skipped(&self) -> impl Iterator<Item = &ReportEntry> {
        self.entries.iter().filter(|e| e.action == ActionKind::Skip)
    }

    /// Number of entries that were not acted on.
    #[must_use]
    pub fn skipped_count(&self) -> usize {
        self.skipped().count()
    }

    /// Human-readable summary of the operation.
    #[must_use]
    pub fn summary(&self) -> String {
        let verb = match self.mode {
            ExecutionMode::DryRun => "Would reclaim",
            ExecutionMode::Apply => "Reclaimed",
        };
        let mut out = format!(
            "{} {} bytes: {} file(s) linked, {} directory(ies) linked, {} deleted",
            verb,
            self.bytes_reclaimed,
            self.files_linked,
            self.directories_linked,
            self.entries_deleted
        );
        let skipped = self.skipped_count();
        if skipped > 0 {
            out.push_str(&format!(", {skipped} skipped"));
        }
        if self.interrupted {
            out.push_str(" (interrupted)");
        }
        out
    }
}

/// Serial executor for replacement plans.
#[derive(Clone)]
pub struct LinkExecutor {
    mode: ExecutionMode,
    action: TerminalAction,
    shutdown_flag: Option<Arc<AtomicBool>>,
    progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for LinkExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinkExecutor")
            .field("mode", &self.mode)
            .field("action", &self.action)
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl LinkExecutor {
    /// Create an executor.
    #[must_use]
    pub fn new(mode: ExecutionMode, action: TerminalAction) -> Self {
        Self {
            mode,
            action,
            shutdown_flag: None,
            progress_callback: None,
        }
    }

    /// Set the shutdown flag, checked between entries.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    /// Set the progress callback.
    #[must_use]
    pub fn with_progress_callback(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress_callback = Some(callback);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Execute a plan and report every entry.
    #[must_use]
    pub fn execute(&self, plan: &Plan) -> Report {
        let mut report = Report::new(self.mode, self.action);
        let progress = self.progress_callback.as_deref();
        if let Some(callback) = progress {
            callback.on_phase_start(PHASE_APPLY, plan.len());
        }

        for (index, entry) in plan.entries.iter().enumerate() {
            if self.is_shutdown_requested() {
                log::info!(
                    "Shutdown requested, skipping {} remaining entries",
                    plan.len() - index
                );
                report.interrupted = true;
                for rest in &plan.entries[index..] {
                    report.record(ReportEntry::skipped(rest, "interrupted"));
                }
                break;
            }

            if let Some(callback) = progress {
                callback.on_progress(index + 1, entry.redundant_path.to_string_lossy().as_ref());
            }

            let line = match self.mode {
                ExecutionMode::DryRun => {
                    ReportEntry::new(entry, self.action.planned(), entry.size)
                }
                ExecutionMode::Apply => self.apply_entry(entry),
            };
            report.record(line);
        }

        if let Some(callback) = progress {
            callback.on_phase_end(PHASE_APPLY);
        }
        log::info!("{}", report.summary());
        report
    }

    fn apply_entry(&self, entry: &PlanEntry) -> ReportEntry {
        if let Err(e) = verify_entry(entry) {
            log::warn!("Skipping {}: {}", entry.redundant_path.display(), e);
            return ReportEntry::skipped(entry, e.to_string());
        }

        let result = match (self.action, entry.kind) {
            (TerminalAction::ReplaceWithLink, EntryKind::File) => replace_file(entry),
            (TerminalAction::ReplaceWithLink, EntryKind::Directory) => replace_directory(entry),
            (TerminalAction::Delete, EntryKind::File) => fs::remove_file(&entry.redundant_path)
                .map_err(|e| LinkError::io(&entry.redundant_path, e)),
            (TerminalAction::Delete, EntryKind::Directory) => {
                fs::remove_dir_all(&entry.redundant_path)
                    .map_err(|e| LinkError::io(&entry.redundant_path, e))
            }
        };

        match result {
            Ok(()) => {
                log::debug!(
                    "{} {} -> {}",
                    match self.action {
                        TerminalAction::ReplaceWithLink => "Linked",
                        TerminalAction::Delete => "Deleted",
                    },
                    entry.redundant_path.display(),
                    entry.keeper_path.display()
                );
                ReportEntry::new(entry, self.action.planned(), entry.size)
            }
            Err(e @ LinkError::Cleanup { .. }) => {
                log::warn!("{e}");
                ReportEntry {
                    reason: Some(e.to_string()),
                    ..ReportEntry::new(entry, self.action.planned(), 0)
                }
            }
            Err(e) => {
                log::warn!("Failed to replace {}: {}", entry.redundant_path.display(), e);
                ReportEntry::skipped(entry, e.to_string())
            }
        }
    }
}

/// Check that the filesystem still matches the recorded entry.
///
/// # Errors
///
/// Returns [`LinkError::VerificationMismatch`] describing the first
/// difference found.
pub fn verify_entry(entry: &PlanEntry) -> Result<(), LinkError> {
    let path = &entry.redundant_path;
    let metadata = fs::symlink_metadata(path).map_err(|e| match e.kind() {
        io::ErrorKind::NotFound => LinkError::mismatch(path, "no longer exists"),
        _ => LinkError::io(path, e),
    })?;

    if metadata.file_type().is_symlink() {
        return Err(LinkError::mismatch(path, "already a symbolic link"));
    }

    let size = match entry.kind {
        EntryKind::File if metadata.is_file() => metadata.len(),
        EntryKind::Directory if metadata.is_dir() => tree_size(path)?,
        kind => {
            return Err(LinkError::mismatch(path, format!("is no longer a {kind}")));
        }
    };
    if size != entry.size {
        return Err(LinkError::mismatch(
            path,
            format!("size changed from {} to {} bytes", entry.size, size),
        ));
    }

    if fs::metadata(&entry.keeper_path).is_err() {
        return Err(LinkError::mismatch(
            &entry.keeper_path,
            "keeper no longer exists",
        ));
    }
    Ok(())
}

/// Total size of the regular files below `path`, not following links.
///
/// # Errors
///
/// Returns [`LinkError::Io`] if part of the tree cannot be read.
pub fn tree_size(path: &Path) -> Result<u64, LinkError> {
    let mut total = 0;
    for entry in WalkDir::new(path).follow_links(false) {
        let entry = entry.map_err(|e| {
            let at = e.path().unwrap_or(path).to_path_buf();
            let source = e
                .into_io_error()
                .unwrap_or_else(|| io::Error::other("filesystem loop"));
            LinkError::Io { path: at, source }
        })?;
        if entry.file_type().is_file() {
            let metadata = entry.metadata().map_err(|e| {
                LinkError::io(
                    entry.path(),
                    e.into_io_error()
                        .unwrap_or_else(|| io::Error::other("metadata unavailable")),
                )
            })?;
            total += metadata.len();
        }
    }
    Ok(total)
}

/// A sibling path that does not exist yet, used as a staging name.
fn temp_sibling(path: &Path) -> Result<PathBuf, LinkError> {
    let parent = path
        .parent()
        .ok_or_else(|| LinkError::mismatch(path, "has no parent directory"))?;
    let name = path
        .file_name()
        .ok_or_else(|| LinkError::mismatch(path, "has no file name"))?;

    let mut staged = OsString::from(".");
    staged.push(name);
    staged.push(format!(".dedupe-tree-{}.tmp", std::process::id()));
    let candidate = parent.join(staged);

    if fs::symlink_metadata(&candidate).is_ok() {
        return Err(LinkError::io(
            &candidate,
            io::Error::new(io::ErrorKind::AlreadyExists, "staging path already exists"),
        ));
    }
    Ok(candidate)
}

fn replace_file(entry: &PlanEntry) -> Result<(), LinkError> {
    let staged = temp_sibling(&entry.redundant_path)?;
    create_symlink(&entry.keeper_path, &staged, EntryKind::File)
        .map_err(|e| LinkError::io(&staged, e))?;

    if let Err(e) = fs::rename(&staged, &entry.redundant_path) {
        let _ = fs::remove_file(&staged);
        return Err(LinkError::io(&entry.redundant_path, e));
    }
    Ok(())
}

fn replace_directory(entry: &PlanEntry) -> Result<(), LinkError> {
    let staged = temp_sibling(&entry.redundant_path)?;
    fs::rename(&entry.redundant_path, &staged)
        .map_err(|e| LinkError::io(&entry.redundant_path, e))?;

    if let Err(e) = create_symlink(&entry.keeper_path, &entry.redundant_path, EntryKind::Directory)
    {
        if let Err(rollback) = fs::rename(&staged, &entry.redundant_path) {
            log::error!(
                "Could not restore {} from {}: {}",
                entry.redundant_path.display(),
                staged.display(),
                rollback
            );
        }
        return Err(LinkError::io(&entry.redundant_path, e));
    }

    fs::remove_dir_all(&staged).map_err(|source| LinkError::Cleanup {
        path: staged,
        source,
    })
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path, _kind: EntryKind) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path, kind: EntryKind) -> io::Result<()> {
    match kind {
        EntryKind::File => std::os::windows::fs::symlink_file(target, link),
        EntryKind::Directory => std::os::windows::fs::symlink_dir(target, link),
    }
}
