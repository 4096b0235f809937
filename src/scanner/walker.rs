//! Tree discovery and bottom-up fingerprinting.
//!
//! # Overview
//!
//! [`TreeScanner::scan`] works in two passes:
//!
//! 1. **Discovery.** A single sorted, non-following [`walkdir`] traversal
//!    builds an arena of nodes. Each node knows its parent, and each
//!    directory knows its children. Filters are applied here: excluded
//!    files never enter the arena, but they mark their parent directory as
//!    incompletely covered.
//! 2. **Fingerprinting.** Leaves (files and empty directories) are seeded
//!    into a bounded rayon pool. Each directory carries an atomic count of
//!    unfinished children; the worker that finishes the last child spawns
//!    the directory's composition job in the same scope, so every directory
//!    is hashed exactly once, after all of its children.
//!
//! Symbolic links are never followed or fingerprinted. Unreadable entries
//! become [`ScanWarning`]s and never abort the scan.
//!
//! # Example
//!
//! ```no_run
//! use dedupe_tree::scanner::{ScanConfig, ScanFilters, TreeScanner};
//! use std::path::Path;
//!
//! let scanner = TreeScanner::new(ScanConfig::default().with_io_threads(8));
//! let result = scanner
//!     .scan(Path::new("/home/user/Documents"), &ScanFilters::default())
//!     .unwrap();
//! println!(
//!     "{} duplicate directory groups",
//!     result.directory_groups.len()
//! );
//! ```

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::time::{Instant, SystemTime};

use walkdir::WalkDir;

use super::hasher::{ChildFingerprint, Hasher};
use super::{
    Digest, DirectoryEntry, EntryKind, FileEntry, FingerprintState, HashError, ScanError,
    ScanFilters, ScanResult, ScanStats, ScanWarning,
};
use crate::cache::{CacheEntry, FingerprintCache};
use crate::duplicates::group_by_fingerprint;
use crate::progress::{ProgressCallback, PHASE_FINGERPRINT, PHASE_WALKING};

/// Default number of hashing threads.
///
/// Kept low so that spinning disks are not thrashed by parallel reads.
pub const DEFAULT_IO_THREADS: usize = 4;

/// Runtime configuration for a scan.
#[derive(Clone)]
pub struct ScanConfig {
    /// Number of threads used for fingerprinting
    pub io_threads: usize,
    /// Optional fingerprint cache for faster rescans
    pub cache: Option<Arc<FingerprintCache>>,
    /// Optional shutdown flag for graceful termination
    pub shutdown_flag: Option<Arc<AtomicBool>>,
    /// Optional progress callback
    pub progress_callback: Option<Arc<dyn ProgressCallback>>,
}

impl std::fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanConfig")
            .field("io_threads", &self.io_threads)
            .field("cache", &self.cache.as_ref().map(|_| "<cache>"))
            .field("shutdown_flag", &self.shutdown_flag)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<callback>"),
            )
            .finish()
    }
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            io_threads: DEFAULT_IO_THREADS,
            cache: None,
            shutdown_flag: None,
            progress_callback: None,
        }
    }
}

impl ScanConfig {
    /// Set the number of fingerprinting threads (at least one).
    #[must_use]
    pub fn with_io_threads(mut self, threads: usize) -> Self {
        self.io_threads = threads.max(1);
        self
    }

    /// Set the fingerprint cache.
    #[must_use]
    pub fn with_cache(mut self, cache: Arc<FingerprintCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Set the shutdown flag.
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
}

#[derive(Debug)]
enum NodeKind {
    File {
        size: u64,
        modified: SystemTime,
    },
    Directory {
        children: Vec<usize>,
        /// Something below this directory was skipped during discovery
        incomplete: bool,
    },
}

#[derive(Debug)]
struct Node {
    path: PathBuf,
    name: OsString,
    depth: usize,
    parent: Option<usize>,
    kind: NodeKind,
}

#[derive(Debug, Clone, Copy)]
struct DirSummary {
    fingerprint: Option<Digest>,
    file_count: usize,
    size: u64,
    complete: bool,
}

#[derive(Debug, Clone, Copy)]
enum NodeOutcome {
    /// `None` when the file could not be fingerprinted
    File(Option<Digest>),
    Directory(DirSummary),
}

/// Shared state of the fingerprint pass.
struct ScanContext<'a> {
    nodes: &'a [Node],
    pending: Vec<AtomicUsize>,
    outcomes: Vec<OnceLock<NodeOutcome>>,
    hasher: Hasher,
    cache: Option<&'a FingerprintCache>,
    shutdown_flag: Option<&'a AtomicBool>,
    progress: Option<&'a dyn ProgressCallback>,
    files_done: AtomicUsize,
    cache_hits: AtomicUsize,
    cache_misses: AtomicUsize,
    warnings: Mutex<Vec<ScanWarning>>,
}

impl ScanContext<'_> {
    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    fn warn(&self, path: &Path, message: String) {
        log::warn!("{}: {}", path.display(), message);
        if let Ok(mut warnings) = self.warnings.lock() {
            warnings.push(ScanWarning::new(path, message));
        }
    }
}

/// Scanner producing fingerprints and duplicate groups for a tree.
#[derive(Debug, Clone, Default)]
pub struct TreeScanner {
    config: ScanConfig,
}

impl TreeScanner {
    /// Create a scanner with the given configuration.
    #[must_use]
    pub fn new(config: ScanConfig) -> Self {
        Self { config }
    }

    /// Create a scanner with default configuration and no cache.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::default()
    }

    /// The scanner's configuration.
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    fn is_shutdown_requested(&self) -> bool {
        self.config
            .shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Scan a tree.
    ///
    /// # Errors
    ///
    /// Returns [`ScanError::InvalidRoot`] if `root` is missing or not a
    /// directory, [`ScanError::Interrupted`] if a shutdown was requested, or
    /// [`ScanError::ThreadPool`] if the worker pool cannot be started.
    /// Problems with individual entries are reported as warnings instead.
    pub fn scan(&self, root: &Path, filters: &ScanFilters) -> Result<ScanResult, ScanError> {
        let started = Instant::now();
        let root = validate_root(root)?;
        log::info!("Scanning {}", root.display());

        let mut stats = ScanStats::default();
        let mut warnings = Vec::new();
        let nodes = self.discover(&root, filters, &mut stats, &mut warnings)?;
        log::debug!(
            "Discovered {} files and {} directories",
            nodes.iter().filter(|n| matches!(n.kind, NodeKind::File { .. })).count(),
            stats.directories_seen
        );

        let ctx = self.fingerprint(&nodes)?;
        if self.is_shutdown_requested() {
            return Err(ScanError::Interrupted);
        }

        stats.cache_hits = ctx.cache_hits.load(Ordering::Relaxed);
        stats.cache_misses = ctx.cache_misses.load(Ordering::Relaxed);
        warnings.extend(ctx.warnings.into_inner().unwrap_or_default());

        let (files, directories) = collect_entries(&nodes, &ctx.outcomes, &mut stats);

        let file_groups = group_by_fingerprint(
            files
                .iter()
                .filter(|f| f.size > 0 && f.fingerprint.is_fingerprinted())
                .cloned(),
        );
        let directory_groups = group_by_fingerprint(
            directories
                .iter()
                .filter(|d| d.depth > 0 && d.size > 0 && filters.accepts_directory(d))
                .cloned(),
        );

        stats.duration = started.elapsed();
        log::info!(
            "Scanned {} files in {} directories: {} file groups, {} directory groups ({} cache hits)",
            stats.files_seen,
            stats.directories_seen,
            file_groups.len(),
            directory_groups.len(),
            stats.cache_hits
        );

        Ok(ScanResult {
            root,
            files,
            directories,
            file_groups,
            directory_groups,
            warnings,
            stats,
        })
    }

    /// Walk the tree once and build the node arena in pre-order.
    fn discover(
        &self,
        root: &Path,
        filters: &ScanFilters,
        stats: &mut ScanStats,
        warnings: &mut Vec<ScanWarning>,
    ) -> Result<Vec<Node>, ScanError> {
        let mut nodes: Vec<Node> = Vec::new();
        // dir_stack[d] is the directory node currently open at depth d
        let mut dir_stack: Vec<usize> = Vec::new();
        let mut dir_index: HashMap<PathBuf, usize> = HashMap::new();

        let progress = self.config.progress_callback.as_deref();
        if let Some(callback) = progress {
            callback.on_phase_start(PHASE_WALKING, 0);
        }

        let walker = WalkDir::new(root).follow_links(false).sort_by_file_name();
        for entry_result in walker {
            if self.is_shutdown_requested() {
                log::debug!("Scanner: Shutdown requested, stopping discovery");
                return Err(ScanError::Interrupted);
            }

            let entry = match entry_result {
                Ok(entry) => entry,
                Err(e) => {
                    let path = e.path().map_or_else(|| root.to_path_buf(), Path::to_path_buf);
                    let target = dir_index
                        .get(&path)
                        .or_else(|| path.parent().and_then(|p| dir_index.get(p)))
                        .copied();
                    if let Some(idx) = target {
                        mark_incomplete(&mut nodes, idx);
                    }
                    log::warn!("Walker error for {}: {}", path.display(), e);
                    warnings.push(ScanWarning::new(path, describe_walk_error(&e)));
                    continue;
                }
            };

            let depth = entry.depth();
            dir_stack.truncate(depth);
            let parent = depth.checked_sub(1).and_then(|d| dir_stack.get(d)).copied();
            let path = entry.path().to_path_buf();
            let file_type = entry.file_type();

            if let Some(callback) = progress {
                callback.on_progress(nodes.len() + 1, path.to_string_lossy().as_ref());
            }

            if file_type.is_symlink() {
                log::trace!("Skipping symlink: {}", path.display());
                stats.symlinks_skipped += 1;
                if let Some(p) = parent {
                    mark_incomplete(&mut nodes, p);
                }
                continue;
            }

            if file_type.is_dir() {
                stats.directories_seen += 1;
                let idx = push_node(
                    &mut nodes,
                    Node {
                        name: entry.file_name().to_os_string(),
                        path: path.clone(),
                        depth,
                        parent,
                        kind: NodeKind::Directory {
                            children: Vec::new(),
                            incomplete: false,
                        },
                    },
                );
                dir_index.insert(path, idx);
                dir_stack.push(idx);
                continue;
            }

            if !file_type.is_file() {
                log::debug!("Skipping special file: {}", path.display());
                stats.special_skipped += 1;
                if let Some(p) = parent {
                    mark_incomplete(&mut nodes, p);
                }
                continue;
            }

            stats.files_seen += 1;
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    log::warn!("Cannot read metadata for {}: {}", path.display(), e);
                    stats.files_failed += 1;
                    if let Some(p) = parent {
                        mark_incomplete(&mut nodes, p);
                    }
                    warnings.push(ScanWarning::new(path, describe_walk_error(&e)));
                    continue;
                }
            };

            let size = metadata.len();
            if !filters.accepts_file(&path, size) {
                log::trace!("Skipping file due to filters ({size}): {}", path.display());
                stats.files_filtered += 1;
                if let Some(p) = parent {
                    mark_incomplete(&mut nodes, p);
                }
                continue;
            }

            let modified = metadata.modified().unwrap_or(SystemTime::UNIX_EPOCH);
            push_node(
                &mut nodes,
                Node {
                    name: entry.file_name().to_os_string(),
                    path,
                    depth,
                    parent,
                    kind: NodeKind::File { size, modified },
                },
            );
        }

        if let Some(callback) = progress {
            callback.on_phase_end(PHASE_WALKING);
        }
        Ok(nodes)
    }

    /// Run the bottom-up fingerprint pass over the arena.
    fn fingerprint<'a>(&'a self, nodes: &'a [Node]) -> Result<ScanContext<'a>, ScanError> {
        let pending = nodes
            .iter()
            .map(|n| match &n.kind {
                NodeKind::Directory { children, .. } => AtomicUsize::new(children.len()),
                NodeKind::File { .. } => AtomicUsize::new(0),
            })
            .collect();

        let mut hasher = Hasher::new();
        if let Some(flag) = &self.config.shutdown_flag {
            hasher = hasher.with_shutdown_flag(Arc::clone(flag));
        }

        let ctx = ScanContext {
            nodes,
            pending,
            outcomes: nodes.iter().map(|_| OnceLock::new()).collect(),
            hasher,
            cache: self
                .config
                .cache
                .as_deref()
                .filter(|c| c.is_enabled()),
            shutdown_flag: self.config.shutdown_flag.as_deref(),
            progress: self.config.progress_callback.as_deref(),
            files_done: AtomicUsize::new(0),
            cache_hits: AtomicUsize::new(0),
            cache_misses: AtomicUsize::new(0),
            warnings: Mutex::new(Vec::new()),
        };

        let seeds: Vec<usize> = nodes
            .iter()
            .enumerate()
            .filter(|(_, n)| match &n.kind {
                NodeKind::File { .. } => true,
                NodeKind::Directory { children, .. } => children.is_empty(),
            })
            .map(|(i, _)| i)
            .collect();
        let file_total = nodes
            .iter()
            .filter(|n| matches!(n.kind, NodeKind::File { .. }))
            .count();

        if let Some(callback) = ctx.progress {
            callback.on_phase_start(PHASE_FINGERPRINT, file_total);
        }

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.io_threads.max(1))
            .build()
            .map_err(|e| ScanError::ThreadPool(e.to_string()))?;

        let ctx_ref = &ctx;
        pool.install(|| {
            rayon::scope(|scope| {
                for idx in seeds {
                    scope.spawn(move |s| process_node(s, ctx_ref, idx));
                }
            });
        });

        if let Some(callback) = ctx.progress {
            callback.on_phase_end(PHASE_FINGERPRINT);
        }
        Ok(ctx)
    }
}

/// Compute one node, then release its parent if this was the last child.
fn process_node<'s>(scope: &rayon::Scope<'s>, ctx: &'s ScanContext<'s>, idx: usize) {
    let node = &ctx.nodes[idx];
    let outcome = match &node.kind {
        NodeKind::File { size, modified } => {
            NodeOutcome::File(fingerprint_file(ctx, node, *size, *modified))
        }
        NodeKind::Directory {
            children,
            incomplete,
        } => NodeOutcome::Directory(compose_directory(ctx, children, *incomplete)),
    };
    let _ = ctx.outcomes[idx].set(outcome);

    if let Some(parent) = node.parent {
        if ctx.pending[parent].fetch_sub(1, Ordering::AcqRel) == 1 {
            scope.spawn(move |s| process_node(s, ctx, parent));
        }
    }
}

fn fingerprint_file(
    ctx: &ScanContext<'_>,
    node: &Node,
    size: u64,
    modified: SystemTime,
) -> Option<Digest> {
    if ctx.is_shutdown_requested() {
        return None;
    }

    let done = ctx.files_done.fetch_add(1, Ordering::Relaxed) + 1;
    if let Some(callback) = ctx.progress {
        callback.on_progress(done, node.path.to_string_lossy().as_ref());
    }

    if let Some(cache) = ctx.cache {
        match cache.lookup(&node.path, size, modified) {
            Ok(Some(digest)) => {
                log::trace!("Fingerprint cache hit: {}", node.path.display());
                ctx.cache_hits.fetch_add(1, Ordering::Relaxed);
                if let Some(callback) = ctx.progress {
                    callback.on_item_completed(size);
                }
                return Some(digest);
            }
            Ok(None) => {
                log::trace!("Fingerprint cache miss: {}", node.path.display());
            }
            Err(e) => {
                log::warn!("Failed to query cache for {}: {}", node.path.display(), e);
            }
        }
        ctx.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    let result = match ctx.hasher.hash_file(&node.path) {
        Ok(digest) => {
            if let Some(cache) = ctx.cache {
                let entry = CacheEntry::new(node.path.clone(), size, modified);
                if let Err(e) = cache.store(&entry, digest) {
                    log::warn!("Failed to update cache for {}: {}", node.path.display(), e);
                }
            }
            Some(digest)
        }
        Err(HashError::Interrupted(_)) => None,
        Err(e) => {
            ctx.warn(&node.path, e.to_string());
            None
        }
    };

    if let Some(callback) = ctx.progress {
        callback.on_item_completed(size);
    }
    result
}

fn compose_directory(ctx: &ScanContext<'_>, children: &[usize], incomplete: bool) -> DirSummary {
    let mut records = Vec::with_capacity(children.len());
    let mut summary = DirSummary {
        fingerprint: None,
        file_count: 0,
        size: 0,
        complete: !incomplete,
    };

    for &child in children {
        let node = &ctx.nodes[child];
        match ctx.outcomes[child].get() {
            Some(NodeOutcome::File(Some(digest))) => {
                if let NodeKind::File { size, .. } = node.kind {
                    summary.size += size;
                }
                summary.file_count += 1;
                records.push(ChildFingerprint::new(
                    node.name.clone(),
                    EntryKind::File,
                    *digest,
                ));
            }
            Some(NodeOutcome::Directory(sub)) => {
                summary.complete &= sub.complete;
                summary.file_count += sub.file_count;
                summary.size += sub.size;
                // an empty child still changes the parent's structure
                let digest = sub.fingerprint.unwrap_or_else(Hasher::empty_directory_marker);
                records.push(ChildFingerprint::new(
                    node.name.clone(),
                    EntryKind::Directory,
                    digest,
                ));
            }
            Some(NodeOutcome::File(None)) | None => summary.complete = false,
        }
    }

    summary.fingerprint = Hasher::fingerprint_directory(&records);
    summary
}

/// Turn the arena and its outcomes into entry lists, updating counters.
fn collect_entries(
    nodes: &[Node],
    outcomes: &[OnceLock<NodeOutcome>],
    stats: &mut ScanStats,
) -> (Vec<FileEntry>, Vec<DirectoryEntry>) {
    let mut files = Vec::new();
    let mut directories = Vec::new();

    for (node, outcome) in nodes.iter().zip(outcomes) {
        match (&node.kind, outcome.get()) {
            (NodeKind::File { size, modified }, outcome) => {
                let mut file = FileEntry::new(node.path.clone(), *size, *modified, node.depth);
                if let Some(NodeOutcome::File(Some(digest))) = outcome {
                    file = file.with_fingerprint(*digest);
                    stats.files_fingerprinted += 1;
                    stats.bytes_scanned += size;
                } else {
                    stats.files_failed += 1;
                }
                files.push(file);
            }
            (NodeKind::Directory { .. }, outcome) => {
                let mut dir = DirectoryEntry::new(node.path.clone(), node.depth);
                match outcome {
                    Some(NodeOutcome::Directory(summary)) => {
                        dir.fingerprint = FingerprintState::from(summary.fingerprint);
                        dir.file_count = summary.file_count;
                        dir.size = summary.size;
                        dir.complete = summary.complete;
                    }
                    _ => dir.complete = false,
                }
                directories.push(dir);
            }
        }
    }

    (files, directories)
}

fn push_node(nodes: &mut Vec<Node>, node: Node) -> usize {
    let idx = nodes.len();
    if let Some(parent) = node.parent {
        if let NodeKind::Directory { children, .. } = &mut nodes[parent].kind {
            children.push(idx);
        }
    }
    nodes.push(node);
    idx
}

fn mark_incomplete(nodes: &mut [Node], idx: usize) {
    if let NodeKind::Directory { incomplete, .. } = &mut nodes[idx].kind {
        *incomplete = true;
    }
}

fn describe_walk_error(error: &walkdir::Error) -> String {
    match error.io_error().map(std::io::Error::kind) {
        Some(std::io::ErrorKind::PermissionDenied) => "permission denied".to_string(),
        Some(std::io::ErrorKind::NotFound) => "vanished during scan".to_string(),
        _ => error.to_string(),
    }
}

/// Check that the root is an existing, listable directory and canonicalize it.
fn validate_root(root: &Path) -> Result<PathBuf, ScanError> {
    let invalid = |reason: String| ScanError::InvalidRoot {
        path: root.to_path_buf(),
        reason,
    };

    let metadata = std::fs::metadata(root).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => invalid("path does not exist".to_string()),
        _ => invalid(e.to_string()),
    })?;
    if !metadata.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    std::fs::read_dir(root).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => invalid("permission denied".to_string()),
        _ => invalid(e.to_string()),
    })?;

    std::fs::canonicalize(root).map_err(|source| ScanError::Io {
        path: root.to_path_buf(),
        source,
    })
}
