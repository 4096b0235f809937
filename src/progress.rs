//! Progress reporting utilities using indicatif.
//!
//! This module provides the [`Progress`] struct which implements
//! [`ProgressCallback`] to display progress bars in the terminal while the
//! tree is walked, fingerprinted, and (in apply mode) rewritten.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

/// Phase name used while discovering the tree.
pub const PHASE_WALKING: &str = "walking";
/// Phase name used while hashing files and composing directories.
pub const PHASE_FINGERPRINT: &str = "fingerprint";
/// Phase name used while executing a plan.
pub const PHASE_APPLY: &str = "apply";

/// Progress callback for scan and execution phases.
///
/// Implement this trait to receive progress updates. Callbacks may be
/// invoked concurrently from fingerprinting workers.
pub trait ProgressCallback: Send + Sync {
    /// Called when a phase starts.
    ///
    /// # Arguments
    ///
    /// * `phase` - Name of the phase (e.g., "walking", "fingerprint", "apply")
    /// * `total` - Total number of items to process, 0 if unknown
    fn on_phase_start(&self, phase: &str, total: usize);

    /// Called for each item processed.
    ///
    /// # Arguments
    ///
    /// * `current` - Current item number (1-based)
    /// * `path` - Path being processed
    fn on_progress(&self, current: usize, path: &str);

    /// Called when an item has been processed, providing its size.
    fn on_item_completed(&self, _bytes: u64) {}

    /// Called when a phase completes.
    fn on_phase_end(&self, phase: &str);

    /// Called to update the progress message.
    fn on_message(&self, _message: &str) {}
}

/// Progress reporter using indicatif.
///
/// Holds one bar per phase; only the most recently started phase is updated.
pub struct Progress {
    multi: MultiProgress,
    walking: Mutex<Option<ProgressBar>>,
    fingerprint: Mutex<Option<ProgressBar>>,
    apply: Mutex<Option<ProgressBar>>,
    quiet: bool,
}

fn slot(bar: &Mutex<Option<ProgressBar>>) -> MutexGuard<'_, Option<ProgressBar>> {
    bar.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Progress {
    /// Create a new progress reporter.
    ///
    /// # Arguments
    ///
    /// * `quiet` - If true, nothing is drawn.
    #[must_use]
    pub fn new(quiet: bool) -> Self {
        let multi = if quiet {
            MultiProgress::with_draw_target(ProgressDrawTarget::hidden())
        } else {
            MultiProgress::new()
        };
        Self {
            multi,
            walking: Mutex::new(None),
            fingerprint: Mutex::new(None),
            apply: Mutex::new(None),
            quiet,
        }
    }

    fn walking_style() -> ProgressStyle {
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] {pos} entries {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
    }

    fn bar_style() -> ProgressStyle {
        ProgressStyle::with_template(
            "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
    }

    fn bar_for(&self, phase: &str) -> Option<&Mutex<Option<ProgressBar>>> {
        match phase {
            PHASE_WALKING => Some(&self.walking),
            PHASE_FINGERPRINT => Some(&self.fingerprint),
            PHASE_APPLY => Some(&self.apply),
            _ => None,
        }
    }

    /// The bar of the latest active phase.
    fn active(&self) -> Option<ProgressBar> {
        [&self.apply, &self.fingerprint, &self.walking]
            .into_iter()
            .find_map(|bar| slot(bar).clone())
    }
}

impl ProgressCallback for Progress {
    fn on_phase_start(&self, phase: &str, total: usize) {
        if self.quiet {
            return;
        }

        let pb = if phase == PHASE_WALKING {
            let pb = self.multi.add(ProgressBar::new_spinner());
            pb.set_style(Self::walking_style());
            pb.set_message("Walking tree");
            pb.enable_steady_tick(Duration::from_millis(100));
            pb
        } else {
            let pb = self.multi.add(ProgressBar::new(total as u64));
            pb.set_style(Self::bar_style());
            pb.set_message(match phase {
                PHASE_FINGERPRINT => "Fingerprinting".to_string(),
                PHASE_APPLY => "Applying plan".to_string(),
                other => other.to_string(),
            });
            pb
        };

        if let Some(bar) = self.bar_for(phase) {
            *slot(bar) = Some(pb);
        }
    }

    fn on_progress(&self, current: usize, path: &str) {
        if self.quiet {
            return;
        }

        if let Some(pb) = self.active() {
            pb.set_position(current as u64);
            pb.set_message(truncate_path(path, 30));
        }
    }

    fn on_phase_end(&self, phase: &str) {
        if self.quiet {
            return;
        }

        let done = match phase {
            PHASE_WALKING => "Walking complete",
            PHASE_FINGERPRINT => "Fingerprinting complete",
            PHASE_APPLY => "Plan applied",
            _ => return,
        };
        if let Some(pb) = self.bar_for(phase).and_then(|bar| slot(bar).take()) {
            pb.finish_with_message(done);
        }
    }

    fn on_message(&self, message: &str) {
        if self.quiet {
            return;
        }

        if let Some(pb) = self.active() {
            pb.set_message(message.to_string());
        }
    }
}

/// Truncate a path for display in the progress bar.
fn truncate_path(path: &str, max_len: usize) -> String {
    if path.chars().count() <= max_len {
        return path.to_string();
    }

    let file_name = std::path::Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();

    let name_len = file_name.chars().count();
    if name_len >= max_len {
        let tail: String = file_name
            .chars()
            .skip(name_len + 3 - max_len)
            .collect();
        return format!("...{tail}");
    }

    format!(".../{file_name}")
}
