//! Ctrl+C handling.
//!
//! A single [`ShutdownHandler`] owns an `Arc<AtomicBool>` that the `ctrlc`
//! hook sets on interrupt. The flag is handed to the hasher (checked between
//! chunks), the scanner (checked between jobs) and the link executor
//! (checked between plan entries), so an interrupted run never leaves an
//! entry half-replaced.
//!
//! ```rust,no_run
//! use dedupe_tree::signal::install_handler;
//!
//! let handler = install_handler().expect("signal handler");
//! let flag = handler.get_flag();
//! // pass `flag` to ScanConfig / LinkExecutor
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

/// Exit code for an interrupted run (128 + SIGINT).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Shared shutdown flag.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether Ctrl+C was pressed or [`request_shutdown`](Self::request_shutdown) called.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Set the flag by hand.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// A clone of the flag for workers.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Clear the flag.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// The Ctrl+C hook could not be registered.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install the process-wide Ctrl+C hook and return its handler.
///
/// The hook can only be registered once per process. Later calls (for
/// example from several `run_app` invocations in one test binary) get the
/// same handler back with its flag cleared.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if `ctrlc` refuses the hook for a
/// reason other than one already being registered.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();
    let installed = ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
        let mut stderr = std::io::stderr();
        let _ = writeln!(stderr, "\nInterrupted. Finishing the current entry...");
        let _ = stderr.flush();
        log::info!("Shutdown signal received");
    });

    match installed {
        Ok(()) => Ok(GLOBAL_HANDLER.get_or_init(|| handler).clone()),
        Err(ctrlc::Error::MultipleHandlers) => {
            log::debug!("Ctrl+C handler already registered, using an unhooked handler");
            Ok(GLOBAL_HANDLER.get_or_init(ShutdownHandler::new).clone())
        }
        Err(e) => Err(SignalError::InstallFailed(e)),
    }
}

/// A handler with no signal hook, for tests and embedding.
#[must_use]
pub fn create_handler() -> ShutdownHandler {
    ShutdownHandler::new()
}
