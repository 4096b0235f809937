//! dedupe-tree - duplicate file and directory tree deduplication
//!
//! Scans a directory tree, fingerprints every file and directory with
//! SHA-256 (bottom-up, in parallel), groups identical content, and replaces
//! the deeper copies with symbolic links to the shallowest one.
//!
//! The pipeline is [`scanner`] → [`duplicates`] → [`actions`], with the
//! persistent fingerprint [`cache`] injected into the scanner.

pub mod actions;
pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod duplicates;
pub mod error;
pub mod logging;
pub mod output;
pub mod progress;
pub mod scanner;
pub mod signal;

pub use app::run_app;
