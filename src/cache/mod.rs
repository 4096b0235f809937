//! Fingerprint caching module.
//!
//! This module provides persistent storage for file fingerprints so that
//! unchanged files are not re-read on later scans.
//!
//! # Architecture
//!
//! The caching system is split into two main components:
//!
//! * [`database`]: SQLite persistence, schema versioning, and corruption recovery.
//! * [`entry`]: The cache key and its on-disk encoding.
//!
//! # Cache Invalidation
//!
//! Records are keyed by:
//! * File path
//! * File size
//! * Modification time (nanoseconds)
//!
//! A mismatch on any of them is a miss and the file is re-hashed. The cache
//! is an injected object: scans receive it as an `Arc<FingerprintCache>` and
//! run correctly without one.

pub mod database;
pub mod entry;

pub use database::{CacheError, CacheResult, CacheStats, FingerprintCache, SCHEMA_VERSION};
pub use entry::CacheEntry;
