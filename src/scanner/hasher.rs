//! SHA-256 fingerprinting for files and directories.
//!
//! # Overview
//!
//! Files are fingerprinted by streaming their bytes through SHA-256 in
//! fixed-size chunks, so memory use does not depend on file size.
//!
//! Directories are fingerprinted from their children: every child contributes
//! a `(kind, name, digest)` record, records are sorted by name, and the
//! sequence is hashed with SHA-256. Two trees therefore fingerprint equal iff
//! they have the same names, the same structure and the same bytes at every
//! leaf, and changing any nested file changes every ancestor's fingerprint.
//!
//! # Record encoding
//!
//! Each child record is written as:
//!
//! ```text
//! kind (1 byte: b'F' or b'D') | name length (u64, little endian) | name bytes | digest (32 bytes)
//! ```
//!
//! The length prefix keeps the encoding injective for arbitrary names.
//!
//! # Example
//!
//! ```no_run
//! use dedupe_tree::scanner::{hash_to_hex, Hasher};
//! use std::path::Path;
//!
//! let hasher = Hasher::new();
//! let digest = hasher.hash_file(Path::new("report.txt")).unwrap();
//! println!("{}", hash_to_hex(&digest));
//! ```

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use sha2::{Digest as _, Sha256};

use super::{Digest, EntryKind, FileEntry, HashError};

/// Size of the read buffer used when streaming file contents.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// One child of a directory, as seen by [`Hasher::fingerprint_directory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChildFingerprint {
    /// File name of the child within its parent
    pub name: OsString,
    /// Whether the child is a file or a directory
    pub kind: EntryKind,
    /// The child's own fingerprint
    pub digest: Digest,
}

impl ChildFingerprint {
    /// Create a child record.
    #[must_use]
    pub fn new(name: impl Into<OsString>, kind: EntryKind, digest: Digest) -> Self {
        Self {
            name: name.into(),
            kind,
            digest,
        }
    }
}

/// Streaming SHA-256 hasher.
#[derive(Debug, Clone, Default)]
pub struct Hasher {
    shutdown_flag: Option<Arc<AtomicBool>>,
}

impl Hasher {
    /// Create a new hasher.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the shutdown flag checked between chunks.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }

    /// Fingerprint a scanned file.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened or becomes
    /// unreadable while streaming.
    pub fn fingerprint_file(&self, entry: &FileEntry) -> Result<Digest, HashError> {
        self.hash_file(&entry.path)
    }

    /// Stream a file through SHA-256.
    ///
    /// # Errors
    ///
    /// Returns [`HashError`] if the file cannot be opened, a read fails, or a
    /// shutdown was requested mid-file.
    pub fn hash_file(&self, path: &Path) -> Result<Digest, HashError> {
        let mut file = File::open(path).map_err(|e| HashError::from_io(path, e))?;
        self.hash_reader(path, &mut file)
    }

    fn hash_reader<R: Read>(&self, path: &Path, reader: &mut R) -> Result<Digest, HashError> {
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; CHUNK_SIZE];

        loop {
            if self.is_shutdown_requested() {
                return Err(HashError::Interrupted(path.to_path_buf()));
            }
            let read = match reader.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(HashError::from_io(path, e)),
            };
            hasher.update(&buffer[..read]);
        }

        Ok(hasher.finalize().into())
    }

    /// Record digest for a child directory with no entries of its own.
    ///
    /// The empty directory keeps no fingerprint itself, but its parent still
    /// has to tell it apart from a sibling that lacks it.
    #[must_use]
    pub fn empty_directory_marker() -> Digest {
        Sha256::digest(b"").into()
    }

    /// Compose a directory fingerprint from its children's fingerprints.
    ///
    /// Children are sorted by name before hashing, so the input order does
    /// not matter. Returns `None` when there are no children: an empty
    /// directory (after filtering) has no fingerprint.
    #[must_use]
    pub fn fingerprint_directory(children: &[ChildFingerprint]) -> Option<Digest> {
        if children.is_empty() {
            return None;
        }

        let mut sorted: Vec<&ChildFingerprint> = children.iter().collect();
        sorted.sort_by(|a, b| {
            a.name
                .as_encoded_bytes()
                .cmp(b.name.as_encoded_bytes())
                .then(a.kind.cmp(&b.kind))
        });

        let mut hasher = Sha256::new();
        for child in sorted {
            let name = child.name.as_encoded_bytes();
            hasher.update([child.kind.tag()]);
            hasher.update((name.len() as u64).to_le_bytes());
            hasher.update(name);
            hasher.update(child.digest);
        }

        Some(hasher.finalize().into())
    }
}

/// Render a digest as 64 lowercase hex characters.
#[must_use]
pub fn hash_to_hex(hash: &Digest) -> String {
    use std::fmt::Write;

    hash.iter().fold(String::with_capacity(64), |mut out, byte| {
        let _ = write!(out, "{byte:02x}");
        out
    })
}

/// Parse 64 hex characters back into a digest.
///
/// Returns `None` for input of the wrong length or with non-hex characters.
#[must_use]
pub fn hex_to_hash(hex: &str) -> Option<Digest> {
    if hex.len() != 64 || !hex.is_ascii() {
        return None;
    }

    let mut out = [0u8; 32];
    for (i, byte) in out.iter_mut().enumerate() {
        *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
    }
    Some(out)
}
