//! Duplicate groups and keeper selection.
//!
//! # Overview
//!
//! A [`DuplicateGroup`] holds two or more entries that share a content
//! fingerprint. Members are kept sorted by `(depth, path)`, so the first
//! member is always the keeper: the shallowest entry, ties broken by the
//! lexicographically smallest path. Every other member is redundant.
//!
//! The same generic group serves files and directories through the
//! [`GroupMember`] trait.
//!
//! # Example
//!
//! ```
//! use dedupe_tree::scanner::FileEntry;
//! use dedupe_tree::duplicates::group_by_fingerprint;
//! use std::path::PathBuf;
//! use std::time::SystemTime;
//!
//! let files = vec![
//!     FileEntry::new(PathBuf::from("/r/backup/a.txt"), 4, SystemTime::now(), 2)
//!         .with_fingerprint([1u8; 32]),
//!     FileEntry::new(PathBuf::from("/r/a.txt"), 4, SystemTime::now(), 1)
//!         .with_fingerprint([1u8; 32]),
//!     FileEntry::new(PathBuf::from("/r/b.txt"), 9, SystemTime::now(), 1)
//!         .with_fingerprint([2u8; 32]),
//! ];
//!
//! let groups = group_by_fingerprint(files);
//! assert_eq!(groups.len(), 1);
//! assert_eq!(groups[0].keeper().path, PathBuf::from("/r/a.txt"));
//! ```

use std::cmp::Ordering;
use std::collections::HashMap;
use std::path::Path;

use crate::scanner::{hash_to_hex, Digest, DirectoryEntry, EntryKind, FileEntry};

/// Common view of files and directories for grouping and resolution.
pub trait GroupMember {
    /// Kind of entry
    const KIND: EntryKind;

    /// Absolute path
    fn path(&self) -> &Path;

    /// Depth below the scan root
    fn depth(&self) -> usize;

    /// Size in bytes (aggregate for directories)
    fn size(&self) -> u64;

    /// Content fingerprint, if computed
    fn fingerprint(&self) -> Option<&Digest>;
}

impl GroupMember for FileEntry {
    const KIND: EntryKind = EntryKind::File;

    fn path(&self) -> &Path {
        &self.path
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn fingerprint(&self) -> Option<&Digest> {
        self.fingerprint.digest()
    }
}

impl GroupMember for DirectoryEntry {
    const KIND: EntryKind = EntryKind::Directory;

    fn path(&self) -> &Path {
        &self.path
    }

    fn depth(&self) -> usize {
        self.depth
    }

    fn size(&self) -> u64 {
        self.size
    }

    fn fingerprint(&self) -> Option<&Digest> {
        self.fingerprint.digest()
    }
}

/// Keeper order: shallowest first, then smallest path bytes.
pub fn keeper_order<E: GroupMember>(a: &E, b: &E) -> Ordering {
    a.depth().cmp(&b.depth()).then_with(|| compare_paths(a.path(), b.path()))
}

/// Byte-wise lexicographic path comparison.
#[must_use]
pub fn compare_paths(a: &Path, b: &Path) -> Ordering {
    a.as_os_str()
        .as_encoded_bytes()
        .cmp(b.as_os_str().as_encoded_bytes())
}

/// Two or more entries with identical content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateGroup<E> {
    /// Shared SHA-256 fingerprint
    pub fingerprint: Digest,
    /// Members in keeper order; the first one is the keeper
    pub members: Vec<E>,
}

/// Group of duplicate files.
pub type FileGroup = DuplicateGroup<FileEntry>;

/// Group of duplicate directory trees.
pub type DirectoryGroup = DuplicateGroup<DirectoryEntry>;

impl<E: GroupMember> DuplicateGroup<E> {
    /// Create a group, sorting members into keeper order.
    #[must_use]
    pub fn new(fingerprint: Digest, mut members: Vec<E>) -> Self {
        members.sort_by(keeper_order);
        Self {
            fingerprint,
            members,
        }
    }

    /// Number of members.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Check if the group has no members.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// The retained copy.
    ///
    /// # Panics
    ///
    /// Panics if the group is empty. Groups built by [`group_by_fingerprint`]
    /// always have at least two members.
    #[must_use]
    pub fn keeper(&self) -> &E {
        &self.members[0]
    }

    /// Members that would be replaced.
    #[must_use]
    pub fn redundant(&self) -> &[E] {
        self.members.get(1..).unwrap_or(&[])
    }

    /// Size of one copy.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.members.first().map_or(0, GroupMember::size)
    }

    /// Total size of all copies.
    #[must_use]
    pub fn total_size(&self) -> u64 {
        self.members.iter().map(GroupMember::size).sum()
    }

    /// Bytes that removing every redundant copy would reclaim.
    #[must_use]
    pub fn wasted_space(&self) -> u64 {
        self.redundant().iter().map(GroupMember::size).sum()
    }

    /// Fingerprint as a hex string.
    #[must_use]
    pub fn hash_hex(&self) -> String {
        hash_to_hex(&self.fingerprint)
    }
}

/// Group fingerprinted entries by digest.
///
/// Unfingerprinted entries are ignored and only groups with two or more
/// members are returned. Groups are ordered by their keeper, so the output
/// does not depend on input order.
#[must_use]
pub fn group_by_fingerprint<E, I>(entries: I) -> Vec<DuplicateGroup<E>>
where
    E: GroupMember,
    I: IntoIterator<Item = E>,
{
    let mut by_digest: HashMap<Digest, Vec<E>> = HashMap::new();
    for entry in entries {
        if let Some(digest) = entry.fingerprint().copied() {
            by_digest.entry(digest).or_default().push(entry);
        }
    }

    let mut groups: Vec<DuplicateGroup<E>> = by_digest
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(digest, members)| DuplicateGroup::new(digest, members))
        .collect();

    groups.sort_by(|a, b| keeper_order(a.keeper(), b.keeper()));
    groups
}

/// Summary numbers for a set of groups.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct GroupingStats {
    /// Number of groups
    pub groups: usize,
    /// Number of redundant members across all groups
    pub redundant_entries: usize,
    /// Bytes held by redundant members
    pub wasted_bytes: u64,
}

impl GroupingStats {
    /// Compute stats for a slice of groups.
    #[must_use]
    pub fn from_groups<E: GroupMember>(groups: &[DuplicateGroup<E>]) -> Self {
        groups.iter().fold(Self::default(), |mut acc, group| {
            acc.groups += 1;
            acc.redundant_entries += group.redundant().len();
            acc.wasted_bytes += group.wasted_space();
            acc
        })
    }
}
