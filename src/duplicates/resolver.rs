//! Turn duplicate groups into a non-overlapping replacement plan.
//!
//! # Algorithm
//!
//! 1. Directory groups are visited from the shallowest keeper down. Members
//!    strictly inside a directory already marked redundant are pruned; if two
//!    or more remain, the first in `(depth, path)` order is kept and the rest
//!    are marked redundant.
//! 2. Redundant directories nested inside other redundant directories are
//!    dropped, since replacing the outer one removes them.
//! 3. File group members inside a redundant directory are pruned, and the
//!    remaining groups pick a keeper by the same rule.
//! 4. The plan lists directory replacements first, then file replacements.
//!
//! Visiting shallow groups first guarantees that no keeper ever ends up inside
//! a directory that is marked redundant later: a later redundant directory is
//! at least as deep as every earlier keeper, so it cannot contain one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Serialize, Serializer};

use super::groups::{
    compare_paths, keeper_order, DirectoryGroup, DuplicateGroup, FileGroup, GroupMember,
};
use crate::scanner::{hash_to_hex, Digest, EntryKind};

/// One planned replacement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlanEntry {
    /// File or directory
    pub kind: EntryKind,
    /// Path to replace
    pub redundant_path: PathBuf,
    /// Path the replacement will point at
    pub keeper_path: PathBuf,
    /// Bytes held by the redundant copy
    pub size: u64,
    /// Shared fingerprint
    #[serde(serialize_with = "serialize_digest")]
    pub fingerprint: Digest,
}

fn serialize_digest<S: Serializer>(digest: &Digest, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&hash_to_hex(digest))
}

/// Ordered, non-overlapping set of replacements.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    /// Directory entries first, then file entries
    pub entries: Vec<PlanEntry>,
    /// Redundant entries left out because an enclosing directory is replaced
    pub subsumed: Vec<PathBuf>,
}

impl Plan {
    /// Number of planned replacements.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if there is nothing to do.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bytes reclaimed if every entry is applied.
    #[must_use]
    pub fn reclaimable_bytes(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    /// Directory replacements.
    pub fn directories(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries
            .iter()
            .filter(|e| e.kind == EntryKind::Directory)
    }

    /// File replacements.
    pub fn files(&self) -> impl Iterator<Item = &PlanEntry> {
        self.entries.iter().filter(|e| e.kind == EntryKind::File)
    }
}

/// Check whether any strict ancestor of `path` is in `dirs`.
fn is_inside(path: &Path, dirs: &HashSet<PathBuf>) -> bool {
    path.ancestors().skip(1).any(|a| dirs.contains(a))
}

/// Build the replacement plan.
///
/// The result depends only on the groups' contents, never on their order.
#[must_use]
pub fn resolve(file_groups: &[FileGroup], directory_groups: &[DirectoryGroup]) -> Plan {
    let mut redundant_dirs: HashSet<PathBuf> = HashSet::new();
    let mut marked = Vec::new();
    let mut subsumed = Vec::new();

    for group in ordered(directory_groups) {
        let Some((keeper, redundant)) = split_group(group, &redundant_dirs, &mut subsumed) else {
            continue;
        };
        for member in redundant {
            redundant_dirs.insert(member.path.clone());
            marked.push(plan_entry(member, keeper, group.fingerprint));
        }
    }

    let mut entries = Vec::new();
    for entry in marked {
        if is_inside(&entry.redundant_path, &redundant_dirs) {
            log::trace!(
                "Dropping nested redundant directory {}",
                entry.redundant_path.display()
            );
            subsumed.push(entry.redundant_path);
        } else {
            entries.push(entry);
        }
    }

    for group in ordered(file_groups) {
        let Some((keeper, redundant)) = split_group(group, &redundant_dirs, &mut subsumed) else {
            continue;
        };
        for member in redundant {
            entries.push(plan_entry(member, keeper, group.fingerprint));
        }
    }

    subsumed.sort_by(|a, b| compare_paths(a, b));
    subsumed.dedup();

    log::debug!(
        "Resolved plan: {} directory and {} file replacements, {} subsumed",
        entries.iter().filter(|e| e.kind == EntryKind::Directory).count(),
        entries.iter().filter(|e| e.kind == EntryKind::File).count(),
        subsumed.len()
    );

    Plan { entries, subsumed }
}

/// Groups sorted by their shallowest member, ties by fingerprint.
fn ordered<E: GroupMember>(groups: &[DuplicateGroup<E>]) -> Vec<&DuplicateGroup<E>> {
    let mut sorted: Vec<(&E, &DuplicateGroup<E>)> = groups
        .iter()
        .filter_map(|g| g.members.iter().min_by(|a, b| keeper_order(*a, *b)).map(|k| (k, g)))
        .collect();
    sorted.sort_by(|(ka, a), (kb, b)| {
        keeper_order(*ka, *kb).then_with(|| a.fingerprint.cmp(&b.fingerprint))
    });
    sorted.into_iter().map(|(_, g)| g).collect()
}

/// Prune members inside redundant directories and split the rest into
/// keeper and redundant members. `None` when fewer than two remain.
fn split_group<'g, E: GroupMember>(
    group: &'g DuplicateGroup<E>,
    redundant_dirs: &HashSet<PathBuf>,
    subsumed: &mut Vec<PathBuf>,
) -> Option<(&'g E, Vec<&'g E>)> {
    let mut members: Vec<&E> = Vec::with_capacity(group.members.len());
    for member in &group.members {
        if is_inside(member.path(), redundant_dirs) {
            subsumed.push(member.path().to_path_buf());
        } else {
            members.push(member);
        }
    }
    if members.len() < 2 {
        return None;
    }
    members.sort_by(|a, b| keeper_order(*a, *b));
    let keeper = members.remove(0);
    Some((keeper, members))
}

fn plan_entry<E: GroupMember>(redundant: &E, keeper: &E, fingerprint: Digest) -> PlanEntry {
    PlanEntry {
        kind: E::KIND,
        redundant_path: redundant.path().to_path_buf(),
        keeper_path: keeper.path().to_path_buf(),
        size: redundant.size(),
        fingerprint,
    }
}
