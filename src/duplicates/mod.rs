//! Duplicate detection module.
//!
//! This module provides functionality for:
//! - Grouping fingerprinted files and directories ([`groups`])
//! - Keeper selection by depth, then path
//! - Resolving overlapping groups into a replacement plan ([`resolver`])

pub mod groups;
pub mod resolver;

pub use groups::{
    compare_paths, group_by_fingerprint, keeper_order, DirectoryGroup, DuplicateGroup, FileGroup,
    GroupMember, GroupingStats,
};
pub use resolver::{resolve, Plan, PlanEntry};
