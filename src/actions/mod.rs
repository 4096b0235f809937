//! File actions module.
//!
//! The [`link`] module executes replacement plans:
//! - Dry-run reporting (default, no mutation)
//! - Symlink replacement of redundant files and directory trees
//! - Deletion as an alternative terminal action
//! - Verification of every entry against the filesystem before acting
//!
//! ```no_run
//! use dedupe_tree::actions::link::{ExecutionMode, LinkExecutor, TerminalAction};
//! use dedupe_tree::duplicates::resolve;
//!
//! let plan = resolve(&[], &[]);
//! let report = LinkExecutor::new(ExecutionMode::Apply, TerminalAction::ReplaceWithLink)
//!     .execute(&plan);
//! assert!(report.entries.is_empty());
//! ```

pub mod link;

pub use link::{
    ActionKind, ExecutionMode, LinkError, LinkExecutor, Report, ReportEntry, TerminalAction,
};
