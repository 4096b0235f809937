//! Human-readable report.
//!
//! Groups are listed with their keeper first, followed by the plan entries
//! as the executor recorded them and a summary block.

use std::fmt::{self, Display, Write as _};
use std::io::{self, Write};

use yansi::{Color, Paint, Style};

use super::{format_size, RunSummary};
use crate::actions::{ActionKind, ExecutionMode, Report, ReportEntry, TerminalAction};
use crate::duplicates::{DuplicateGroup, GroupMember, Plan};
use crate::scanner::ScanResult;

const HEADING: Style = Style::new().bold();
const KEEP: Style = Style::new().fg(Color::Green);
const REDUNDANT: Style = Style::new().fg(Color::Yellow);
const SKIP: Style = Style::new().fg(Color::Red);
const DIM: Style = Style::new().dim();

/// Text report over one run.
#[derive(Debug, Clone, Copy)]
pub struct TextOutput<'a> {
    scan: &'a ScanResult,
    plan: &'a Plan,
    report: &'a Report,
    colored: bool,
}

impl<'a> TextOutput<'a> {
    /// Create a colored text report.
    #[must_use]
    pub fn new(scan: &'a ScanResult, plan: &'a Plan, report: &'a Report) -> Self {
        Self {
            scan,
            plan,
            report,
            colored: true,
        }
    }

    /// Enable or disable ANSI styling (report files are always plain).
    #[must_use]
    pub fn with_color(mut self, colored: bool) -> Self {
        self.colored = colored;
        self
    }

    /// Render the full report.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::new();
        // Writing into a String cannot fail.
        let _ = self.render_into(&mut out);
        out
    }

    /// Write the report to a writer.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> io::Result<()> {
        writer.write_all(self.render().as_bytes())
    }

    fn render_into(&self, out: &mut String) -> fmt::Result {
        let mode = match self.report.mode {
            ExecutionMode::DryRun => "dry run",
            ExecutionMode::Apply => "apply",
        };
        let action = match self.report.action {
            TerminalAction::ReplaceWithLink => "link",
            TerminalAction::Delete => "delete",
        };
        writeln!(
            out,
            "{} {}",
            self.style("dedupe-tree report for", HEADING),
            self.scan.root.display()
        )?;
        writeln!(out, "Mode: {mode} ({action})")?;

        self.render_groups(out, "Duplicate directories", &self.scan.directory_groups)?;
        self.render_groups(out, "Duplicate files", &self.scan.file_groups)?;
        self.render_entries(out)?;
        self.render_warnings(out)?;
        self.render_summary(out)
    }

    fn render_groups<E: GroupMember>(
        &self,
        out: &mut String,
        title: &str,
        groups: &[DuplicateGroup<E>],
    ) -> fmt::Result {
        if groups.is_empty() {
            return Ok(());
        }
        writeln!(out)?;
        writeln!(
            out,
            "{}",
            self.style(format!("{title} ({} groups)", groups.len()), HEADING)
        )?;
        for group in groups {
            let hash = group.hash_hex();
            writeln!(
                out,
                "  {} {} copies, {} each",
                self.style(format!("[{}]", &hash[..12]), DIM),
                group.len(),
                format_size(group.size())
            )?;
            writeln!(
                out,
                "    {}  {}",
                self.style("keep   ", KEEP),
                group.keeper().path().display()
            )?;
            for member in group.redundant() {
                writeln!(
                    out,
                    "    {}  {}",
                    self.style("dup    ", REDUNDANT),
                    member.path().display()
                )?;
            }
        }
        Ok(())
    }

    fn render_entries(&self, out: &mut String) -> fmt::Result {
        if self.report.entries.is_empty() {
            return Ok(());
        }
        writeln!(out)?;
        writeln!(
            out,
            "{}",
            self.style(format!("Plan ({} entries)", self.report.entries.len()), HEADING)
        )?;
        for entry in &self.report.entries {
            self.render_entry(out, entry)?;
        }
        if !self.plan.subsumed.is_empty() {
            writeln!(
                out,
                "  {}",
                self.style(
                    format!(
                        "{} more duplicate(s) covered by a directory replacement",
                        self.plan.subsumed.len()
                    ),
                    DIM
                )
            )?;
        }
        Ok(())
    }

    fn render_entry(&self, out: &mut String, entry: &ReportEntry) -> fmt::Result {
        let (label, style) = match entry.action {
            ActionKind::Link => ("LINK  ", REDUNDANT),
            ActionKind::Delete => ("DELETE", REDUNDANT),
            ActionKind::Skip => ("SKIP  ", SKIP),
        };
        write!(
            out,
            "  {} {:<9} {} -> {}",
            self.style(label, style),
            entry.kind.as_str(),
            entry.redundant_path.display(),
            entry.keeper_path.display()
        )?;
        match &entry.reason {
            Some(reason) => writeln!(out, " ({reason})"),
            None => writeln!(out, " ({})", format_size(entry.reclaimed_bytes)),
        }
    }

    fn render_warnings(&self, out: &mut String) -> fmt::Result {
        if self.scan.warnings.is_empty() {
            return Ok(());
        }
        writeln!(out)?;
        writeln!(
            out,
            "{}",
            self.style(format!("Warnings ({})", self.scan.warnings.len()), HEADING)
        )?;
        for warning in &self.scan.warnings {
            writeln!(out, "  {warning}")?;
        }
        Ok(())
    }

    fn render_summary(&self, out: &mut String) -> fmt::Result {
        let summary = RunSummary::new(self.scan, self.plan, self.report);
        writeln!(out)?;
        writeln!(out, "{}", self.style("Summary", HEADING))?;
        writeln!(
            out,
            "  Scanned:     {} files in {} directories ({})",
            summary.files_scanned,
            summary.directories_scanned,
            format_size(summary.bytes_scanned)
        )?;
        writeln!(
            out,
            "  Duplicates:  {} file groups, {} directory groups",
            summary.file_groups, summary.directory_groups
        )?;
        writeln!(
            out,
            "  Redundant:   {} directories, {} files",
            summary.redundant_directories, summary.redundant_files
        )?;
        writeln!(
            out,
            "  Reclaimable: {} ({:.1}% of scanned)",
            format_size(summary.reclaimable_bytes),
            summary.savings_percent
        )?;
        writeln!(
            out,
            "  Cache:       {} hits, {} misses",
            summary.cache_hits, summary.cache_misses
        )?;
        writeln!(out, "  Elapsed:     {} ms", summary.scan_duration_ms)?;
        writeln!(out, "  {}", self.report.summary())?;

        if self.report.mode == ExecutionMode::DryRun && !self.plan.is_empty() {
            writeln!(out)?;
            writeln!(
                out,
                "{}",
                self.style(
                    "Dry run: nothing was changed. Re-run with --apply to replace redundant copies.",
                    DIM
                )
            )?;
        }
        Ok(())
    }

    fn style<T: Display>(&self, value: T, style: Style) -> String {
        if self.colored {
            value.paint(style).to_string()
        } else {
            value.to_string()
        }
    }
}
