//! Command orchestration.
//!
//! [`run_app`] wires the pieces together in order: logging, Ctrl+C
//! handling, configuration, cache, scan (the cache is closed as soon as the
//! scan ends, whether it succeeded or not), resolve, confirm, execute,
//! render.

use std::fs;
use std::io::{self, BufRead, IsTerminal, Write};
use std::sync::Arc;

use anyhow::{bail, Context, Result};

use crate::actions::{ExecutionMode, LinkExecutor, Report, TerminalAction};
use crate::cache::FingerprintCache;
use crate::cli::{Cli, OutputFormat, ScopeArg};
use crate::config::Config;
use crate::duplicates::{resolve, Plan};
use crate::error::ExitCode;
use crate::logging::init_logging;
use crate::output::{format_size, JsonOutput, TextOutput};
use crate::progress::{Progress, ProgressCallback};
use crate::scanner::{ScanConfig, ScanResult, TreeScanner};
use crate::signal::install_handler;

/// Run one invocation of the tool.
///
/// Scan failures come back as [`ScanError`](crate::scanner::ScanError)
/// inside the `anyhow::Error`, so the caller can map them to exit codes
/// with [`ExitCode::for_error`].
///
/// # Errors
///
/// Returns an error if the root is invalid, the scan is interrupted, the
/// user must confirm but stdin is not interactive, or the report cannot be
/// written.
pub fn run_app(cli: Cli) -> Result<ExitCode> {
    init_logging(cli.verbose, cli.quiet);
    if cli.no_color {
        yansi::disable();
    }

    let handler = install_handler().context("failed to install Ctrl+C handler")?;
    let config = Config::load(cli.config.as_deref()).merge_cli(&cli);
    log::debug!("Effective configuration: {config:?}");

    let cache = open_cache(&cli, &config);
    let progress: Arc<dyn ProgressCallback> =
        Arc::new(Progress::new(cli.quiet || cli.output == OutputFormat::Json));

    let scanned = {
        let mut scan_config = ScanConfig::default()
            .with_io_threads(config.io_threads)
            .with_shutdown_flag(handler.get_flag())
            .with_progress_callback(Arc::clone(&progress));
        if let Some(cache) = &cache {
            scan_config = scan_config.with_cache(Arc::clone(cache));
        }
        TreeScanner::new(scan_config).scan(&cli.path, &config.scan_filters())
    };
    // the scanner's clones are gone, so the cache can be checkpointed now
    if let Some(cache) = cache {
        close_cache(cache);
    }
    let mut scan = scanned?;
    restrict_scope(&mut scan, config.scope);

    let plan = resolve(&scan.file_groups, &scan.directory_groups);
    log::info!(
        "Planned {} replacement(s), {} reclaimable",
        plan.len(),
        format_size(plan.reclaimable_bytes())
    );

    let action = TerminalAction::from(config.action);
    let mut mode = if cli.apply {
        ExecutionMode::Apply
    } else {
        ExecutionMode::DryRun
    };
    if mode == ExecutionMode::Apply && !plan.is_empty() && !cli.yes && !confirm(&plan, action)? {
        log::warn!("Not confirmed, nothing will be changed");
        mode = ExecutionMode::DryRun;
    }

    let report = LinkExecutor::new(mode, action)
        .with_shutdown_flag(handler.get_flag())
        .with_progress_callback(progress)
        .execute(&plan);

    let exit_code = if report.interrupted {
        ExitCode::Interrupted
    } else {
        ExitCode::Success
    };

    render(&cli, &scan, &plan, &report, exit_code)?;
    Ok(exit_code)
}

/// Open the fingerprint cache unless disabled, applying maintenance flags.
fn open_cache(cli: &Cli, config: &Config) -> Option<Arc<FingerprintCache>> {
    if !config.use_cache {
        log::debug!("Fingerprint cache disabled");
        return None;
    }
    let Some(path) = config
        .cache_path
        .clone()
        .or_else(FingerprintCache::default_path)
    else {
        log::warn!("No cache location available, running without a cache");
        return None;
    };

    let cache = FingerprintCache::open_or_recover(&path);
    if cli.clear_cache {
        match cache.clear() {
            Ok(()) => log::info!("Cleared fingerprint cache at {}", path.display()),
            Err(e) => log::warn!("Failed to clear fingerprint cache: {e}"),
        }
    }
    if let Some(days) = cli.cache_cleanup_days {
        match cache.cleanup_stale(u64::from(days)) {
            Ok(removed) => log::info!("Removed {removed} stale cache record(s)"),
            Err(e) => log::warn!("Cache cleanup failed: {e}"),
        }
    }
    if let Ok(stats) = cache.stats() {
        log::debug!(
            "Cache holds {} record(s), {} distinct fingerprint(s)",
            stats.total_entries,
            stats.unique_fingerprints
        );
    }
    Some(Arc::new(cache))
}

fn close_cache(cache: Arc<FingerprintCache>) {
    match Arc::try_unwrap(cache) {
        Ok(cache) => {
            if let Err(e) = cache.close() {
                log::warn!("Failed to close fingerprint cache: {e}");
            }
        }
        Err(_) => log::debug!("Fingerprint cache still shared, leaving it to drop"),
    }
}

/// Drop the groups outside the selected scope before resolving.
fn restrict_scope(scan: &mut ScanResult, scope: ScopeArg) {
    if !scope.includes_files() {
        scan.file_groups.clear();
    }
    if !scope.includes_directories() {
        scan.directory_groups.clear();
    }
}

/// Ask on stdin before touching the filesystem.
fn confirm(plan: &Plan, action: TerminalAction) -> Result<bool> {
    let stdin = io::stdin();
    if !stdin.is_terminal() {
        bail!("refusing to apply without confirmation; pass --yes in non-interactive mode");
    }

    let verb = match action {
        TerminalAction::ReplaceWithLink => "Replace",
        TerminalAction::Delete => "Delete",
    };
    let mut stderr = io::stderr();
    write!(
        stderr,
        "{verb} {} redundant entr{} ({})? [y/N] ",
        plan.len(),
        if plan.len() == 1 { "y" } else { "ies" },
        format_size(plan.reclaimable_bytes())
    )?;
    stderr.flush()?;

    let mut answer = String::new();
    stdin.lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn render(
    cli: &Cli,
    scan: &ScanResult,
    plan: &Plan,
    report: &Report,
    exit_code: ExitCode,
) -> Result<()> {
    let mut stdout = io::stdout().lock();
    let file_contents = match cli.output {
        OutputFormat::Text => {
            let text = TextOutput::new(scan, plan, report);
            text.with_color(!cli.no_color && io::stdout().is_terminal())
                .write_to(&mut stdout)
                .context("failed to write report")?;
            text.with_color(false).render()
        }
        OutputFormat::Json => {
            let json = JsonOutput::new(scan, plan, report, exit_code);
            json.write_to(&mut stdout)
                .context("failed to write JSON report")?;
            json.to_json_pretty()?
        }
    };

    if let Some(path) = &cli.report_file {
        fs::write(path, file_contents)
            .with_context(|| format!("failed to write report file {}", path.display()))?;
        log::info!("Report written to {}", path.display());
    }
    Ok(())
}
