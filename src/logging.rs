//! Logging setup for dedupe-tree.
//!
//! Log records go through the `log` facade to an `env_logger` backend on
//! stderr, so reports written to stdout stay machine-readable.
//!
//! The level is chosen in this order:
//!
//! 1. `RUST_LOG`, when set
//! 2. `--quiet` (errors only)
//! 3. `-v` (debug) or `-vv` (trace)
//! 4. info
//!
//! Debug builds prefix each line with a timestamp, and with the module path
//! once verbose output is requested.

use std::env;
use std::io::Write;

use env_logger::Builder;
use log::LevelFilter;

/// Initialize logging from the CLI verbosity flags.
///
/// Calling this more than once is harmless: later calls leave the first
/// logger in place.
///
/// ```rust,no_run
/// use dedupe_tree::logging::init_logging;
///
/// init_logging(1, false);
/// log::debug!("visible with -v");
/// ```
pub fn init_logging(verbose: u8, quiet: bool) {
    let from_env = env::var("RUST_LOG").is_ok();
    let level = determine_level(verbose, quiet);

    let mut builder = Builder::new();
    if from_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(level);
    }
    configure_format(&mut builder, verbose);

    if builder.try_init().is_err() {
        return;
    }

    if from_env {
        log::debug!("Log filter taken from RUST_LOG");
    } else {
        log::debug!("Logging initialized at level: {level:?}");
    }
}

/// Map `-v`/`-q` to a level filter. Quiet wins over verbose.
fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    match (quiet, verbose) {
        (true, _) => LevelFilter::Error,
        (false, 0) => LevelFilter::Info,
        (false, 1) => LevelFilter::Debug,
        (false, _) => LevelFilter::Trace,
    }
}

#[cfg(debug_assertions)]
fn configure_format(builder: &mut Builder, verbose: u8) {
    builder.format(move |buf, record| {
        let style = buf.default_level_style(record.level());
        let timestamp = buf.timestamp_seconds();
        if verbose > 0 {
            writeln!(
                buf,
                "{timestamp} {style}{:<5}{style:#} [{}] {}",
                record.level(),
                record.module_path().unwrap_or("unknown"),
                record.args()
            )
        } else {
            writeln!(
                buf,
                "{timestamp} {style}{:<5}{style:#} {}",
                record.level(),
                record.args()
            )
        }
    });
}

#[cfg(not(debug_assertions))]
fn configure_format(builder: &mut Builder, _verbose: u8) {
    builder.format(|buf, record| {
        let style = buf.default_level_style(record.level());
        writeln!(buf, "{style}{:<5}{style:#} {}", record.level(), record.args())
    });
}

/// Name of the currently active maximum level.
#[must_use]
pub fn current_level_name() -> &'static str {
    match log::max_level() {
        LevelFilter::Off => "off",
        LevelFilter::Error => "error",
        LevelFilter::Warn => "warn",
        LevelFilter::Info => "info",
        LevelFilter::Debug => "debug",
        LevelFilter::Trace => "trace",
    }
}
