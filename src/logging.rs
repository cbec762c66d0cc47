//! Compact stderr logging backend for the simulator.
//!
//! Wires a small [`log::Log`] implementation into the `log` facade so the
//! rest of the crate can use `log::info!` / `log::debug!` without caring
//! where the lines end up. The simulator is a single-threaded CLI, so the
//! sink is plain stderr; the level is controlled with the `TIMEPACK_LOG`
//! environment variable (error, warn, info, debug, trace).

use log::{Level, LevelFilter, Log, Metadata, Record};

const LEVEL_ENV_VAR: &str = "TIMEPACK_LOG";

/// Stderr-backed logger with a fixed maximum level.
struct StderrLogger {
    max_level: LevelFilter,
}

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.max_level
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "ERROR",
            Level::Warn => "WARN",
            Level::Info => "INFO",
            Level::Debug => "DEBUG",
            Level::Trace => "TRACE",
        };
        eprintln!("[{}] {}", tag, record.args());
    }

    fn flush(&self) {}
}

/// Parse a level name, defaulting to Info for anything unrecognized.
fn parse_level(name: &str) -> LevelFilter {
    match name.to_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" => LevelFilter::Warn,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => LevelFilter::Info,
    }
}

/// Initialize logging infrastructure.
///
/// Safe to call more than once; only the first call installs the logger.
pub fn initialize_logging() {
    let max_level = std::env::var(LEVEL_ENV_VAR)
        .map(|v| parse_level(&v))
        .unwrap_or(LevelFilter::Info);

    if log::set_boxed_logger(Box::new(StderrLogger { max_level })).is_ok() {
        log::set_max_level(max_level);
    }
}
