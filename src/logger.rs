use std::io::Write;
use std::sync::OnceLock;

use log::{LevelFilter, Log, Metadata, Record, debug};
use parking_lot::Mutex;

static LOGGER: OnceLock<CentryLogger> = OnceLock::new();

struct CentryLogger {
    prefix: Mutex<String>,
}

impl Log for CentryLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let prefix = self.prefix.lock();
        let _ = writeln!(
            std::io::stderr().lock(),
            "{prefix}[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}

/// Install the process logger writing prefixed lines to stderr.
///
/// Calling it again only updates the prefix and level.
pub fn init(level: LevelFilter, prefix: &str) {
    let logger = LOGGER.get_or_init(|| CentryLogger {
        prefix: Mutex::new(String::new()),
    });
    *logger.prefix.lock() = prefix.to_string();

    // Fails only when another logger is already installed, which then keeps receiving records
    let _ = log::set_logger(logger);
    log::set_max_level(level);
}

/// Change the level of the installed logger
pub fn set_level(level: LevelFilter) {
    let current = log::max_level();
    if current == level {
        return;
    }
    debug!(
        "changing loglevel to {} (from {})",
        level_name(level),
        level_name(current)
    );
    log::set_max_level(level);
}

/// Parse a level name. Besides the `log` names this accepts `panic` and `fatal`, which map to
/// `off` and `error`, and `warning`.
#[must_use]
pub fn parse_level(text: &str) -> Option<LevelFilter> {
    match text.trim().to_lowercase().as_str() {
        "off" | "panic" => Some(LevelFilter::Off),
        "fatal" | "error" => Some(LevelFilter::Error),
        "warn" | "warning" => Some(LevelFilter::Warn),
        "info" => Some(LevelFilter::Info),
        "debug" => Some(LevelFilter::Debug),
        "trace" => Some(LevelFilter::Trace),
        _ => None,
    }
}

#[must_use]
pub fn level_name(level: LevelFilter) -> String {
    level.as_str().to_lowercase()
}
