//! Provides configuration of a logger.

use env_logger::Builder;
use log::LevelFilter;

/// Configures the log with the specified verbosity. Higher verbosity results
/// in additional log messages, capped at trace level.
pub fn configure(verbosity: u8) {
    let log_level = match verbosity {
        0 => LevelFilter::Error,
        1 => LevelFilter::Warn,
        2 => LevelFilter::Info,
        3 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    Builder::new().filter_level(log_level).init();
}
