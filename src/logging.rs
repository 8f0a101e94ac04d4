//! Logging initialization for the gateway daemon.
//!
//! The log transport itself lives outside the core (the host binary may wire
//! it to syslog, a file, or a supervisor's captured stdout); this module only
//! initializes the `env_logger` backend that the rest of the crate's `log::*`
//! call sites assume is present.

use log::{debug, error, info, log_enabled, warn, Level};

/// Initializes the process-wide logger from `RUST_LOG` (or `info` by default).
pub fn init_logger() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
}

/// Logs an error message.
pub fn log_error(message: &str) {
    if log_enabled!(Level::Error) {
        error!("{message}");
    }
}

/// Logs a warning message.
pub fn log_warn(message: &str) {
    if log_enabled!(Level::Warn) {
        warn!("{message}");
    }
}

/// Logs an informational message.
pub fn log_info(message: &str) {
    if log_enabled!(Level::Info) {
        info!("{message}");
    }
}

/// Logs a debug message.
pub fn log_debug(message: &str) {
    if log_enabled!(Level::Debug) {
        debug!("{message}");
    }
}
