//! Debug-gated logging macros.
//!
//! Every component receives a [`DebugLog`] copied from the engine configuration.
//! The macros only forward to the `log` facade when that handle is enabled, so a
//! production instance stays silent regardless of the installed logger.
//!
//! ```rust
//! use lizz::{lizz_info, logging::DebugLog};
//!
//! let log = DebugLog::new(true);
//! lizz_info!(log, "tracking {} sections", 3);
//! ```

/// Log target used by every message the engine emits
pub const LOG_TARGET: &str = "lizz";

/// Copyable handle carrying the `debug` configuration flag
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DebugLog {
    enabled: bool,
}

impl DebugLog {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn enabled(&self) -> bool {
        self.enabled
    }
}

/// Conditional debug logging.
#[macro_export]
macro_rules! lizz_debug {
    ($log:expr, $($arg:tt)*) => {
        if $log.enabled() {
            $crate::__log::debug!(target: $crate::logging::LOG_TARGET, $($arg)*);
        }
    };
}

/// Conditional info logging.
#[macro_export]
macro_rules! lizz_info {
    ($log:expr, $($arg:tt)*) => {
        if $log.enabled() {
            $crate::__log::info!(target: $crate::logging::LOG_TARGET, $($arg)*);
        }
    };
}

/// Conditional warn logging.
#[macro_export]
macro_rules! lizz_warn {
    ($log:expr, $($arg:tt)*) => {
        if $log.enabled() {
            $crate::__log::warn!(target: $crate::logging::LOG_TARGET, $($arg)*);
        }
    };
}

/// Conditional error logging.
#[macro_export]
macro_rules! lizz_error {
    ($log:expr, $($arg:tt)*) => {
        if $log.enabled() {
            $crate::__log::error!(target: $crate::logging::LOG_TARGET, $($arg)*);
        }
    };
}
