//! Logging macros gated by a module-level `ENABLE_LOGS` flag.
//!
//! Usage:
//! ```rust,ignore
//! // Each module that logs through these macros declares the flag:
//! const ENABLE_LOGS: bool = true;
//!
//! use crate::{log_info, log_warn};
//!
//! log_info!("card generation attempt {} started", 1);
//! ```
//!
//! Flipping the flag to `false` silences a noisy module (the backend runners
//! log every attempt) without touching the `RUST_LOG` filter.

/// Conditional info logging. Requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::info!($($arg)*);
        }
    };
}

/// Conditional warn logging. Requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::warn!($($arg)*);
        }
    };
}

/// Conditional error logging. Requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::error!($($arg)*);
        }
    };
}

/// Conditional debug logging. Requires `ENABLE_LOGS` in the calling module.
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        if ENABLE_LOGS {
            log::debug!($($arg)*);
        }
    };
}

/// Longest raw model output written to a single log line.
pub const LOG_EXCERPT_CHARS: usize = 2_000;

/// Shorten `text` for a log line, marking how much was cut.
pub fn truncate_for_log(text: &str) -> String {
    let total = text.chars().count();
    if total <= LOG_EXCERPT_CHARS {
        return text.to_string();
    }
    let head: String = text.chars().take(LOG_EXCERPT_CHARS).collect();
    format!("{head}… [{} more chars]", total - LOG_EXCERPT_CHARS)
}
