//! Logging setup for the engine.
//!
//! Structured logging is controlled by environment variables:
//!
//! - `QUARRY_DEBUG=true|1|yes` - Enable debug logging, including every filter
//!   and pipeline sent to the store
//! - `QUARRY_LOG_LEVEL=debug|info|warn|error|trace` - Set a specific log level
//! - `QUARRY_LOG_FORMAT=json|pretty|compact` - Set output format (default: json)
//!
//! ```rust,no_run
//! use quarry_mongodb::logging;
//!
//! // Initialize logging (call once at startup)
//! logging::init();
//! ```
//!
//! Inside the engine the standard tracing macros are used; statements that dump
//! whole store queries go through [`quarry_debug!`](crate::quarry_debug) so they
//! cost nothing unless `QUARRY_DEBUG` is set.

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `QUARRY_DEBUG`.
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("QUARRY_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Get the configured log level from `QUARRY_LOG_LEVEL`.
///
/// Defaults to "debug" if `QUARRY_DEBUG` is enabled, otherwise "warn".
pub fn get_log_level() -> &'static str {
    let fallback = if is_debug_enabled() { "debug" } else { "warn" };
    match env::var("QUARRY_LOG_LEVEL") {
        Ok(level) => match level.to_lowercase().as_str() {
            "trace" => "trace",
            "debug" => "debug",
            "info" => "info",
            "warn" => "warn",
            "error" => "error",
            _ => fallback,
        },
        Err(_) => fallback,
    }
}

/// Get the configured log format from `QUARRY_LOG_FORMAT`.
pub fn get_log_format() -> &'static str {
    env::var("QUARRY_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "compact" => "compact",
            _ => "json",
        })
        .unwrap_or("json")
}

/// Initialize the logging system.
///
/// Subsequent calls are no-ops. Nothing is installed unless `QUARRY_DEBUG` or
/// `QUARRY_LOG_LEVEL` is set, so applications with their own subscriber are
/// left alone.
pub fn init() {
    INIT.call_once(|| {
        if !is_debug_enabled() && env::var("QUARRY_LOG_LEVEL").is_err() {
            return;
        }

        #[cfg(feature = "tracing-subscriber")]
        {
            use tracing_subscriber::{EnvFilter, fmt, prelude::*};

            let level = get_log_level();
            let filter = EnvFilter::try_new(format!("quarry={level},quarry_mongodb={level}"))
                .unwrap_or_else(|_| EnvFilter::new("warn"));

            match get_log_format() {
                "json" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json())
                        .init();
                }
                "compact" => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().compact())
                        .init();
                }
                _ => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().pretty())
                        .init();
                }
            }

            tracing::info!(
                level = level,
                format = get_log_format(),
                "Quarry logging initialized"
            );
        }
    });
}

/// Debug-level event that is only emitted when `QUARRY_DEBUG` is enabled.
#[macro_export]
macro_rules! quarry_debug {
    ($($arg:tt)*) => {
        if $crate::logging::is_debug_enabled() {
            tracing::debug!($($arg)*);
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_default_is_json() {
        // SAFETY: no other test in this crate reads QUARRY_LOG_FORMAT.
        unsafe {
            env::remove_var("QUARRY_LOG_FORMAT");
        }
        assert_eq!(get_log_format(), "json");
    }

    #[test]
    fn test_log_level_is_known() {
        assert!(matches!(
            get_log_level(),
            "trace" | "debug" | "info" | "warn" | "error"
        ));
    }
}
