//! Logging setup for the `tiller` binary.
//!
//! Logs go to stderr so that scripts written to stdout stay clean.
//!
//! # Environment Variables
//!
//! - `TILLER_DEBUG=true` / `TILLER_DEBUG=1` - Enable debug logging
//! - `TILLER_LOG_LEVEL=debug|info|warn|error|trace` - Set specific log level
//! - `TILLER_LOG_FORMAT=json|pretty|compact` - Set output format (default: compact)

use std::env;
use std::sync::Once;

static INIT: Once = Once::new();

/// Check if debug logging is enabled via `TILLER_DEBUG`.
///
/// Returns `true` if `TILLER_DEBUG` is set to "true", "1", or "yes" (case-insensitive).
#[inline]
pub fn is_debug_enabled() -> bool {
    env::var("TILLER_DEBUG")
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

/// Log level from `TILLER_LOG_LEVEL`, else "debug" when debugging, else "warn".
pub fn log_level(verbose: bool) -> &'static str {
    let fallback = if verbose || is_debug_enabled() {
        "debug"
    } else {
        "warn"
    };

    match env::var("TILLER_LOG_LEVEL") {
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

/// Log format from `TILLER_LOG_FORMAT`.
pub fn log_format() -> &'static str {
    env::var("TILLER_LOG_FORMAT")
        .map(|f| match f.to_lowercase().as_str() {
            "pretty" => "pretty",
            "json" => "json",
            _ => "compact",
        })
        .unwrap_or("compact")
}

/// Initialize logging once. Without `--verbose`, `TILLER_DEBUG` or
/// `TILLER_LOG_LEVEL` nothing is installed.
pub fn init(verbose: bool) {
    INIT.call_once(|| {
        if !verbose && !is_debug_enabled() && env::var("TILLER_LOG_LEVEL").is_err() {
            return;
        }

        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        let level = log_level(verbose);
        let filter = EnvFilter::try_new(format!(
            "tiller={},tiller_cli={},tiller_migrate={},tiller_sqlite={}",
            level, level, level, level
        ))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

        let layer = fmt::layer().with_writer(std::io::stderr);
        match log_format() {
            "json" => tracing_subscriber::registry()
                .with(filter)
                .with(layer.json())
                .init(),
            "pretty" => tracing_subscriber::registry()
                .with(filter)
                .with(layer.pretty())
                .init(),
            _ => tracing_subscriber::registry()
                .with(filter)
                .with(layer.compact())
                .init(),
        }

        tracing::debug!(level, format = log_format(), "tiller logging initialized");
    });
}
