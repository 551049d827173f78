//! Setting up logging.
//!
//! Upstream management reports what it does through [tracing] events:
//! additions and failovers at debug level, releases and capability changes
//! at trace level. Applications are free to collect these any way they
//! like. This module provides a simple default.
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

/// The directive used when `RUST_LOG` is not set or cannot be parsed.
const DEFAULT_DIRECTIVE: &str = "domain_upstreams=info";

/// Setup logging of upstream events to standard error.
///
/// Use the RUST_LOG environment variable to select what is logged. Without
/// it, only events at info level and above from this crate are shown.
///
/// E.g. To see upstreams being added and failed over:
///   RUST_LOG=domain_upstreams=DEBUG
///
/// Or to also see connections being closed and capabilities ignored:
///   RUST_LOG=domain_upstreams::upstream=TRACE
///
/// Calling this more than once, or after another subscriber has been
/// installed, has no effect.
pub fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .with_target(true)
        .without_time()
        .try_init()
        .ok();
}

/// Returns the filter selected by `RUST_LOG` or the default one.
fn env_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .try_from_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
}

//============ Testing =======================================================
