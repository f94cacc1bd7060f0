//! Structured logging initialisation.
//!
//! Two flavours are provided, matching how the recomputation manager is
//! actually run: human-readable for local/interactive use, newline-delimited
//! JSON for ingestion by a log aggregator in production.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialises a human-readable, `RUST_LOG`-driven subscriber.
///
/// Falls back to `info` for this crate and `warn` for dependencies when
/// `RUST_LOG` is unset.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,ledger_engine=info"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_line_number(true)
        .try_init()
        .ok();
}

/// Initialises a JSON subscriber, for deployments that ship logs to an
/// aggregator rather than a terminal.
pub fn init_json_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,ledger_engine=info"));

    fmt()
        .json()
        .with_env_filter(filter)
        .with_target(true)
        .with_current_span(true)
        .try_init()
        .ok();
}
