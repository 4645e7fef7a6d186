//! Logging setup for embedded use
//!
//! The agent runs inside a host process and configures its own tracing
//! output once at startup. Level comes from `RUST_LOG` (default: info).

/// Initialize the tracing subscriber. Safe to call more than once — later
/// calls are no-ops.
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}
