//! Stderr diagnostics for the `taskexec` binary.
//!
//! Filtering comes from `TASKEXEC_LOG`, then `RUST_LOG`. Nothing here is
//! persisted; the durable record of a run is the `.taskexec/` state, history
//! and checkpoints.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Env var checked before `RUST_LOG`.
pub const LOG_ENV: &str = "TASKEXEC_LOG";

const DEFAULT_DIRECTIVE: &str = "warn";

/// Install the global subscriber: compact lines on stderr.
///
/// # Example
/// ```bash
/// TASKEXEC_LOG=taskexec::edit_loop=debug taskexec run "fix the failing test" -f src/lib.rs
/// ```
pub fn init() {
    let directive = std::env::var(LOG_ENV)
        .or_else(|_| std::env::var(EnvFilter::DEFAULT_ENV))
        .ok();

    tracing_subscriber::registry()
        .with(filter_for(directive.as_deref()))
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Filter for `directive`, falling back to `warn` when it is unset or invalid.
fn filter_for(directive: Option<&str>) -> EnvFilter {
    directive
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_DIRECTIVE))
}
