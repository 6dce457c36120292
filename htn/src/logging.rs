//! Development-time tracing for debugging planning and execution.
//!
//! Decomposition steps, plan replacement and execution failures are emitted as
//! `tracing` events. The per-context decomposition log
//! ([`Context::decomposition_log`](crate::core::context::Context::decomposition_log))
//! is separate: it is kept in memory for the host and unaffected by `RUST_LOG`.

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber for development logging.
///
/// Reads `RUST_LOG` env var. Defaults to `warn` if unset.
/// Output: stderr, compact format.
///
/// Returns an error when a global subscriber is already installed.
///
/// # Example
/// ```bash
/// RUST_LOG=htn=debug cargo test
/// ```
pub fn try_init() -> Result<(), TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init()
}
