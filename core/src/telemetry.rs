// Logging setup shared by binaries and tests
use tracing_subscriber::EnvFilter;

use crate::{ParleyError, Result};

/// Installs a global `tracing` fmt subscriber.
///
/// The filter comes from `RUST_LOG` when set, otherwise from `default_filter`
/// (for example `"info,parley_core=debug"`). Fails if a subscriber is already
/// installed.
///
/// # Example
///
/// ```no_run
/// parley_core::telemetry::init_tracing("info").expect("tracing already initialized");
/// ```
pub fn init_tracing(default_filter: &str) -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| ParleyError::Config(format!("tracing init failed: {e}")))
}
