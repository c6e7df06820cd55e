//! Structured logging setup

use framepace_core::{FramePaceError, FramePaceResult};
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is not set
pub const DEFAULT_FILTER: &str = "info";

fn build_filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global fmt subscriber, failing if one is already set
///
/// `RUST_LOG` takes precedence over `default_filter`.
pub fn try_init_logging(default_filter: &str) -> FramePaceResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(default_filter))
        .with_target(true)
        .try_init()
        .map_err(|e| FramePaceError::Initialization {
            reason: format!("logging: {}", e),
        })
}

/// Install the global fmt subscriber unless one is already set
pub fn init_logging(default_filter: &str) {
    if let Err(e) = try_init_logging(default_filter) {
        tracing::debug!("Keeping existing subscriber: {}", e);
    }
}
