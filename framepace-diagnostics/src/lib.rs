//! # framepace diagnostics
//!
//! Structured logging setup and statistics about the pace a capture loop
//! actually achieves.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod logging;
pub mod pacing_monitor;

// Re-export main types
pub use logging::{init_logging, try_init_logging, DEFAULT_FILTER};
pub use pacing_monitor::{PacingMonitor, PacingStats, DEFAULT_WINDOW};
