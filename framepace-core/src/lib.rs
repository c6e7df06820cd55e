//! # framepace core
//!
//! The adaptive frame pacing controller and the error taxonomy shared by every
//! framepace crate. Nothing in here performs I/O: the controller is a pure
//! function of the timestamps it is fed, which keeps it trivially testable.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod pacing;

// Re-export main types
pub use error::{FramePaceError, FramePaceResult};
pub use pacing::{PacingConfig, PacingController};
