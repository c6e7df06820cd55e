//! # framepace media
//!
//! The media side of a capture cycle: raster frames, the sources that hand
//! out the most recent one, and the encoders that turn them into a
//! transmit-ready payload.

#![warn(clippy::all)]

pub mod capture;
pub mod encoder;
pub mod error;
pub mod frame;

// Re-export main types
pub use capture::{CaptureSource, LatestFrameSource, TestPatternSource};
pub use encoder::{FrameEncoder, IdentityEncoder, JpegFrameEncoder, DEFAULT_JPEG_QUALITY};
pub use error::{MediaError, MediaResult};
pub use frame::{EncodedFrame, PixelFormat, RasterFrame, VideoResolution};
