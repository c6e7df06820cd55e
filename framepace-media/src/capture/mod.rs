//! Capture sources
//!
//! A capture source hands out the most recent raster frame of a live feed,
//! synchronously. Device acquisition and platform-specific plumbing stay
//! behind this trait; the capture loop only ever sees `capture_frame`.

mod latest;
mod test_pattern;

pub use latest::LatestFrameSource;
pub use test_pattern::TestPatternSource;

use crate::error::MediaError;
use crate::frame::{RasterFrame, VideoResolution};

/// Source of the most recent frame of a live video feed
pub trait CaptureSource: Send + Sync {
    /// Most recent frame at the configured resolution
    fn capture_frame(&self) -> Result<RasterFrame, MediaError>;

    /// Whether the device is granted and producing frames
    fn is_ready(&self) -> bool;

    /// Configured frame resolution
    fn resolution(&self) -> VideoResolution;
}

impl<T: CaptureSource + ?Sized> CaptureSource for std::sync::Arc<T> {
    fn capture_frame(&self) -> Result<RasterFrame, MediaError> {
        (**self).capture_frame()
    }

    fn is_ready(&self) -> bool {
        (**self).is_ready()
    }

    fn resolution(&self) -> VideoResolution {
        (**self).resolution()
    }
}
