//! Synthetic test pattern source for demos and tests

use super::CaptureSource;
use crate::error::MediaError;
use crate::frame::{PixelFormat, RasterFrame, VideoResolution};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// Moving diagonal gradient, generated on demand.
///
/// Always ready unless made unavailable with
/// [`set_available`](Self::set_available). Counts every capture call, which
/// tests use to observe how many cycles actually ran.
#[derive(Debug)]
pub struct TestPatternSource {
    resolution: VideoResolution,
    captures: AtomicU64,
    available: AtomicBool,
}

impl TestPatternSource {
    /// Create a source producing frames of `resolution`
    pub fn new(resolution: VideoResolution) -> Self {
        Self {
            resolution,
            captures: AtomicU64::new(0),
            available: AtomicBool::new(true),
        }
    }

    /// Number of times a frame was requested
    pub fn captures(&self) -> u64 {
        self.captures.load(Ordering::SeqCst)
    }

    /// Simulate the device disappearing or coming back
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn render(&self, sequence: u64) -> Vec<u8> {
        let VideoResolution { width, height } = self.resolution;
        let shift = (sequence % 256) as u32;
        let mut data = Vec::with_capacity(self.resolution.frame_size(PixelFormat::Rgb24));

        for y in 0..height {
            for x in 0..width {
                let r = ((x * 255) / width.max(1)) as u8;
                let g = ((y * 255) / height.max(1)) as u8;
                let b = ((x + y + shift) % 256) as u8;
                data.extend_from_slice(&[r, g, b]);
            }
        }
        data
    }
}

impl CaptureSource for TestPatternSource {
    fn capture_frame(&self) -> Result<RasterFrame, MediaError> {
        let sequence = self.captures.fetch_add(1, Ordering::SeqCst);
        if !self.available.load(Ordering::SeqCst) {
            return Err(MediaError::DeviceUnavailable {
                device: "test-pattern".to_string(),
                reason: "source disabled".to_string(),
            });
        }

        RasterFrame::new(
            self.resolution,
            PixelFormat::Rgb24,
            self.render(sequence),
            sequence,
        )
    }

    fn is_ready(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn resolution(&self) -> VideoResolution {
        self.resolution
    }
}
