//! Raster and encoded frame types

use crate::error::{MediaError, MediaResult};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Supported raster pixel formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 8-bit red, green, blue
    Rgb24,
    /// 8-bit red, green, blue, alpha
    Rgba32,
}

impl PixelFormat {
    /// Bytes used by one pixel
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba32 => 4,
        }
    }
}

/// Video resolution information
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoResolution {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl VideoResolution {
    /// Create a resolution
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 640x480
    pub const VGA: Self = Self::new(640, 480);
    /// 1280x720
    pub const HD: Self = Self::new(1280, 720);
    /// 1024x576, the capture size of the browser client
    pub const CAPTURE_DEFAULT: Self = Self::new(1024, 576);

    /// Number of pixels in one frame
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Size of a raster frame in `format`
    pub fn frame_size(&self, format: PixelFormat) -> usize {
        self.pixel_count() * format.bytes_per_pixel()
    }

    /// Width divided by height
    pub fn aspect_ratio(&self) -> f64 {
        self.width as f64 / self.height as f64
    }
}

impl Default for VideoResolution {
    fn default() -> Self {
        Self::CAPTURE_DEFAULT
    }
}

impl fmt::Display for VideoResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Uncompressed frame as handed out by a capture source
#[derive(Debug, Clone)]
pub struct RasterFrame {
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Pixel layout of `data`
    pub format: PixelFormat,
    /// Tightly packed pixel rows
    pub data: Bytes,
    /// Wall-clock capture time in milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Source-assigned sequence number
    pub sequence: u64,
}

impl RasterFrame {
    /// Create a frame, checking that `data` holds exactly one frame
    pub fn new(
        resolution: VideoResolution,
        format: PixelFormat,
        data: impl Into<Bytes>,
        sequence: u64,
    ) -> MediaResult<Self> {
        let data = data.into();
        let expected = resolution.frame_size(format);
        if data.len() != expected {
            return Err(MediaError::InvalidFrameData {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width: resolution.width,
            height: resolution.height,
            format,
            data,
            timestamp_ms: unix_millis(),
            sequence,
        })
    }

    /// Resolution of this frame
    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }

    /// Pixel data as packed RGB, dropping alpha when present
    pub fn to_rgb(&self) -> Vec<u8> {
        match self.format {
            PixelFormat::Rgb24 => self.data.to_vec(),
            PixelFormat::Rgba32 => self
                .data
                .chunks_exact(4)
                .flat_map(|px| [px[0], px[1], px[2]])
                .collect(),
        }
    }
}

/// Compressed, transmit-ready frame
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Encoded bytes
    pub data: Bytes,
    /// MIME type of `data`
    pub mime_type: &'static str,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Sequence number of the source frame
    pub sequence: u64,
    /// Quality the frame was encoded with, in `[0, 1]`
    pub quality: f32,
}

impl EncodedFrame {
    /// Payload size in bytes
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the payload is empty
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

pub(crate) fn unix_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
