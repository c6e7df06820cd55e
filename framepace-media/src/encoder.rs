//! Frame encoders
//!
//! An encoder turns a raster frame into the byte payload that goes on the
//! wire. The quality knob trades size against cost and is the only input
//! besides the frame itself.

use crate::error::{MediaError, MediaResult};
use crate::frame::{EncodedFrame, RasterFrame};
use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::ColorType;

/// JPEG quality used by the browser client
pub const DEFAULT_JPEG_QUALITY: f32 = 0.9;

/// Converts a raster frame into a transmit-ready payload
pub trait FrameEncoder: Send + Sync {
    /// Encode `frame` with `quality` in `[0, 1]`
    fn encode(&self, frame: &RasterFrame, quality: f32) -> MediaResult<EncodedFrame>;

    /// MIME type of the produced payloads
    fn mime_type(&self) -> &'static str;
}

impl<T: FrameEncoder + ?Sized> FrameEncoder for std::sync::Arc<T> {
    fn encode(&self, frame: &RasterFrame, quality: f32) -> MediaResult<EncodedFrame> {
        (**self).encode(frame, quality)
    }

    fn mime_type(&self) -> &'static str {
        (**self).mime_type()
    }
}

fn check_quality(quality: f32) -> MediaResult<f32> {
    if !(0.0..=1.0).contains(&quality) {
        return Err(MediaError::InvalidConfiguration {
            message: format!("quality must be in [0, 1], got {}", quality),
        });
    }
    Ok(quality)
}

/// Baseline JPEG encoder
#[derive(Debug, Clone, Default)]
pub struct JpegFrameEncoder;

impl JpegFrameEncoder {
    /// Create a JPEG encoder
    pub fn new() -> Self {
        Self
    }

    /// Map `[0, 1]` onto the encoder's `1..=100` scale
    pub fn scaled_quality(quality: f32) -> u8 {
        (quality * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, frame: &RasterFrame, quality: f32) -> MediaResult<EncodedFrame> {
        let quality = check_quality(quality)?;
        let rgb = frame.to_rgb();

        let mut buf = Vec::with_capacity(rgb.len() / 8);
        JpegEncoder::new_with_quality(&mut buf, Self::scaled_quality(quality))
            .encode(&rgb, frame.width, frame.height, ColorType::Rgb8)
            .map_err(|e| MediaError::EncodingFailed {
                codec: "jpeg".to_string(),
                reason: e.to_string(),
            })?;

        Ok(EncodedFrame {
            data: Bytes::from(buf),
            mime_type: self.mime_type(),
            width: frame.width,
            height: frame.height,
            sequence: frame.sequence,
            quality,
        })
    }

    fn mime_type(&self) -> &'static str {
        "image/jpeg"
    }
}

/// Passes raw pixels through untouched
#[derive(Debug, Clone, Default)]
pub struct IdentityEncoder;

impl FrameEncoder for IdentityEncoder {
    fn encode(&self, frame: &RasterFrame, quality: f32) -> MediaResult<EncodedFrame> {
        let quality = check_quality(quality)?;
        Ok(EncodedFrame {
            data: frame.data.clone(),
            mime_type: self.mime_type(),
            width: frame.width,
            height: frame.height,
            sequence: frame.sequence,
            quality,
        })
    }

    fn mime_type(&self) -> &'static str {
        "application/octet-stream"
    }
}
