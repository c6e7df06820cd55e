//! Configuration types and defaults

use framepace_channel::{FrameEncoding, CONTROL_LABEL, FRAME_LABEL};
use framepace_core::pacing::{
    DEFAULT_DECAY_FACTOR, DEFAULT_DERIVATIVE_GAIN, DEFAULT_INTEGRAL_GAIN,
    DEFAULT_PROPORTIONAL_GAIN, DEFAULT_TARGET_FPS,
};
use framepace_core::{FramePaceError, FramePaceResult, PacingConfig};
use framepace_diagnostics::DEFAULT_WINDOW;
use framepace_media::{VideoResolution, DEFAULT_JPEG_QUALITY};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Backend the browser client talked to
pub const DEFAULT_SERVER_URL: &str = "ws://127.0.0.1:5000";
/// Logical namespace of the streaming endpoint
pub const DEFAULT_NAMESPACE: &str = "/streaming";

/// Configuration of one capture stream
///
/// Missing fields take their defaults when deserializing, so a JSON file
/// only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Backend URL, `ws://` or `wss://`
    pub server_url: String,
    /// Path appended to `server_url`
    pub namespace: String,
    /// Desired capture rate
    pub target_fps: f64,
    /// Capture width in pixels
    pub width: u32,
    /// Capture height in pixels
    pub height: u32,
    /// Encoder quality in `[0, 1]`
    pub jpeg_quality: f32,
    /// Integral decay factor in `[0, 1)`
    pub decay_factor: f64,
    /// Proportional gain
    pub proportional_gain: f64,
    /// Integral gain
    pub integral_gain: f64,
    /// Derivative gain
    pub derivative_gain: f64,
    /// Label of control messages
    pub control_label: String,
    /// Label of frame messages
    pub frame_label: String,
    /// How frames are carried on the wire
    pub frame_encoding: FrameEncoding,
    /// Cycles kept for pacing statistics
    pub stats_window: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            namespace: DEFAULT_NAMESPACE.to_string(),
            target_fps: DEFAULT_TARGET_FPS,
            width: VideoResolution::CAPTURE_DEFAULT.width,
            height: VideoResolution::CAPTURE_DEFAULT.height,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            decay_factor: DEFAULT_DECAY_FACTOR,
            proportional_gain: DEFAULT_PROPORTIONAL_GAIN,
            integral_gain: DEFAULT_INTEGRAL_GAIN,
            derivative_gain: DEFAULT_DERIVATIVE_GAIN,
            control_label: CONTROL_LABEL.to_string(),
            frame_label: FRAME_LABEL.to_string(),
            frame_encoding: FrameEncoding::Binary,
            stats_window: DEFAULT_WINDOW,
        }
    }
}

fn invalid(message: impl Into<String>) -> FramePaceError {
    FramePaceError::InvalidConfiguration {
        message: message.into(),
    }
}

impl StreamConfig {
    /// Parse a JSON document
    pub fn from_json_str(json: &str) -> FramePaceResult<Self> {
        serde_json::from_str(json).map_err(|e| invalid(format!("malformed config: {}", e)))
    }

    /// Read and parse a JSON file
    pub fn from_json_file(path: impl AsRef<Path>) -> FramePaceResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        tracing::debug!("Loaded stream config from {}", path.display());
        Self::from_json_str(&json)
    }

    /// Same configuration pointed at another backend
    pub fn with_server_url(mut self, server_url: impl Into<String>) -> Self {
        self.server_url = server_url.into();
        self
    }

    /// Same configuration with a different capture size
    pub fn with_resolution(mut self, resolution: VideoResolution) -> Self {
        self.width = resolution.width;
        self.height = resolution.height;
        self
    }

    /// Full URL of the streaming endpoint
    pub fn endpoint_url(&self) -> String {
        format!("{}{}", self.server_url.trim_end_matches('/'), self.namespace)
    }

    /// Capture resolution
    pub fn resolution(&self) -> VideoResolution {
        VideoResolution::new(self.width, self.height)
    }

    /// Controller configuration derived from the rate and gains
    pub fn pacing_config(&self) -> FramePaceResult<PacingConfig> {
        let config = PacingConfig::from_fps(self.target_fps)?
            .with_gains(
                self.proportional_gain,
                self.integral_gain,
                self.derivative_gain,
            )
            .with_decay(self.decay_factor);
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> FramePaceResult<()> {
        if !(self.server_url.starts_with("ws://") || self.server_url.starts_with("wss://")) {
            return Err(invalid(format!(
                "server_url must use ws:// or wss://, got '{}'",
                self.server_url
            )));
        }

        if !self.namespace.is_empty() && !self.namespace.starts_with('/') {
            return Err(invalid(format!(
                "namespace must start with '/', got '{}'",
                self.namespace
            )));
        }

        if self.width == 0 || self.height == 0 {
            return Err(invalid(format!(
                "resolution must be non-zero, got {}x{}",
                self.width, self.height
            )));
        }

        if !(0.0..=1.0).contains(&self.jpeg_quality) {
            return Err(invalid(format!(
                "jpeg_quality must be in [0, 1], got {}",
                self.jpeg_quality
            )));
        }

        if self.control_label.is_empty() || self.frame_label.is_empty() {
            return Err(invalid("message labels must not be empty"));
        }

        self.pacing_config()?;
        Ok(())
    }
}
