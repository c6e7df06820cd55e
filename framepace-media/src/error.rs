//! Media error types and handling

use crate::frame::VideoResolution;
use framepace_core::FramePaceError;
use thiserror::Error;

/// Main error type for media operations
#[derive(Error, Debug)]
pub enum MediaError {
    /// Source has not produced its first frame yet
    #[error("Capture source not ready: {reason}")]
    SourceNotReady {
        /// Why the source is not ready
        reason: String,
    },

    /// Device could not be acquired or went away
    #[error("Device unavailable: {device} - {reason}")]
    DeviceUnavailable {
        /// Device name
        device: String,
        /// Failure reason
        reason: String,
    },

    /// Invalid frame data error
    #[error("Invalid frame data: expected {expected} bytes, got {actual}")]
    InvalidFrameData {
        /// Expected data size
        expected: usize,
        /// Actual data size
        actual: usize,
    },

    /// Frame does not match the configured resolution
    #[error("Resolution mismatch: expected {expected}, got {actual}")]
    ResolutionMismatch {
        /// Configured resolution
        expected: VideoResolution,
        /// Resolution of the offered frame
        actual: VideoResolution,
    },

    /// Invalid configuration provided
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Encoding operation failed
    #[error("Encoding failed: {codec} - {reason}")]
    EncodingFailed {
        /// Codec name
        codec: String,
        /// Failure reason
        reason: String,
    },

    /// Unsupported format error
    #[error("Unsupported format: {format}")]
    UnsupportedFormat {
        /// Format description
        format: String,
    },
}

/// Result type alias for media operations
pub type MediaResult<T> = Result<T, MediaError>;

impl MediaError {
    /// Check if error is recoverable without outside intervention
    pub fn is_recoverable(&self) -> bool {
        match self {
            MediaError::SourceNotReady { .. } => false,
            MediaError::DeviceUnavailable { .. } => false,
            MediaError::EncodingFailed { .. } => true,
            MediaError::InvalidFrameData { .. } => true,
            MediaError::ResolutionMismatch { .. } => true,
            _ => false,
        }
    }

    /// Whether the error means no frame can be captured at all
    pub fn is_source_failure(&self) -> bool {
        matches!(
            self,
            MediaError::SourceNotReady { .. } | MediaError::DeviceUnavailable { .. }
        )
    }
}

impl From<MediaError> for FramePaceError {
    fn from(error: MediaError) -> Self {
        match error {
            MediaError::SourceNotReady { .. } | MediaError::DeviceUnavailable { .. } => {
                FramePaceError::SourceUnavailable {
                    reason: error.to_string(),
                }
            }
            MediaError::InvalidConfiguration { message } => {
                FramePaceError::InvalidConfiguration { message }
            }
            other => FramePaceError::EncodingFailed {
                reason: other.to_string(),
            },
        }
    }
}
