//! Error types for framepace

use thiserror::Error;

/// Main error type for framepace operations
#[derive(Error, Debug)]
pub enum FramePaceError {
    /// Pacing controller configured with out-of-range values
    #[error("Controller misconfiguration: {field} {reason}")]
    ControllerMisconfiguration {
        /// Offending configuration field
        field: String,
        /// Why the value was rejected
        reason: String,
    },

    /// Capture source could not produce a frame
    #[error("Capture source unavailable: {reason}")]
    SourceUnavailable {
        /// Reason reported by the source
        reason: String,
    },

    /// Frame encoding failed
    #[error("Encoding failed: {reason}")]
    EncodingFailed {
        /// Reason for failure
        reason: String,
    },

    /// A send on the transmission channel did not succeed
    #[error("Transmission failure on '{label}': {reason}")]
    TransmissionFailure {
        /// Message label that failed
        label: String,
        /// Reason for failure
        reason: String,
    },

    /// Channel writer is gone, nothing can be sent anymore
    #[error("Transmission channel closed")]
    ChannelClosed,

    /// Connecting to the remote endpoint failed
    #[error("Connection to {url} failed: {reason}")]
    Connection {
        /// Endpoint URL
        url: String,
        /// Reason for connection failure
        reason: String,
    },

    /// Malformed message on the wire
    #[error("Invalid message: {reason}")]
    InvalidMessage {
        /// Reason the message was rejected
        reason: String,
    },

    /// Invalid stream configuration
    #[error("Invalid configuration: {message}")]
    InvalidConfiguration {
        /// Error message
        message: String,
    },

    /// Initialization error
    #[error("Initialization failed: {reason}")]
    Initialization {
        /// Reason for initialization failure
        reason: String,
    },

    /// I/O error
    #[error("I/O error: {source}")]
    Io {
        /// Underlying I/O error
        #[from]
        source: std::io::Error,
    },
}

/// Result alias used across framepace crates
pub type FramePaceResult<T> = Result<T, FramePaceError>;

impl FramePaceError {
    /// Get error code for programmatic handling
    pub fn error_code(&self) -> String {
        match self {
            FramePaceError::ControllerMisconfiguration { .. } => {
                "CONTROLLER_MISCONFIGURATION".to_string()
            }
            FramePaceError::SourceUnavailable { .. } => "SOURCE_UNAVAILABLE".to_string(),
            FramePaceError::EncodingFailed { .. } => "ENCODING_FAILED".to_string(),
            FramePaceError::TransmissionFailure { .. } => "TRANSMISSION_FAILURE".to_string(),
            FramePaceError::ChannelClosed => "CHANNEL_CLOSED".to_string(),
            FramePaceError::Connection { .. } => "CONNECTION_FAILED".to_string(),
            FramePaceError::InvalidMessage { .. } => "INVALID_MESSAGE".to_string(),
            FramePaceError::InvalidConfiguration { .. } => "INVALID_CONFIGURATION".to_string(),
            FramePaceError::Initialization { .. } => "INITIALIZATION_FAILED".to_string(),
            FramePaceError::Io { .. } => "IO_ERROR".to_string(),
        }
    }

    /// Whether the streaming loop keeps pacing after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FramePaceError::EncodingFailed { .. }
                | FramePaceError::TransmissionFailure { .. }
                | FramePaceError::ChannelClosed
        )
    }

    pub(crate) fn misconfigured(field: &str, reason: impl Into<String>) -> Self {
        FramePaceError::ControllerMisconfiguration {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}
