//! Channel messages and the labels the ingest backend listens on

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::json;

/// Label of control messages sent to the backend
pub const CONTROL_LABEL: &str = "netin";
/// Label of encoded frame messages
pub const FRAME_LABEL: &str = "streamingvideo";
/// Label of the backend's liveness greeting
pub const CONNECTED_LABEL: &str = "connected";
/// Control text asking the backend to start processing frames
pub const START_PROCESSING: &str = "Run Estimator!";
/// Control text acknowledging the backend's greeting
pub const CONNECTED_REPLY: &str = "Connected!";

/// How encoded frames are carried on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameEncoding {
    /// Raw bytes in a binary frame
    #[default]
    Binary,
    /// `{"data": "data:<mime>;base64,..."}` in a text frame, as browser
    /// clients emit it
    DataUrl,
}

/// Message body
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Structured data, sent as a text frame
    Json(serde_json::Value),
    /// Opaque bytes, sent as a binary frame
    Binary(Bytes),
}

impl Payload {
    /// Size of the body on the wire, excluding framing
    pub fn len(&self) -> usize {
        match self {
            Payload::Json(value) => value.to_string().len(),
            Payload::Binary(bytes) => bytes.len(),
        }
    }

    /// Whether the body is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The `data` field of a JSON payload, if it is a string
    pub fn data_text(&self) -> Option<&str> {
        match self {
            Payload::Json(value) => value.get("data").and_then(|data| data.as_str()),
            Payload::Binary(_) => None,
        }
    }

    /// Frame bytes, whether sent raw or as a base64 data URL
    ///
    /// Returns `None` for JSON payloads that do not carry a data URL.
    pub fn frame_bytes(&self) -> Option<Bytes> {
        match self {
            Payload::Binary(bytes) => Some(bytes.clone()),
            Payload::Json(_) => {
                let url = self.data_text()?.strip_prefix("data:")?;
                let (_, encoded) = url.split_once(";base64,")?;
                STANDARD.decode(encoded).ok().map(Bytes::from)
            }
        }
    }
}

/// A labelled message travelling over the channel
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelMessage {
    /// Handler name on the receiving side
    pub label: String,
    /// Message body
    pub payload: Payload,
}

impl ChannelMessage {
    /// Create a message
    pub fn new(label: impl Into<String>, payload: Payload) -> Self {
        Self {
            label: label.into(),
            payload,
        }
    }

    /// Control message `{"data": text}` on [`CONTROL_LABEL`]
    pub fn control(text: &str) -> Self {
        Self::labelled_text(CONTROL_LABEL, text)
    }

    /// Message `{"data": text}` on an arbitrary label
    pub fn labelled_text(label: &str, text: &str) -> Self {
        Self::new(label, Payload::Json(json!({ "data": text })))
    }

    /// Encoded frame of type `mime_type` on `label`
    pub fn frame(label: &str, encoding: FrameEncoding, mime_type: &str, data: Bytes) -> Self {
        match encoding {
            FrameEncoding::Binary => Self::new(label, Payload::Binary(data)),
            FrameEncoding::DataUrl => {
                let url = format!("data:{};base64,{}", mime_type, STANDARD.encode(&data));
                Self::labelled_text(label, &url)
            }
        }
    }
}
