//! Wire format of channel messages
//!
//! JSON payloads travel as WebSocket text frames holding an envelope
//! `{"event": <label>, "data": <value>}`. Binary payloads travel as binary
//! frames laid out as:
//!
//! ```text
//! +----------------------+-------------+-----------------+
//! | label length (varint)| label (utf8)| payload bytes   |
//! +----------------------+-------------+-----------------+
//! ```
//!
//! The length prefix uses the QUIC variable-length integer encoding
//! (RFC 9000, Section 16).

use crate::message::{ChannelMessage, Payload};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use framepace_core::{FramePaceError, FramePaceResult};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use tokio_tungstenite::tungstenite::Message;

/// Largest value representable as a varint
pub const MAX_VARINT: u64 = 0x3FFF_FFFF_FFFF_FFFF;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope {
    event: String,
    #[serde(default)]
    data: serde_json::Value,
}

fn invalid(reason: impl Into<String>) -> FramePaceError {
    FramePaceError::InvalidMessage {
        reason: reason.into(),
    }
}

/// Encode a variable-length integer
pub fn encode_varint(value: u64, buf: &mut BytesMut) -> FramePaceResult<()> {
    if value < 0x40 {
        buf.put_u8(value as u8);
    } else if value < 0x4000 {
        buf.put_u16((0x4000 | value) as u16);
    } else if value < 0x4000_0000 {
        buf.put_u32((0x8000_0000 | value) as u32);
    } else if value <= MAX_VARINT {
        buf.put_u64(0xC000_0000_0000_0000 | value);
    } else {
        return Err(invalid(format!("value too large for varint: {}", value)));
    }
    Ok(())
}

/// Decode a variable-length integer
pub fn decode_varint(buf: &mut Cursor<&[u8]>) -> FramePaceResult<u64> {
    if !buf.has_remaining() {
        return Err(invalid("no data available for varint"));
    }

    let first_byte = buf.get_u8();
    let high = (first_byte & 0x3F) as u64;
    // Remaining bytes after the first, by two-bit prefix
    let extra = match first_byte >> 6 {
        0 => 0,
        1 => 1,
        2 => 3,
        _ => 7,
    };
    if buf.remaining() < extra {
        return Err(invalid(format!(
            "insufficient data for varint: need {} bytes, have {}",
            extra,
            buf.remaining()
        )));
    }
    if extra == 0 {
        return Ok(high);
    }
    let low = buf.get_uint(extra);
    Ok((high << (8 * extra)) | low)
}

/// Encode a channel message into a WebSocket frame
pub fn encode_message(message: &ChannelMessage) -> FramePaceResult<Message> {
    match &message.payload {
        Payload::Json(value) => {
            let envelope = Envelope {
                event: message.label.clone(),
                data: value.clone(),
            };
            let text = serde_json::to_string(&envelope).map_err(|e| invalid(e.to_string()))?;
            Ok(Message::Text(text))
        }
        Payload::Binary(data) => {
            let label = message.label.as_bytes();
            let mut buf = BytesMut::with_capacity(label.len() + data.len() + 8);
            encode_varint(label.len() as u64, &mut buf)?;
            buf.extend_from_slice(label);
            buf.extend_from_slice(data);
            Ok(Message::Binary(buf.to_vec()))
        }
    }
}

/// Decode a WebSocket frame into a channel message
///
/// Returns `Ok(None)` for control frames (ping, pong, close) that carry no
/// channel message.
pub fn decode_message(frame: Message) -> FramePaceResult<Option<ChannelMessage>> {
    match frame {
        Message::Text(text) => {
            let envelope: Envelope =
                serde_json::from_str(&text).map_err(|e| invalid(e.to_string()))?;
            Ok(Some(ChannelMessage::new(
                envelope.event,
                Payload::Json(envelope.data),
            )))
        }
        Message::Binary(data) => {
            let mut cursor = Cursor::new(data.as_slice());
            let label_len = decode_varint(&mut cursor)? as usize;
            if cursor.remaining() < label_len {
                return Err(invalid(format!(
                    "label length {} exceeds frame, {} bytes left",
                    label_len,
                    cursor.remaining()
                )));
            }
            let start = cursor.position() as usize;
            let label = std::str::from_utf8(&data[start..start + label_len])
                .map_err(|e| invalid(format!("label is not utf-8: {}", e)))?
                .to_string();
            let payload = Bytes::copy_from_slice(&data[start + label_len..]);
            Ok(Some(ChannelMessage::new(label, Payload::Binary(payload))))
        }
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) | Message::Frame(_) => Ok(None),
    }
}
