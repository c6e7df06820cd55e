//! # framepace channel
//!
//! The persistent duplex channel between the capture client and the frame
//! ingest backend. Messages are named by a label, the way the backend's
//! handlers are registered, and sends are fire-and-forget.

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod client;
pub mod message;
pub mod server;
pub mod wire;

// Re-export main types
pub use client::{ChannelSender, ChannelStats, MessageHandler, TransmissionChannel, WebSocketChannel};
pub use message::{
    ChannelMessage, FrameEncoding, Payload, CONNECTED_LABEL, CONNECTED_REPLY, CONTROL_LABEL, FRAME_LABEL,
    START_PROCESSING,
};
pub use server::{IngestEvent, IngestServer};
