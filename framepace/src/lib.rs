//! # framepace - Adaptive Frame Pacing
//!
//! framepace captures frames from a camera-like source, encodes them and
//! streams them to a processing backend at a steady target rate. A PID
//! controller picks the wait before every cycle so that the time between
//! cycle starts converges on the target even when capture, encoding or
//! sending take a variable share of it.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use framepace::{JpegFrameEncoder, StreamConfig, StreamSession, TestPatternSource};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     framepace::init_logging("info");
//!
//!     let config = StreamConfig::default();
//!     let source = TestPatternSource::new(config.resolution());
//!     let session = StreamSession::connect(config, source, JpegFrameEncoder::new()).await?;
//!     session.start()?;
//!
//!     let mut events = session.events();
//!     while let Some(event) = events.next().await {
//!         tracing::info!("Stream event: {:?}", event);
//!     }
//!
//!     Ok(())
//! }
//! ```

#![deny(missing_docs)]
#![warn(clippy::all)]

pub mod capture_loop;
pub mod config;
pub mod event;
pub mod session;

// Re-export core types for easy access
pub use framepace_core::{FramePaceError, FramePaceResult, PacingConfig, PacingController};

pub use framepace_media::{
    CaptureSource, EncodedFrame, FrameEncoder, IdentityEncoder, JpegFrameEncoder,
    LatestFrameSource, MediaError, PixelFormat, RasterFrame, TestPatternSource, VideoResolution,
};

pub use framepace_channel::{
    ChannelMessage, ChannelStats, FrameEncoding, IngestEvent, IngestServer, Payload,
    TransmissionChannel, WebSocketChannel,
};

pub use framepace_diagnostics::{init_logging, try_init_logging, PacingStats};

pub use capture_loop::{CaptureLoop, LoopState};
pub use config::StreamConfig;
pub use event::{CycleRecord, EventStream, StopReason, StreamEvent};
pub use session::StreamSession;
