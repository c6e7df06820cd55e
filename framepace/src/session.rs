//! A capture loop streaming to the ingest backend

use crate::capture_loop::{CaptureLoop, LoopState};
use crate::config::StreamConfig;
use crate::event::EventStream;
use framepace_channel::{
    ChannelMessage, ChannelStats, TransmissionChannel, WebSocketChannel, CONNECTED_LABEL,
    CONNECTED_REPLY, START_PROCESSING,
};
use framepace_core::FramePaceResult;
use framepace_diagnostics::PacingStats;
use framepace_media::{CaptureSource, FrameEncoder};
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Channel plus capture loop, wired the way the browser client is
///
/// The backend greets every connection on [`CONNECTED_LABEL`] and the
/// session answers with [`CONNECTED_REPLY`]. Starting the session asks the
/// backend to begin processing and then starts the loop.
#[derive(Debug)]
pub struct StreamSession {
    id: Uuid,
    config: StreamConfig,
    channel: Arc<WebSocketChannel>,
    capture_loop: CaptureLoop,
}

impl StreamSession {
    /// Connect to `config.endpoint_url()` and prepare an idle loop
    pub async fn connect<S, E>(config: StreamConfig, source: S, encoder: E) -> FramePaceResult<Self>
    where
        S: CaptureSource + 'static,
        E: FrameEncoder + 'static,
    {
        config.validate()?;
        let id = Uuid::new_v4();

        let channel = Arc::new(WebSocketChannel::new(config.endpoint_url()));
        let sender = channel.sender();
        let control_label = config.control_label.clone();
        channel.on(CONNECTED_LABEL, move |_payload| {
            let reply = ChannelMessage::labelled_text(&control_label, CONNECTED_REPLY);
            if let Err(e) = sender.send(reply) {
                warn!("Failed to answer backend greeting: {}", e);
            }
        });
        channel.connect().await?;

        let capture_loop = CaptureLoop::new(source, encoder, channel.clone(), config.clone())?;
        info!(session = %id, url = %channel.url(), "Stream session connected");

        Ok(Self {
            id,
            config,
            channel,
            capture_loop,
        })
    }

    /// Session identifier, used in log fields
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration in use
    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    /// Ask the backend to start processing, then start capturing
    ///
    /// The start message is only sent when the loop is idle.
    pub fn start(&self) -> FramePaceResult<()> {
        if self.capture_loop.state() == LoopState::Idle {
            self.channel.send(ChannelMessage::labelled_text(
                &self.config.control_label,
                START_PROCESSING,
            ))?;
        }
        self.capture_loop.start()
    }

    /// Stop capturing; the channel stays open
    pub fn stop(&self) {
        self.capture_loop.stop();
    }

    /// Stop capturing and close the channel
    pub async fn close(&self) {
        self.capture_loop.stop();
        self.channel.close().await;
        info!(session = %self.id, "Stream session closed");
    }

    /// Whether the channel is open
    pub fn is_connected(&self) -> bool {
        self.channel.is_connected()
    }

    /// The capture loop driving this session
    pub fn capture_loop(&self) -> &CaptureLoop {
        &self.capture_loop
    }

    /// Subscribe to loop events
    pub fn events(&self) -> EventStream {
        self.capture_loop.events()
    }

    /// Achieved pace of the current run
    pub fn pacing_stats(&self) -> PacingStats {
        self.capture_loop.stats()
    }

    /// Channel traffic counters
    pub fn channel_stats(&self) -> ChannelStats {
        self.channel.stats()
    }
}
