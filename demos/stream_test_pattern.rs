//! Test Pattern Streaming Demo
//!
//! Streams a synthetic moving gradient to the backend named in the stream
//! configuration and reports the achieved frame rate once per second.
//!
//! ```text
//! cargo run --example stream_test_pattern -- [config.json] [seconds]
//! ```

use framepace::{
    init_logging, JpegFrameEncoder, StreamConfig, StreamEvent, StreamSession, TestPatternSource,
};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info,framepace=debug");

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => StreamConfig::from_json_file(path)?,
        None => StreamConfig::default(),
    };
    let seconds: u64 = match args.next() {
        Some(value) => value.parse()?,
        None => 10,
    };

    info!(
        "🎥 Streaming {}x{} at {} fps to {}",
        config.width,
        config.height,
        config.target_fps,
        config.endpoint_url()
    );

    let source = TestPatternSource::new(config.resolution());
    let session = StreamSession::connect(config, source, JpegFrameEncoder::new()).await?;
    let mut events = session.events();
    session.start()?;

    let mut report = tokio::time::interval(Duration::from_secs(1));
    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            _ = report.tick() => {
                let stats = session.pacing_stats();
                info!(
                    "📊 {:.1} fps achieved, mean interval {:.1} ms, jitter {:.1} ms",
                    stats.achieved_fps, stats.mean_interval_ms, stats.jitter_ms
                );
            }
            Some(event) = events.next() => {
                if event.is_error_event() {
                    warn!("⚠️ {:?}", event);
                }
                if let StreamEvent::Stopped { reason } = event {
                    info!("Capture loop stopped: {:?}", reason);
                    break;
                }
            }
        }
    }

    let channel = session.channel_stats();
    session.close().await;
    info!(
        "✅ Sent {} messages ({} bytes), {} send failures",
        channel.messages_sent, channel.bytes_sent, channel.send_failures
    );
    Ok(())
}
