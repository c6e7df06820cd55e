//! Ingest Server Demo
//!
//! Runs the in-process ingest backend on 127.0.0.1:5000 (or the address given
//! as the first argument) and logs what arrives. Pair it with the
//! `stream_test_pattern` demo.

use framepace::{init_logging, IngestServer, Payload};
use std::net::SocketAddr;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging("info");

    let addr: SocketAddr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5000".to_string())
        .parse()?;

    let server = IngestServer::bind(addr).await?;
    let mut received = server.subscribe();
    server.spawn();
    info!("🚀 Ingest server ready at {}", server.url());

    let mut frames = 0u64;
    loop {
        let event = match received.recv().await {
            Ok(event) => event,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                info!("Skipped {} messages", skipped);
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };

        match &event.message.payload {
            Payload::Json(value) => {
                info!("📝 [{}] {} {}", event.connection_id, event.message.label, value);
            }
            Payload::Binary(data) => {
                frames += 1;
                if frames % 15 == 0 {
                    info!(
                        "📡 [{}] {} frames received, latest {} bytes",
                        event.connection_id,
                        frames,
                        data.len()
                    );
                }
            }
        }
    }

    Ok(())
}
