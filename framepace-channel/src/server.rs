//! Minimal ingest backend
//!
//! Accepts channel connections, greets each one on [`CONNECTED_LABEL`] and
//! republishes every decoded message to subscribers. It stands in for the
//! real processing backend in demos and integration tests.

use crate::message::{ChannelMessage, CONNECTED_LABEL};
use crate::wire::{decode_message, encode_message};
use dashmap::DashMap;
use framepace_core::{FramePaceError, FramePaceResult};
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use uuid::Uuid;

/// Capacity of the subscriber broadcast buffer
const EVENT_BUFFER: usize = 256;

/// A message received from one connection
#[derive(Debug, Clone)]
pub struct IngestEvent {
    /// Connection the message arrived on
    pub connection_id: String,
    /// Decoded message
    pub message: ChannelMessage,
}

#[derive(Debug)]
struct ServerState {
    connections: DashMap<String, SocketAddr>,
    label_counts: DashMap<String, u64>,
    events: broadcast::Sender<IngestEvent>,
}

/// WebSocket server accepting frame streams
#[derive(Debug, Clone)]
pub struct IngestServer {
    local_addr: SocketAddr,
    listener: Arc<TcpListener>,
    state: Arc<ServerState>,
}

impl IngestServer {
    /// Bind the server; port 0 picks a free port
    pub async fn bind(addr: SocketAddr) -> FramePaceResult<Self> {
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            FramePaceError::Initialization {
                reason: format!("failed to bind {}: {}", addr, e),
            }
        })?;
        let local_addr = listener.local_addr()?;
        let (events, _) = broadcast::channel(EVENT_BUFFER);

        Ok(Self {
            local_addr,
            listener: Arc::new(listener),
            state: Arc::new(ServerState {
                connections: DashMap::new(),
                label_counts: DashMap::new(),
                events,
            }),
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// `ws://` URL clients should connect to
    pub fn url(&self) -> String {
        format!("ws://{}", self.local_addr)
    }

    /// Subscribe to received messages
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.state.events.subscribe()
    }

    /// Number of open connections
    pub fn connection_count(&self) -> usize {
        self.state.connections.len()
    }

    /// Messages received on `label` across all connections
    pub fn message_count(&self, label: &str) -> u64 {
        self.state
            .label_counts
            .get(label)
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Accept connections forever
    pub async fn start(&self) {
        tracing::info!("Ingest server listening on {}", self.local_addr);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    tracing::debug!("New connection from {}", addr);
                    tokio::spawn(handle_connection(self.state.clone(), stream, addr));
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Run [`start`](Self::start) on a background task
    pub fn spawn(&self) -> JoinHandle<()> {
        let server = self.clone();
        tokio::spawn(async move { server.start().await })
    }
}

async fn handle_connection(state: Arc<ServerState>, stream: TcpStream, addr: SocketAddr) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let connection_id = Uuid::new_v4().to_string();
    tracing::debug!("WebSocket connection established: {}", connection_id);
    state.connections.insert(connection_id.clone(), addr);

    let (mut sink, mut stream) = ws_stream.split();

    match encode_message(&ChannelMessage::labelled_text(CONNECTED_LABEL, "connected")) {
        Ok(greeting) => {
            if let Err(e) = sink.send(greeting).await {
                tracing::warn!("Failed to greet {}: {}", connection_id, e);
            }
        }
        Err(e) => tracing::error!("Failed to encode greeting: {}", e),
    }

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Close(_)) => break,
            Ok(frame) => match decode_message(frame) {
                Ok(Some(message)) => {
                    *state
                        .label_counts
                        .entry(message.label.clone())
                        .or_insert(0) += 1;
                    // No subscribers is fine
                    let _ = state.events.send(IngestEvent {
                        connection_id: connection_id.clone(),
                        message,
                    });
                }
                Ok(None) => {}
                Err(e) => tracing::warn!("Invalid message on {}: {}", connection_id, e),
            },
            Err(e) => {
                tracing::debug!("Connection {} error: {}", connection_id, e);
                break;
            }
        }
    }

    state.connections.remove(&connection_id);
    tracing::debug!("Connection {} closed", connection_id);
}
