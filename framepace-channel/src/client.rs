//! Client side of the transmission channel

use crate::message::{ChannelMessage, Payload};
use crate::wire::{decode_message, encode_message};
use dashmap::DashMap;
use framepace_core::{FramePaceError, FramePaceResult};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// How long `close` waits for queued messages to flush
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(1);

/// Callback invoked with the payload of every inbound message on a label
pub type MessageHandler = Arc<dyn Fn(&Payload) + Send + Sync>;

/// Fire-and-forget sink for labelled messages
///
/// `send` only enqueues. It never waits for the peer and never applies
/// backpressure; an `Err` means the message was dropped.
pub trait TransmissionChannel: Send + Sync {
    /// Enqueue a message for transmission
    fn send(&self, message: ChannelMessage) -> FramePaceResult<()>;

    /// Whether the underlying connection is currently open
    fn is_connected(&self) -> bool;
}

impl<T: TransmissionChannel + ?Sized> TransmissionChannel for Arc<T> {
    fn send(&self, message: ChannelMessage) -> FramePaceResult<()> {
        (**self).send(message)
    }

    fn is_connected(&self) -> bool {
        (**self).is_connected()
    }
}

#[derive(Debug, Default)]
struct Counters {
    messages_sent: AtomicU64,
    bytes_sent: AtomicU64,
    send_failures: AtomicU64,
    messages_received: AtomicU64,
}

/// Snapshot of channel traffic counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ChannelStats {
    /// Messages handed to the writer
    pub messages_sent: u64,
    /// Encoded bytes handed to the writer
    pub bytes_sent: u64,
    /// Sends rejected because the channel was down
    pub send_failures: u64,
    /// Inbound messages decoded
    pub messages_received: u64,
}

/// Cloneable sending half of a [`WebSocketChannel`]
///
/// Handlers registered on the channel capture a sender to reply without
/// holding the channel itself.
#[derive(Debug, Clone)]
pub struct ChannelSender {
    outbound: mpsc::UnboundedSender<Message>,
    connected: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl ChannelSender {
    /// Current traffic counters
    pub fn stats(&self) -> ChannelStats {
        ChannelStats {
            messages_sent: self.counters.messages_sent.load(Ordering::Relaxed),
            bytes_sent: self.counters.bytes_sent.load(Ordering::Relaxed),
            send_failures: self.counters.send_failures.load(Ordering::Relaxed),
            messages_received: self.counters.messages_received.load(Ordering::Relaxed),
        }
    }

    fn reject(&self, error: FramePaceError) -> FramePaceError {
        self.counters.send_failures.fetch_add(1, Ordering::Relaxed);
        error
    }
}

impl TransmissionChannel for ChannelSender {
    fn send(&self, message: ChannelMessage) -> FramePaceResult<()> {
        if !self.is_connected() {
            return Err(self.reject(FramePaceError::TransmissionFailure {
                label: message.label,
                reason: "channel not connected".to_string(),
            }));
        }

        let frame = encode_message(&message).map_err(|e| self.reject(e))?;
        let size = frame.len() as u64;

        if self.outbound.send(frame).is_err() {
            self.connected.store(false, Ordering::SeqCst);
            return Err(self.reject(FramePaceError::ChannelClosed));
        }

        self.counters.messages_sent.fetch_add(1, Ordering::Relaxed);
        self.counters.bytes_sent.fetch_add(size, Ordering::Relaxed);
        tracing::trace!("Queued '{}' ({} bytes)", message.label, size);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// Persistent WebSocket connection to the ingest backend
///
/// Create the channel, register inbound handlers with [`on`](Self::on), then
/// [`connect`](Self::connect). Handlers registered before connecting see the
/// backend's greeting. A writer task drains an unbounded queue so that
/// [`send`](TransmissionChannel::send) never blocks; a reader task decodes
/// inbound messages and dispatches them by label.
pub struct WebSocketChannel {
    url: String,
    sender: ChannelSender,
    handlers: Arc<DashMap<String, Vec<MessageHandler>>>,
    pending_outbound: Mutex<Option<mpsc::UnboundedReceiver<Message>>>,
    writer_task: Mutex<Option<JoinHandle<()>>>,
    reader_task: Mutex<Option<JoinHandle<()>>>,
}

impl fmt::Debug for WebSocketChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebSocketChannel")
            .field("url", &self.url)
            .field("connected", &self.sender.is_connected())
            .field("handled_labels", &self.handlers.len())
            .finish_non_exhaustive()
    }
}

impl WebSocketChannel {
    /// Create an unconnected channel to `url`
    pub fn new(url: impl Into<String>) -> Self {
        let (outbound, pending) = mpsc::unbounded_channel();
        Self {
            url: url.into(),
            sender: ChannelSender {
                outbound,
                connected: Arc::new(AtomicBool::new(false)),
                counters: Arc::new(Counters::default()),
            },
            handlers: Arc::new(DashMap::new()),
            pending_outbound: Mutex::new(Some(pending)),
            writer_task: Mutex::new(None),
            reader_task: Mutex::new(None),
        }
    }

    /// Create a channel and connect it immediately
    pub async fn connect_to(url: impl Into<String>) -> FramePaceResult<Self> {
        let channel = Self::new(url);
        channel.connect().await?;
        Ok(channel)
    }

    /// Endpoint URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// A cloneable handle for sending on this channel
    pub fn sender(&self) -> ChannelSender {
        self.sender.clone()
    }

    /// Current traffic counters
    pub fn stats(&self) -> ChannelStats {
        self.sender.stats()
    }

    /// Register a handler for inbound messages on `label`
    pub fn on<F>(&self, label: impl Into<String>, handler: F)
    where
        F: Fn(&Payload) + Send + Sync + 'static,
    {
        self.handlers
            .entry(label.into())
            .or_default()
            .push(Arc::new(handler));
    }

    /// Open the connection and start the writer and reader tasks
    ///
    /// A channel connects at most once. Connecting again, or after
    /// [`close`](Self::close), fails with [`FramePaceError::ChannelClosed`].
    pub async fn connect(&self) -> FramePaceResult<()> {
        let mut outbound_rx = self
            .pending_outbound
            .lock()
            .take()
            .ok_or(FramePaceError::ChannelClosed)?;

        let ws_stream = match connect_async(self.url.as_str()).await {
            Ok((ws_stream, _response)) => ws_stream,
            Err(e) => {
                // Leave the queue in place so the caller may retry
                *self.pending_outbound.lock() = Some(outbound_rx);
                return Err(FramePaceError::Connection {
                    url: self.url.clone(),
                    reason: e.to_string(),
                });
            }
        };

        tracing::info!("Connected to {}", self.url);
        let (mut sink, mut stream) = ws_stream.split();
        self.sender.connected.store(true, Ordering::SeqCst);

        let connected = self.sender.connected.clone();
        let writer = tokio::spawn(async move {
            while let Some(frame) = outbound_rx.recv().await {
                let closing = frame.is_close();
                if let Err(e) = sink.send(frame).await {
                    tracing::warn!("Channel write failed: {}", e);
                    break;
                }
                if closing {
                    break;
                }
            }
            connected.store(false, Ordering::SeqCst);
            let _ = sink.close().await;
            tracing::debug!("Channel writer stopped");
        });

        let connected = self.sender.connected.clone();
        let counters = self.sender.counters.clone();
        let handlers = self.handlers.clone();
        let reader = tokio::spawn(async move {
            while let Some(frame) = stream.next().await {
                match frame {
                    Ok(frame) => match decode_message(frame) {
                        Ok(Some(message)) => {
                            counters.messages_received.fetch_add(1, Ordering::Relaxed);
                            dispatch(&handlers, &message);
                        }
                        Ok(None) => {}
                        Err(e) => tracing::warn!("Dropping malformed inbound message: {}", e),
                    },
                    Err(e) => {
                        tracing::warn!("Channel read failed: {}", e);
                        break;
                    }
                }
            }
            connected.store(false, Ordering::SeqCst);
            tracing::debug!("Channel reader stopped");
        });

        *self.writer_task.lock() = Some(writer);
        *self.reader_task.lock() = Some(reader);
        Ok(())
    }

    /// Flush queued messages, send a close frame and stop both tasks
    pub async fn close(&self) {
        // A channel that never connected just drops its queue
        self.pending_outbound.lock().take();

        if self.sender.outbound.send(Message::Close(None)).is_ok() {
            let writer = self.writer_task.lock().take();
            if let Some(writer) = writer {
                if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, writer).await.is_err() {
                    tracing::warn!("Channel writer did not flush within {:?}", CLOSE_FLUSH_TIMEOUT);
                }
            }
        }

        if let Some(writer) = self.writer_task.lock().take() {
            writer.abort();
        }
        if let Some(reader) = self.reader_task.lock().take() {
            reader.abort();
        }
        self.sender.connected.store(false, Ordering::SeqCst);
        self.handlers.clear();
        tracing::info!("Channel to {} closed", self.url);
    }
}

impl TransmissionChannel for WebSocketChannel {
    fn send(&self, message: ChannelMessage) -> FramePaceResult<()> {
        self.sender.send(message)
    }

    fn is_connected(&self) -> bool {
        self.sender.is_connected()
    }
}

impl Drop for WebSocketChannel {
    fn drop(&mut self) {
        if let Some(writer) = self.writer_task.get_mut().take() {
            writer.abort();
        }
        if let Some(reader) = self.reader_task.get_mut().take() {
            reader.abort();
        }
    }
}

fn dispatch(handlers: &DashMap<String, Vec<MessageHandler>>, message: &ChannelMessage) {
    // Clone out so handlers may register further handlers without deadlocking
    let matched = handlers
        .get(&message.label)
        .map(|entry| entry.value().clone())
        .unwrap_or_default();

    if matched.is_empty() {
        tracing::debug!("No handler for inbound '{}'", message.label);
        return;
    }
    for handler in matched {
        handler(&message.payload);
    }
}
