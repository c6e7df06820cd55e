//! Event system for capture loop notifications

use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

/// Summary of one completed capture cycle
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CycleRecord {
    /// Cycle number within the current run, from 0
    pub sequence: u64,
    /// Cycle start on the loop's monotonic clock, relative to the run start
    pub started_at_ms: f64,
    /// Size of the encoded payload, 0 when encoding failed
    pub payload_bytes: usize,
    /// Whether the payload was handed to the channel
    pub transmitted: bool,
    /// Delay chosen by the controller before the next cycle
    pub next_delay_ms: f64,
}

/// Why a capture loop went idle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum StopReason {
    /// `stop` was called
    Requested,
    /// The capture source failed
    SourceUnavailable,
}

/// Events emitted by a capture loop
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// The loop left the idle state
    Started,
    /// A cycle finished, whether or not its frame went out
    CycleCompleted {
        /// What the cycle did
        record: CycleRecord,
    },
    /// The capture source could not produce a frame; the loop stops
    SourceUnavailable {
        /// Reason reported by the source
        reason: String,
    },
    /// A frame could not be encoded; the cycle skipped its send
    EncodingFailed {
        /// Reason reported by the encoder
        reason: String,
    },
    /// A frame could not be handed to the channel
    TransmissionFailed {
        /// Label of the dropped message
        label: String,
        /// Reason reported by the channel
        reason: String,
    },
    /// The loop went idle
    Stopped {
        /// Why it stopped
        reason: StopReason,
    },
}

impl StreamEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            StreamEvent::Started => "started",
            StreamEvent::CycleCompleted { .. } => "cycle_completed",
            StreamEvent::SourceUnavailable { .. } => "source_unavailable",
            StreamEvent::EncodingFailed { .. } => "encoding_failed",
            StreamEvent::TransmissionFailed { .. } => "transmission_failed",
            StreamEvent::Stopped { .. } => "stopped",
        }
    }

    /// Check if this is an error event
    pub fn is_error_event(&self) -> bool {
        matches!(
            self,
            StreamEvent::SourceUnavailable { .. }
                | StreamEvent::EncodingFailed { .. }
                | StreamEvent::TransmissionFailed { .. }
        )
    }
}

/// Stream of loop events for async iteration
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::UnboundedReceiver<StreamEvent>,
}

impl EventStream {
    /// Create a new event stream with a receiver
    pub fn new(receiver: mpsc::UnboundedReceiver<StreamEvent>) -> Self {
        Self { receiver }
    }

    /// Get the next event from the stream
    pub async fn next(&mut self) -> Option<StreamEvent> {
        self.receiver.recv().await
    }

    /// Try to get the next event without blocking
    pub fn try_next(&mut self) -> Result<Option<StreamEvent>, mpsc::error::TryRecvError> {
        match self.receiver.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(mpsc::error::TryRecvError::Empty) => Ok(None),
            Err(mpsc::error::TryRecvError::Disconnected) => {
                Err(mpsc::error::TryRecvError::Disconnected)
            }
        }
    }

    /// Drain every event already queued
    pub fn drain(&mut self) -> Vec<StreamEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.receiver.try_recv() {
            events.push(event);
        }
        events
    }

    /// Close the event stream
    pub fn close(&mut self) {
        self.receiver.close();
    }
}

/// Fan-out of events to every live [`EventStream`]
#[derive(Debug, Default)]
pub(crate) struct EventBus {
    subscribers: Mutex<Vec<mpsc::UnboundedSender<StreamEvent>>>,
}

impl EventBus {
    pub(crate) fn subscribe(&self) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.lock().push(tx);
        EventStream::new(rx)
    }

    pub(crate) fn emit(&self, event: StreamEvent) {
        debug!("Emitting event: {}", event.event_type());
        // Closed streams are dropped on the next emit
        self.subscribers
            .lock()
            .retain(|subscriber| subscriber.send(event.clone()).is_ok());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_types() {
        assert_eq!(StreamEvent::Started.event_type(), "started");
        let failure = StreamEvent::TransmissionFailed {
            label: "streamingvideo".to_string(),
            reason: "channel not connected".to_string(),
        };
        assert_eq!(failure.event_type(), "transmission_failed");
        assert!(failure.is_error_event());
        assert!(!StreamEvent::Stopped {
            reason: StopReason::Requested
        }
        .is_error_event());
    }

    #[test]
    fn test_bus_fans_out_and_prunes_closed_streams() {
        let bus = EventBus::default();
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(StreamEvent::Started);
        assert_eq!(first.try_next().unwrap(), Some(StreamEvent::Started));
        assert_eq!(second.try_next().unwrap(), Some(StreamEvent::Started));

        second.close();
        drop(second);
        bus.emit(StreamEvent::Started);
        assert_eq!(bus.subscribers.lock().len(), 1);
        assert_eq!(first.drain().len(), 1);
    }

    #[test]
    fn test_stream_ends_when_bus_is_dropped() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        bus.emit(StreamEvent::Stopped {
            reason: StopReason::SourceUnavailable,
        });
        drop(bus);

        assert_eq!(
            tokio_test::block_on(events.next()),
            Some(StreamEvent::Stopped {
                reason: StopReason::SourceUnavailable
            })
        );
        assert_eq!(tokio_test::block_on(events.next()), None);
    }
}
