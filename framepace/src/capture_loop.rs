//! The paced capture loop
//!
//! A loop repeatedly captures the latest frame, encodes it, hands it to the
//! channel and asks a [`PacingController`] how long to wait before the next
//! cycle. It is always in one of three states:
//!
//! ```text
//!            start                 timer fires
//!   Idle ───────────────▶ Scheduled ───────────▶ Running
//!    ▲                      │  ▲                    │
//!    │        stop          │  │   cycle finished   │
//!    ├──────────────────────┘  └────────────────────┤
//!    │                                              │
//!    └──── cycle finished after stop, or source ────┘
//!          failure
//! ```
//!
//! Each run is a single tokio task owning its own controller, so two runs
//! never share pacing state and at most one cycle executes at a time.

use crate::config::StreamConfig;
use crate::event::{CycleRecord, EventBus, EventStream, StopReason, StreamEvent};
use framepace_channel::{ChannelMessage, FrameEncoding, TransmissionChannel};
use framepace_core::{FramePaceError, FramePaceResult, PacingConfig, PacingController};
use framepace_diagnostics::{PacingMonitor, PacingStats};
use framepace_media::{CaptureSource, EncodedFrame, FrameEncoder, MediaResult, RasterFrame};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Scheduling state of a capture loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopState {
    /// No cycle pending or executing
    Idle,
    /// Waiting for the timer of the next cycle
    Scheduled,
    /// A cycle is executing
    Running,
}

#[derive(Debug)]
struct Control {
    state: LoopState,
    stop_requested: bool,
    // Bumped on every start so a cancelled task never touches a newer run
    generation: u64,
    cancel: Option<watch::Sender<bool>>,
}

impl Control {
    fn settle_idle(&mut self) {
        self.state = LoopState::Idle;
        self.stop_requested = false;
        self.cancel = None;
    }
}

enum CycleOutcome {
    Reschedule(Duration),
    SourceLost,
}

struct LoopInner {
    source: Arc<dyn CaptureSource>,
    encoder: Arc<dyn FrameEncoder>,
    channel: Arc<dyn TransmissionChannel>,
    pacing: PacingConfig,
    quality: f32,
    frame_label: String,
    frame_encoding: FrameEncoding,
    control: Mutex<Control>,
    cycles_completed: AtomicU64,
    monitor: Mutex<PacingMonitor>,
    events: EventBus,
}

/// Paced capture, encode and send loop
///
/// ```rust,no_run
/// use framepace::{CaptureLoop, StreamConfig, TestPatternSource, JpegFrameEncoder, WebSocketChannel};
///
/// # async fn run() -> Result<(), framepace::FramePaceError> {
/// let config = StreamConfig::default();
/// let channel = WebSocketChannel::connect_to(config.endpoint_url()).await?;
/// let capture_loop = CaptureLoop::new(
///     TestPatternSource::new(config.resolution()),
///     JpegFrameEncoder::new(),
///     channel,
///     config,
/// )?;
/// capture_loop.start()?;
/// # Ok(())
/// # }
/// ```
pub struct CaptureLoop {
    inner: Arc<LoopInner>,
}

impl fmt::Debug for CaptureLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CaptureLoop")
            .field("state", &self.state())
            .field("pacing", &self.inner.pacing)
            .field("cycles_completed", &self.cycles_completed())
            .finish_non_exhaustive()
    }
}

impl CaptureLoop {
    /// Create an idle loop, validating the configuration
    ///
    /// The source must deliver frames at the configured resolution.
    pub fn new<S, E, C>(source: S, encoder: E, channel: C, config: StreamConfig) -> FramePaceResult<Self>
    where
        S: CaptureSource + 'static,
        E: FrameEncoder + 'static,
        C: TransmissionChannel + 'static,
    {
        config.validate()?;
        let pacing = config.pacing_config()?;

        if source.resolution() != config.resolution() {
            return Err(FramePaceError::InvalidConfiguration {
                message: format!(
                    "capture source delivers {} but {} is configured",
                    source.resolution(),
                    config.resolution()
                ),
            });
        }

        Ok(Self {
            inner: Arc::new(LoopInner {
                source: Arc::new(source),
                encoder: Arc::new(encoder),
                channel: Arc::new(channel),
                pacing,
                quality: config.jpeg_quality,
                frame_label: config.frame_label,
                frame_encoding: config.frame_encoding,
                control: Mutex::new(Control {
                    state: LoopState::Idle,
                    stop_requested: false,
                    generation: 0,
                    cancel: None,
                }),
                cycles_completed: AtomicU64::new(0),
                monitor: Mutex::new(PacingMonitor::new(config.stats_window)),
                events: EventBus::default(),
            }),
        })
    }

    /// Begin pacing; the first cycle fires immediately
    ///
    /// Does nothing if a run is already scheduled or executing, except that
    /// a stop requested during the executing cycle is withdrawn.
    pub fn start(&self) -> FramePaceResult<()> {
        let runtime = Handle::try_current().map_err(|e| FramePaceError::Initialization {
            reason: format!("capture loop needs a tokio runtime: {}", e),
        })?;

        let (generation, cancel_rx) = {
            let mut control = self.inner.control.lock();
            match control.state {
                LoopState::Scheduled => return Ok(()),
                LoopState::Running => {
                    if control.stop_requested {
                        debug!("Withdrawing pending stop");
                        control.stop_requested = false;
                    }
                    return Ok(());
                }
                LoopState::Idle => {}
            }

            let (cancel_tx, cancel_rx) = watch::channel(false);
            control.generation += 1;
            control.state = LoopState::Scheduled;
            control.stop_requested = false;
            control.cancel = Some(cancel_tx);

            // Transitions are announced under the lock so events follow state order
            self.inner.monitor.lock().reset();
            self.inner.events.emit(StreamEvent::Started);
            (control.generation, cancel_rx)
        };

        info!(
            target_fps = self.inner.pacing.target_fps(),
            generation, "Capture loop started"
        );

        runtime.spawn(run(self.inner.clone(), generation, cancel_rx));
        Ok(())
    }

    /// Stop pacing
    ///
    /// A pending cycle is cancelled before this returns. An executing cycle
    /// finishes its send and then the loop goes idle. Stopping an idle loop
    /// does nothing.
    pub fn stop(&self) {
        let cancelled = {
            let mut control = self.inner.control.lock();
            match control.state {
                LoopState::Idle => false,
                LoopState::Running => {
                    control.stop_requested = true;
                    false
                }
                LoopState::Scheduled => {
                    control.state = LoopState::Idle;
                    if let Some(cancel) = control.cancel.take() {
                        let _ = cancel.send(true);
                    }
                    self.inner.events.emit(StreamEvent::Stopped {
                        reason: StopReason::Requested,
                    });
                    true
                }
            }
        };

        if cancelled {
            info!("Capture loop stopped");
        }
    }

    /// Current scheduling state
    pub fn state(&self) -> LoopState {
        self.inner.control.lock().state
    }

    /// Whether a cycle is executing right now
    pub fn is_running_cycle(&self) -> bool {
        self.state() == LoopState::Running
    }

    /// Cycles completed over the lifetime of this loop
    pub fn cycles_completed(&self) -> u64 {
        self.inner.cycles_completed.load(Ordering::Relaxed)
    }

    /// Pacing configuration in use
    pub fn pacing_config(&self) -> &PacingConfig {
        &self.inner.pacing
    }

    /// Subscribe to loop events
    pub fn events(&self) -> EventStream {
        self.inner.events.subscribe()
    }

    /// Achieved pace of the current run
    pub fn stats(&self) -> PacingStats {
        self.inner.monitor.lock().stats()
    }
}

impl Drop for CaptureLoop {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run(inner: Arc<LoopInner>, generation: u64, mut cancel: watch::Receiver<bool>) {
    let mut controller = match PacingController::new(inner.pacing) {
        Ok(controller) => controller,
        Err(e) => {
            // Configuration was validated in `new`, so this is unreachable in practice
            warn!("Capture loop cannot create its controller: {}", e);
            inner.go_idle(generation, StopReason::Requested);
            return;
        }
    };
    let epoch = Instant::now();
    let mut delay = Duration::ZERO;
    let mut sequence = 0u64;

    loop {
        if delay.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.changed() => return,
            }
        }

        // Fire only if this run is still the scheduled one
        {
            let mut control = inner.control.lock();
            if control.generation != generation || control.state != LoopState::Scheduled {
                return;
            }
            control.state = LoopState::Running;
        }

        let outcome = inner.run_cycle(&mut controller, epoch, sequence);
        sequence += 1;

        // Decided under the same lock `start` takes, so a withdrawn stop is honoured
        let stopped = {
            let mut control = inner.control.lock();
            let reason = match outcome {
                CycleOutcome::Reschedule(next) if !control.stop_requested => {
                    control.state = LoopState::Scheduled;
                    delay = next;
                    None
                }
                CycleOutcome::Reschedule(_) => Some(StopReason::Requested),
                CycleOutcome::SourceLost => Some(StopReason::SourceUnavailable),
            };
            if let Some(reason) = reason {
                control.settle_idle();
                inner.events.emit(StreamEvent::Stopped { reason });
            }
            reason
        };

        if let Some(reason) = stopped {
            info!(?reason, "Capture loop stopped");
            return;
        }
    }
}

impl LoopInner {
    fn run_cycle(
        &self,
        controller: &mut PacingController,
        epoch: Instant,
        sequence: u64,
    ) -> CycleOutcome {
        let started_at_ms = epoch.elapsed().as_secs_f64() * 1000.0;

        let frame = match self.source.capture_frame() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(sequence, "Capture source unavailable: {}", e);
                self.events.emit(StreamEvent::SourceUnavailable {
                    reason: e.to_string(),
                });
                return CycleOutcome::SourceLost;
            }
        };

        let mut payload_bytes = 0;
        let mut transmitted = false;
        match self.encode(&frame) {
            Ok(encoded) => {
                payload_bytes = encoded.len();
                let message = ChannelMessage::frame(
                    &self.frame_label,
                    self.frame_encoding,
                    encoded.mime_type,
                    encoded.data,
                );
                match self.channel.send(message) {
                    Ok(()) => transmitted = true,
                    Err(e) => {
                        warn!(sequence, "Frame not sent: {}", e);
                        self.events.emit(StreamEvent::TransmissionFailed {
                            label: self.frame_label.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }
            Err(e) => {
                warn!(sequence, "Frame not encoded: {}", e);
                self.events.emit(StreamEvent::EncodingFailed {
                    reason: e.to_string(),
                });
            }
        }

        let next_delay_ms = controller.compute_next_delay(started_at_ms);
        self.monitor.lock().record_cycle(started_at_ms, next_delay_ms);
        self.cycles_completed.fetch_add(1, Ordering::Relaxed);

        let record = CycleRecord {
            sequence,
            started_at_ms,
            payload_bytes,
            transmitted,
            next_delay_ms,
        };
        debug!(
            sequence,
            started_at_ms, payload_bytes, transmitted, next_delay_ms, "Cycle completed"
        );
        self.events.emit(StreamEvent::CycleCompleted { record });

        CycleOutcome::Reschedule(
            Duration::try_from_secs_f64(next_delay_ms / 1000.0).unwrap_or(Duration::MAX),
        )
    }

    // The cycle body is synchronous. Encoding is CPU bound, so on a
    // multi-thread runtime the worker is handed off while it runs; a
    // current-thread runtime stalls its other tasks for the encode.
    fn encode(&self, frame: &RasterFrame) -> MediaResult<EncodedFrame> {
        match Handle::try_current().map(|handle| handle.runtime_flavor()) {
            Ok(RuntimeFlavor::MultiThread) => {
                tokio::task::block_in_place(|| self.encoder.encode(frame, self.quality))
            }
            _ => self.encoder.encode(frame, self.quality),
        }
    }

    fn go_idle(&self, generation: u64, reason: StopReason) {
        {
            let mut control = self.control.lock();
            if control.generation != generation {
                return;
            }
            control.settle_idle();
            self.events.emit(StreamEvent::Stopped { reason });
        }
        info!(?reason, "Capture loop stopped");
    }
}
