//! Capture loop scheduling tests
//!
//! Time is paused in every test, so the tokio clock only advances when all
//! tasks are waiting and the loop's pacing is deterministic.

use framepace::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, Weak};
use std::time::Duration;
use tokio::time::sleep;

const TARGET_MS: f64 = 1000.0 / 15.0;

/// Channel that records what it is given
#[derive(Default)]
struct RecordingChannel {
    sent: Mutex<Vec<ChannelMessage>>,
    failing: AtomicBool,
}

impl RecordingChannel {
    fn failing() -> Self {
        let channel = Self::default();
        channel.failing.store(true, Ordering::SeqCst);
        channel
    }

    fn sent(&self) -> Vec<ChannelMessage> {
        self.sent.lock().unwrap().clone()
    }
}

impl TransmissionChannel for RecordingChannel {
    fn send(&self, message: ChannelMessage) -> FramePaceResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(FramePaceError::TransmissionFailure {
                label: message.label,
                reason: "link down".to_string(),
            });
        }
        self.sent.lock().unwrap().push(message);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        !self.failing.load(Ordering::SeqCst)
    }
}

/// Encoder that always fails
struct BrokenEncoder;

impl FrameEncoder for BrokenEncoder {
    fn encode(&self, _frame: &RasterFrame, _quality: f32) -> Result<EncodedFrame, MediaError> {
        Err(MediaError::EncodingFailed {
            codec: "broken".to_string(),
            reason: "out of memory".to_string(),
        })
    }

    fn mime_type(&self) -> &'static str {
        "application/x-broken"
    }
}

/// Source that runs a hook against its own loop during the first capture
struct HookSource {
    pattern: TestPatternSource,
    owner: OnceLock<Weak<CaptureLoop>>,
    hook: fn(&CaptureLoop),
}

impl HookSource {
    fn new(hook: fn(&CaptureLoop)) -> Self {
        Self {
            pattern: TestPatternSource::new(VideoResolution::new(8, 8)),
            owner: OnceLock::new(),
            hook,
        }
    }
}

impl CaptureSource for HookSource {
    fn capture_frame(&self) -> Result<RasterFrame, MediaError> {
        let first = self.pattern.captures() == 0;
        if first {
            if let Some(owner) = self.owner.get().and_then(Weak::upgrade) {
                (self.hook)(&owner);
            }
        }
        self.pattern.capture_frame()
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn resolution(&self) -> VideoResolution {
        self.pattern.resolution()
    }
}

fn config() -> StreamConfig {
    StreamConfig::default().with_resolution(VideoResolution::new(8, 8))
}

fn pattern() -> Arc<TestPatternSource> {
    Arc::new(TestPatternSource::new(VideoResolution::new(8, 8)))
}

fn count(events: &[StreamEvent], event_type: &str) -> usize {
    events
        .iter()
        .filter(|event| event.event_type() == event_type)
        .count()
}

fn cycle_records(events: &[StreamEvent]) -> Vec<CycleRecord> {
    events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::CycleCompleted { record } => Some(*record),
            _ => None,
        })
        .collect()
}

#[tokio::test(start_paused = true)]
async fn test_paces_near_target_rate() {
    let source = pattern();
    let channel = Arc::new(RecordingChannel::default());
    let capture_loop =
        CaptureLoop::new(source.clone(), IdentityEncoder, channel.clone(), config()).unwrap();

    capture_loop.start().unwrap();
    sleep(Duration::from_millis(2000)).await;

    let captures = source.captures();
    assert!((28..=33).contains(&captures), "{} captures in 2s", captures);
    assert_eq!(channel.sent().len() as u64, captures);
    assert_eq!(capture_loop.cycles_completed(), captures);

    let stats = capture_loop.stats();
    assert!(
        (13.5..=16.5).contains(&stats.achieved_fps),
        "achieved {} fps",
        stats.achieved_fps
    );
    assert_eq!(capture_loop.state(), LoopState::Scheduled);
}

#[tokio::test(start_paused = true)]
async fn test_frames_carry_label_and_payload() {
    let channel = Arc::new(RecordingChannel::default());
    let capture_loop =
        CaptureLoop::new(pattern(), IdentityEncoder, channel.clone(), config()).unwrap();
    let mut events = capture_loop.events();

    capture_loop.start().unwrap();
    sleep(Duration::from_millis(10)).await;

    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].label, "streamingvideo");
    assert_eq!(sent[0].payload.len(), 8 * 8 * 3);

    let records = cycle_records(&events.drain());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sequence, 0);
    assert_eq!(records[0].payload_bytes, 8 * 8 * 3);
    assert!(records[0].transmitted);
    // The first cycle always asks for exactly the target interval
    assert!((records[0].next_delay_ms - TARGET_MS).abs() < 1e-9);
}

#[tokio::test(start_paused = true)]
async fn test_data_url_frames() {
    let channel = Arc::new(RecordingChannel::default());
    let config = StreamConfig {
        frame_encoding: FrameEncoding::DataUrl,
        ..config()
    };
    let capture_loop =
        CaptureLoop::new(pattern(), IdentityEncoder, channel.clone(), config).unwrap();

    capture_loop.start().unwrap();
    sleep(Duration::from_millis(10)).await;

    let sent = channel.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].label, "streamingvideo");
    assert!(sent[0]
        .payload
        .data_text()
        .unwrap()
        .starts_with("data:application/octet-stream;base64,"));
    assert_eq!(sent[0].payload.frame_bytes().unwrap().len(), 8 * 8 * 3);
}

#[test]
fn test_source_resolution_must_match_config() {
    let channel = Arc::new(RecordingChannel::default());
    let err = CaptureLoop::new(
        TestPatternSource::new(VideoResolution::new(64, 64)),
        IdentityEncoder,
        channel.clone(),
        config(),
    )
    .unwrap_err();

    assert_eq!(err.error_code(), "INVALID_CONFIGURATION");
    assert!(err.to_string().contains("64x64"));
    assert!(err.to_string().contains("8x8"));
    assert!(channel.sent().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_double_start_schedules_one_chain() {
    let source = pattern();
    let capture_loop = CaptureLoop::new(
        source.clone(),
        IdentityEncoder,
        RecordingChannel::default(),
        config(),
    )
    .unwrap();
    let mut events = capture_loop.events();

    capture_loop.start().unwrap();
    capture_loop.start().unwrap();
    sleep(Duration::from_millis(1000)).await;
    capture_loop.start().unwrap();
    sleep(Duration::from_millis(1000)).await;

    let captures = source.captures();
    assert!((28..=33).contains(&captures), "{} captures in 2s", captures);
    assert_eq!(count(&events.drain(), "started"), 1);
}

#[tokio::test(start_paused = true)]
async fn test_stop_while_scheduled_cancels_pending_cycle() {
    let source = pattern();
    let capture_loop = CaptureLoop::new(
        source.clone(),
        IdentityEncoder,
        RecordingChannel::default(),
        config(),
    )
    .unwrap();
    let mut events = capture_loop.events();

    capture_loop.start().unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(capture_loop.state(), LoopState::Scheduled);
    assert_eq!(source.captures(), 1);

    capture_loop.stop();
    assert_eq!(capture_loop.state(), LoopState::Idle);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(source.captures(), 1);

    let events = events.drain();
    assert_eq!(events.first(), Some(&StreamEvent::Started));
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Stopped {
            reason: StopReason::Requested
        })
    );

    // Stopping twice is harmless
    capture_loop.stop();
    assert_eq!(capture_loop.state(), LoopState::Idle);
}

#[tokio::test(start_paused = true)]
async fn test_stop_before_first_fire() {
    let source = pattern();
    let capture_loop = CaptureLoop::new(
        source.clone(),
        IdentityEncoder,
        RecordingChannel::default(),
        config(),
    )
    .unwrap();

    capture_loop.start().unwrap();
    capture_loop.stop();
    sleep(Duration::from_millis(500)).await;
    assert_eq!(source.captures(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_stop_during_cycle_finishes_send() {
    let source = Arc::new(HookSource::new(|capture_loop| {
        assert!(capture_loop.is_running_cycle());
        capture_loop.stop();
        // The executing cycle is not interrupted
        assert_eq!(capture_loop.state(), LoopState::Running);
    }));
    let channel = Arc::new(RecordingChannel::default());
    let capture_loop = Arc::new(
        CaptureLoop::new(source.clone(), IdentityEncoder, channel.clone(), config()).unwrap(),
    );
    let _ = source.owner.set(Arc::downgrade(&capture_loop));
    let mut events = capture_loop.events();

    capture_loop.start().unwrap();
    sleep(Duration::from_millis(1000)).await;

    assert_eq!(source.pattern.captures(), 1);
    assert_eq!(channel.sent().len(), 1);
    assert_eq!(capture_loop.state(), LoopState::Idle);

    let events = events.drain();
    assert_eq!(count(&events, "cycle_completed"), 1);
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Stopped {
            reason: StopReason::Requested
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_start_during_cycle_withdraws_stop() {
    let source = Arc::new(HookSource::new(|capture_loop| {
        capture_loop.stop();
        capture_loop.start().unwrap();
    }));
    let capture_loop = Arc::new(
        CaptureLoop::new(
            source.clone(),
            IdentityEncoder,
            RecordingChannel::default(),
            config(),
        )
        .unwrap(),
    );
    let _ = source.owner.set(Arc::downgrade(&capture_loop));

    capture_loop.start().unwrap();
    sleep(Duration::from_millis(1000)).await;

    assert!(source.pattern.captures() > 10);
    assert_eq!(capture_loop.state(), LoopState::Scheduled);
}

#[tokio::test(start_paused = true)]
async fn test_source_failure_goes_idle_once() {
    let source = pattern();
    source.set_available(false);
    let capture_loop = CaptureLoop::new(
        source.clone(),
        IdentityEncoder,
        RecordingChannel::default(),
        config(),
    )
    .unwrap();
    let mut events = capture_loop.events();

    capture_loop.start().unwrap();
    sleep(Duration::from_millis(1000)).await;

    assert_eq!(source.captures(), 1);
    assert_eq!(capture_loop.state(), LoopState::Idle);
    assert_eq!(capture_loop.cycles_completed(), 0);

    let events = events.drain();
    assert_eq!(count(&events, "source_unavailable"), 1);
    assert_eq!(
        events.last(),
        Some(&StreamEvent::Stopped {
            reason: StopReason::SourceUnavailable
        })
    );

    // The loop can be started again once the device is back
    source.set_available(true);
    capture_loop.start().unwrap();
    sleep(Duration::from_millis(200)).await;
    assert!(source.captures() > 2);
}

#[tokio::test(start_paused = true)]
async fn test_send_failure_keeps_pacing() {
    let source = pattern();
    let capture_loop = CaptureLoop::new(
        source.clone(),
        IdentityEncoder,
        RecordingChannel::failing(),
        config(),
    )
    .unwrap();
    let mut events = capture_loop.events();

    capture_loop.start().unwrap();
    sleep(Duration::from_millis(1000)).await;

    let captures = source.captures();
    assert!(captures >= 14, "{} captures", captures);
    assert_eq!(capture_loop.state(), LoopState::Scheduled);

    let events = events.drain();
    assert_eq!(count(&events, "transmission_failed") as u64, captures);
    assert!(cycle_records(&events).iter().all(|record| !record.transmitted));
}

#[tokio::test(start_paused = true)]
async fn test_encode_failure_skips_send() {
    let source = pattern();
    let channel = Arc::new(RecordingChannel::default());
    let capture_loop =
        CaptureLoop::new(source.clone(), BrokenEncoder, channel.clone(), config()).unwrap();
    let mut events = capture_loop.events();

    capture_loop.start().unwrap();
    sleep(Duration::from_millis(500)).await;

    assert!(source.captures() >= 7);
    assert!(channel.sent().is_empty());

    let events = events.drain();
    assert_eq!(count(&events, "encoding_failed") as u64, source.captures());
    assert!(cycle_records(&events)
        .iter()
        .all(|record| record.payload_bytes == 0));
}

#[tokio::test(start_paused = true)]
async fn test_restart_uses_fresh_controller() {
    let source = pattern();
    let capture_loop = CaptureLoop::new(
        source.clone(),
        IdentityEncoder,
        RecordingChannel::default(),
        config(),
    )
    .unwrap();
    let mut events = capture_loop.events();

    capture_loop.start().unwrap();
    sleep(Duration::from_millis(500)).await;
    capture_loop.stop();
    let first_run = source.captures();
    events.drain();

    sleep(Duration::from_millis(100)).await;
    capture_loop.start().unwrap();
    sleep(Duration::from_millis(10)).await;

    assert_eq!(source.captures(), first_run + 1);
    let records = cycle_records(&events.drain());
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].sequence, 0);
    assert!(records[0].started_at_ms < 1.0);
    assert!((records[0].next_delay_ms - TARGET_MS).abs() < 1e-9);
    assert_eq!(capture_loop.stats().cycles, 1);
}

#[tokio::test(start_paused = true)]
async fn test_independent_loops_do_not_interfere() {
    let first = pattern();
    let second = pattern();
    let fast = StreamConfig {
        target_fps: 30.0,
        ..config()
    };

    let slow_loop =
        CaptureLoop::new(first.clone(), IdentityEncoder, RecordingChannel::default(), config())
            .unwrap();
    let fast_loop =
        CaptureLoop::new(second.clone(), IdentityEncoder, RecordingChannel::default(), fast)
            .unwrap();

    slow_loop.start().unwrap();
    fast_loop.start().unwrap();
    sleep(Duration::from_millis(2000)).await;

    assert!((28..=33).contains(&first.captures()));
    assert!((56..=64).contains(&second.captures()));
}

#[tokio::test(start_paused = true)]
async fn test_dropping_loop_stops_it() {
    let source = pattern();
    let capture_loop = CaptureLoop::new(
        source.clone(),
        IdentityEncoder,
        RecordingChannel::default(),
        config(),
    )
    .unwrap();

    capture_loop.start().unwrap();
    sleep(Duration::from_millis(10)).await;
    drop(capture_loop);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(source.captures(), 1);
}
