//! Capture loop behaviour on a multi-thread runtime
//!
//! These tests run on the real clock, with loop control coming from
//! several threads at once.

use framepace::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, timeout};

struct NullChannel;

impl TransmissionChannel for NullChannel {
    fn send(&self, _message: ChannelMessage) -> FramePaceResult<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

/// Encoder that burns wall-clock time like a large JPEG encode
struct SlowEncoder {
    cost: Duration,
}

impl FrameEncoder for SlowEncoder {
    fn encode(&self, frame: &RasterFrame, quality: f32) -> Result<EncodedFrame, MediaError> {
        std::thread::sleep(self.cost);
        IdentityEncoder.encode(frame, quality)
    }

    fn mime_type(&self) -> &'static str {
        IdentityEncoder.mime_type()
    }
}

fn small_loop<E: FrameEncoder + 'static>(encoder: E) -> CaptureLoop {
    let resolution = VideoResolution::new(8, 8);
    CaptureLoop::new(
        TestPatternSource::new(resolution),
        encoder,
        NullChannel,
        StreamConfig::default().with_resolution(resolution),
    )
    .unwrap()
}

async fn wait_idle(capture_loop: &CaptureLoop) {
    timeout(Duration::from_secs(5), async {
        while capture_loop.state() != LoopState::Idle {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("loop did not go idle");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_start_and_stop_events_alternate_across_threads() {
    let capture_loop = Arc::new(small_loop(IdentityEncoder));
    let mut events = capture_loop.events();

    let controllers: Vec<_> = (0..4)
        .map(|i| {
            let capture_loop = capture_loop.clone();
            tokio::task::spawn_blocking(move || {
                for _ in 0..200 {
                    if i % 2 == 0 {
                        capture_loop.start().unwrap();
                    } else {
                        capture_loop.stop();
                    }
                }
            })
        })
        .collect();
    for controller in controllers {
        controller.await.unwrap();
    }

    capture_loop.stop();
    wait_idle(&capture_loop).await;

    let transitions: Vec<_> = events
        .drain()
        .into_iter()
        .filter(|event| matches!(event, StreamEvent::Started | StreamEvent::Stopped { .. }))
        .collect();
    assert!(!transitions.is_empty());
    assert!(matches!(transitions.last(), Some(StreamEvent::Stopped { .. })));
    for (i, event) in transitions.iter().enumerate() {
        let expect_started = i % 2 == 0;
        assert_eq!(
            matches!(event, StreamEvent::Started),
            expect_started,
            "event {} out of order: {:?}",
            i,
            event
        );
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_slow_encoder_does_not_starve_other_tasks() {
    let capture_loop = small_loop(SlowEncoder {
        cost: Duration::from_millis(300),
    });

    let ticks = Arc::new(AtomicUsize::new(0));
    let ticker = {
        let ticks = ticks.clone();
        tokio::spawn(async move {
            loop {
                sleep(Duration::from_millis(5)).await;
                ticks.fetch_add(1, Ordering::SeqCst);
            }
        })
    };

    capture_loop.start().unwrap();
    sleep(Duration::from_millis(600)).await;
    capture_loop.stop();
    wait_idle(&capture_loop).await;
    ticker.abort();

    assert!(capture_loop.cycles_completed() >= 1);
    let ticks = ticks.load(Ordering::SeqCst);
    assert!(ticks > 50, "only {} ticks while encoding", ticks);
}
