//! Capture source fed by an external producer

use super::CaptureSource;
use crate::error::{MediaError, MediaResult};
use crate::frame::{RasterFrame, VideoResolution};
use parking_lot::RwLock;
use tracing::{debug, warn};

#[derive(Debug)]
enum SlotState {
    Waiting,
    Ready(RasterFrame),
    Failed { device: String, reason: String },
}

/// Holds the latest frame pushed by a device thread.
///
/// Capturing never blocks on the device: it returns whatever frame arrived
/// last. Until the first frame is pushed the source is not ready, and once a
/// device failure is reported every capture returns that failure until a new
/// frame arrives.
#[derive(Debug)]
pub struct LatestFrameSource {
    device: String,
    resolution: VideoResolution,
    slot: RwLock<SlotState>,
}

impl LatestFrameSource {
    /// Create an empty source expecting frames of `resolution`
    pub fn new(device: impl Into<String>, resolution: VideoResolution) -> Self {
        Self {
            device: device.into(),
            resolution,
            slot: RwLock::new(SlotState::Waiting),
        }
    }

    /// Device name this source reports in errors
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Replace the latest frame
    pub fn push_frame(&self, frame: RasterFrame) -> MediaResult<()> {
        if frame.resolution() != self.resolution {
            return Err(MediaError::ResolutionMismatch {
                expected: self.resolution,
                actual: frame.resolution(),
            });
        }

        let mut slot = self.slot.write();
        if !matches!(*slot, SlotState::Ready(_)) {
            debug!(device = %self.device, "first frame received, source ready");
        }
        *slot = SlotState::Ready(frame);
        Ok(())
    }

    /// Mark the device as failed (permission denied, unplugged, ...)
    pub fn report_failure(&self, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(device = %self.device, %reason, "capture device failed");
        *self.slot.write() = SlotState::Failed {
            device: self.device.clone(),
            reason,
        };
    }

    /// Drop the current frame and wait for the device again
    pub fn clear(&self) {
        *self.slot.write() = SlotState::Waiting;
    }
}

impl CaptureSource for LatestFrameSource {
    fn capture_frame(&self) -> Result<RasterFrame, MediaError> {
        match &*self.slot.read() {
            SlotState::Ready(frame) => Ok(frame.clone()),
            SlotState::Waiting => Err(MediaError::SourceNotReady {
                reason: format!("no frame received from {} yet", self.device),
            }),
            SlotState::Failed { device, reason } => Err(MediaError::DeviceUnavailable {
                device: device.clone(),
                reason: reason.clone(),
            }),
        }
    }

    fn is_ready(&self) -> bool {
        matches!(*self.slot.read(), SlotState::Ready(_))
    }

    fn resolution(&self) -> VideoResolution {
        self.resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::PixelFormat;

    fn frame(resolution: VideoResolution, sequence: u64) -> RasterFrame {
        RasterFrame::new(
            resolution,
            PixelFormat::Rgb24,
            vec![sequence as u8; resolution.frame_size(PixelFormat::Rgb24)],
            sequence,
        )
        .unwrap()
    }

    #[test]
    fn test_not_ready_until_first_frame() {
        let resolution = VideoResolution::new(8, 4);
        let source = LatestFrameSource::new("cam0", resolution);
        assert!(!source.is_ready());
        assert!(matches!(
            source.capture_frame(),
            Err(MediaError::SourceNotReady { .. })
        ));

        source.push_frame(frame(resolution, 1)).unwrap();
        assert!(source.is_ready());
        assert_eq!(source.capture_frame().unwrap().sequence, 1);
    }

    #[test]
    fn test_capture_returns_latest_frame() {
        let resolution = VideoResolution::new(8, 4);
        let source = LatestFrameSource::new("cam0", resolution);
        for sequence in 1..=5 {
            source.push_frame(frame(resolution, sequence)).unwrap();
        }
        let captured = source.capture_frame().unwrap();
        assert_eq!(captured.sequence, 5);
        assert_eq!(captured.data[0], 5);
    }

    #[test]
    fn test_rejects_wrong_resolution() {
        let source = LatestFrameSource::new("cam0", VideoResolution::new(8, 4));
        let result = source.push_frame(frame(VideoResolution::new(4, 4), 1));
        assert!(matches!(result, Err(MediaError::ResolutionMismatch { .. })));
        assert!(!source.is_ready());
    }

    #[test]
    fn test_failure_is_reported_until_next_frame() {
        let resolution = VideoResolution::new(8, 4);
        let source = LatestFrameSource::new("cam0", resolution);
        source.report_failure("permission denied");
        assert!(!source.is_ready());

        match source.capture_frame() {
            Err(MediaError::DeviceUnavailable { device, reason }) => {
                assert_eq!(device, "cam0");
                assert_eq!(reason, "permission denied");
            }
            other => panic!("Expected DeviceUnavailable, got {:?}", other),
        }

        source.push_frame(frame(resolution, 2)).unwrap();
        assert!(source.capture_frame().is_ok());

        source.clear();
        assert!(!source.is_ready());
    }
}
