//! Adaptive frame pacing
//!
//! A PID-style feedback controller that turns the measured time between cycle
//! starts into the delay before the next cycle. Without it a self-rescheduling
//! capture loop drifts under load: every cycle pays encode and send cost on
//! top of its nominal delay, so the achieved rate ends up below target.
//!
//! The controller measures `error = target - elapsed` once per cycle and
//! answers with
//!
//! ```text
//! delay = target + P * error + I * integral - D * (error - previous_error)
//! ```
//!
//! where `integral` is an exponential moving average of the error rather
//! than a plain sum, so a single outlier fades out at a rate set by the
//! decay factor instead of winding up forever. The result is clamped at zero.

use crate::error::{FramePaceError, FramePaceResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::trace;

/// Default target frame rate of the original capture client
pub const DEFAULT_TARGET_FPS: f64 = 15.0;
/// Default weight of history in the integral term
pub const DEFAULT_DECAY_FACTOR: f64 = 0.9;
/// Default proportional gain
pub const DEFAULT_PROPORTIONAL_GAIN: f64 = 0.6;
/// Default integral gain
pub const DEFAULT_INTEGRAL_GAIN: f64 = 5.0;
/// Default derivative gain
pub const DEFAULT_DERIVATIVE_GAIN: f64 = 0.01;

/// Pacing controller configuration, fixed at construction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PacingConfig {
    /// Desired time between cycle starts in milliseconds
    pub target_interval_ms: f64,
    /// Weight of history vs. the newest sample in the integral term, in `[0, 1)`
    pub decay_factor: f64,
    /// Weight of the current error
    pub proportional_gain: f64,
    /// Weight of the decayed average error
    pub integral_gain: f64,
    /// Weight of the error change between consecutive cycles
    pub derivative_gain: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            target_interval_ms: 1000.0 / DEFAULT_TARGET_FPS,
            decay_factor: DEFAULT_DECAY_FACTOR,
            proportional_gain: DEFAULT_PROPORTIONAL_GAIN,
            integral_gain: DEFAULT_INTEGRAL_GAIN,
            derivative_gain: DEFAULT_DERIVATIVE_GAIN,
        }
    }
}

impl PacingConfig {
    /// Build a configuration targeting `fps` frames per second with default gains
    pub fn from_fps(fps: f64) -> FramePaceResult<Self> {
        if !fps.is_finite() || fps <= 0.0 {
            return Err(FramePaceError::misconfigured(
                "target_fps",
                format!("must be a positive finite number, got {}", fps),
            ));
        }

        Ok(Self {
            target_interval_ms: 1000.0 / fps,
            ..Self::default()
        })
    }

    /// Same configuration with different gains
    pub fn with_gains(mut self, proportional: f64, integral: f64, derivative: f64) -> Self {
        self.proportional_gain = proportional;
        self.integral_gain = integral;
        self.derivative_gain = derivative;
        self
    }

    /// Same configuration with a different decay factor
    pub fn with_decay(mut self, decay_factor: f64) -> Self {
        self.decay_factor = decay_factor;
        self
    }

    /// Target frame rate implied by the target interval
    pub fn target_fps(&self) -> f64 {
        if self.target_interval_ms > 0.0 {
            1000.0 / self.target_interval_ms
        } else {
            f64::INFINITY
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> FramePaceResult<()> {
        if !self.target_interval_ms.is_finite() || self.target_interval_ms < 0.0 {
            return Err(FramePaceError::misconfigured(
                "target_interval_ms",
                format!("must be finite and not negative, got {}", self.target_interval_ms),
            ));
        }

        if !(0.0..1.0).contains(&self.decay_factor) {
            return Err(FramePaceError::misconfigured(
                "decay_factor",
                format!("must be in [0, 1), got {}", self.decay_factor),
            ));
        }

        let gains = [
            ("proportional_gain", self.proportional_gain),
            ("integral_gain", self.integral_gain),
            ("derivative_gain", self.derivative_gain),
        ];
        for (field, gain) in gains {
            if !gain.is_finite() || gain < 0.0 {
                return Err(FramePaceError::misconfigured(
                    field,
                    format!("must be finite and not negative, got {}", gain),
                ));
            }
        }

        Ok(())
    }
}

/// Feedback controller computing the delay before the next capture cycle.
///
/// One instance belongs to exactly one capture loop and is only ever called
/// from that loop's task.
#[derive(Debug, Clone)]
pub struct PacingController {
    config: PacingConfig,
    last_frame_ms: Option<f64>,
    integral_error: f64,
    previous_error: f64,
}

impl PacingController {
    /// Create a controller, rejecting out-of-range configuration
    pub fn new(config: PacingConfig) -> FramePaceResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            last_frame_ms: None,
            integral_error: 0.0,
            previous_error: 0.0,
        })
    }

    /// Delay in milliseconds before the next cycle should start.
    ///
    /// `now_ms` is the start time of the current cycle on a monotonic clock.
    /// Call it once per cycle.
    pub fn compute_next_delay(&mut self, now_ms: f64) -> f64 {
        let target = self.config.target_interval_ms;

        // The first cycle pretends a perfect previous interval so the
        // controller starts from zero error.
        let elapsed = match self.last_frame_ms {
            Some(last) => (now_ms - last).max(0.0),
            None => target,
        };
        self.last_frame_ms = Some(now_ms);

        let error = target - elapsed;
        let decay = self.config.decay_factor;
        self.integral_error = self.integral_error * decay + error * (1.0 - decay);

        let derivative_error = error - self.previous_error;
        self.previous_error = error;

        let raw_delay = target
            + self.config.proportional_gain * error
            + self.config.integral_gain * self.integral_error
            - self.config.derivative_gain * derivative_error;

        trace!(
            elapsed_ms = elapsed,
            error_ms = error,
            integral_ms = self.integral_error,
            raw_delay_ms = raw_delay,
            "pacing update"
        );

        raw_delay.max(0.0)
    }

    /// [`compute_next_delay`](Self::compute_next_delay) as a [`Duration`]
    ///
    /// Delays too long for a `Duration` saturate to [`Duration::MAX`].
    pub fn compute_next_delay_duration(&mut self, now_ms: f64) -> Duration {
        Duration::try_from_secs_f64(self.compute_next_delay(now_ms) / 1000.0)
            .unwrap_or(Duration::MAX)
    }

    /// Forget all history, as if no cycle had run yet
    pub fn reset(&mut self) {
        self.last_frame_ms = None;
        self.integral_error = 0.0;
        self.previous_error = 0.0;
    }

    /// Controller configuration
    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// Exponentially decayed average timing error
    pub fn integral_error(&self) -> f64 {
        self.integral_error
    }

    /// Most recent single-sample timing error
    pub fn previous_error(&self) -> f64 {
        self.previous_error
    }

    /// Timestamp of the last update, if any
    pub fn last_frame_ms(&self) -> Option<f64> {
        self.last_frame_ms
    }

    /// Whether at least one update happened
    pub fn is_initialized(&self) -> bool {
        self.last_frame_ms.is_some()
    }
}
