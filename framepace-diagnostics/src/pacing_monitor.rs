//! Achieved frame rate and jitter over a sliding window of cycles

use serde::Serialize;
use std::collections::VecDeque;

/// Cycles kept by [`PacingMonitor::default`]
pub const DEFAULT_WINDOW: usize = 60;

/// Snapshot of pacing statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PacingStats {
    /// Cycles recorded since creation or the last reset
    pub cycles: u64,
    /// Frames per second implied by the mean interval, 0 with fewer than two cycles
    pub achieved_fps: f64,
    /// Mean interval between cycle starts in milliseconds
    pub mean_interval_ms: f64,
    /// Standard deviation of the intervals in milliseconds
    pub jitter_ms: f64,
    /// Delay the controller chose after the latest cycle
    pub last_delay_ms: Option<f64>,
}

/// Sliding-window recorder of cycle start times
#[derive(Debug, Clone)]
pub struct PacingMonitor {
    window: usize,
    starts: VecDeque<f64>,
    cycles: u64,
    last_delay_ms: Option<f64>,
}

impl PacingMonitor {
    /// Create a monitor keeping the last `window` cycle starts (at least 2)
    pub fn new(window: usize) -> Self {
        let window = window.max(2);
        Self {
            window,
            starts: VecDeque::with_capacity(window),
            cycles: 0,
            last_delay_ms: None,
        }
    }

    /// Record a completed cycle
    pub fn record_cycle(&mut self, started_at_ms: f64, next_delay_ms: f64) {
        if self.starts.len() == self.window {
            self.starts.pop_front();
        }
        self.starts.push_back(started_at_ms);
        self.cycles += 1;
        self.last_delay_ms = Some(next_delay_ms);
    }

    /// Forget all recorded cycles
    pub fn reset(&mut self) {
        self.starts.clear();
        self.cycles = 0;
        self.last_delay_ms = None;
    }

    /// Compute the current statistics
    pub fn stats(&self) -> PacingStats {
        let intervals: Vec<f64> = self
            .starts
            .iter()
            .zip(self.starts.iter().skip(1))
            .map(|(prev, next)| next - prev)
            .collect();

        let mut stats = PacingStats {
            cycles: self.cycles,
            last_delay_ms: self.last_delay_ms,
            ..PacingStats::default()
        };
        if intervals.is_empty() {
            return stats;
        }

        let n = intervals.len() as f64;
        let mean = intervals.iter().sum::<f64>() / n;
        let variance = intervals.iter().map(|i| (i - mean).powi(2)).sum::<f64>() / n;

        stats.mean_interval_ms = mean;
        stats.jitter_ms = variance.sqrt();
        if mean > 0.0 {
            stats.achieved_fps = 1000.0 / mean;
        }
        stats
    }
}

impl Default for PacingMonitor {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}
