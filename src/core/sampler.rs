// Sampling throttle: decouples inference rate from the recorded capture rate

use std::time::Duration;
use tokio::time::Instant;

/// Minimum spacing between recorded samples: `max(1, round(1000 / fps))` ms
pub fn sample_interval_ms(fps: f64) -> u64 {
    let raw = (1000.0 / fps).round();
    if raw.is_finite() && raw >= 1.0 {
        raw as u64
    } else {
        1
    }
}

pub fn sample_interval(fps: f64) -> Duration {
    Duration::from_millis(sample_interval_ms(fps))
}

#[derive(Debug, Clone)]
pub struct FrameSampler {
    interval: Duration,
    last_sample: Option<Instant>,
}

impl FrameSampler {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            last_sample: None,
        }
    }

    pub fn from_fps(fps: f64) -> Self {
        Self::new(sample_interval(fps))
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Forget the previous sample so the next offered frame is accepted
    pub fn reset(&mut self) {
        self.last_sample = None;
    }

    pub fn should_sample(&self, now: Instant) -> bool {
        match self.last_sample {
            None => true,
            Some(last) => now.saturating_duration_since(last) >= self.interval,
        }
    }

    pub fn mark(&mut self, now: Instant) {
        self.last_sample = Some(now);
    }

    /// Check and mark in one step
    pub fn try_sample(&mut self, now: Instant) -> bool {
        if self.should_sample(now) {
            self.mark(now);
            true
        } else {
            false
        }
    }
}
