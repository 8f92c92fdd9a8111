//! Smoothed frames-per-second estimate

use std::time::Instant;

#[derive(Debug, Clone)]
pub struct FpsMeter {
    smoothing: f64,
    last: Option<Instant>,
    fps: f64,
}

impl FpsMeter {
    /// `smoothing` is the weight of the newest sample, in (0, 1]
    pub fn new(smoothing: f64) -> Self {
        Self {
            smoothing: smoothing.clamp(f64::EPSILON, 1.0),
            last: None,
            fps: 0.0,
        }
    }

    /// Register a frame at `now` and return the updated estimate
    pub fn tick(&mut self, now: Instant) -> f64 {
        if let Some(last) = self.last {
            let dt = now.saturating_duration_since(last).as_secs_f64();
            if dt > 0.0 {
                let instant = 1.0 / dt;
                self.fps = if self.fps == 0.0 {
                    instant
                } else {
                    self.fps * (1.0 - self.smoothing) + instant * self.smoothing
                };
            }
        }
        self.last = Some(now);
        self.fps
    }

    pub fn fps(&self) -> f64 {
        self.fps
    }
}
