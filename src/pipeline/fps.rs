// SPDX-License-Identifier: GPL-3.0-only

//! Render throughput measurement

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Millisecond clock used for frame-rate sampling
pub trait Clock: Send {
    fn now_millis(&self) -> u64;
}

/// Monotonic wall-clock time since the clock was created
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_millis(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for deterministic tests and replays
///
/// Clones share the same time.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    millis: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: Arc::new(AtomicU64::new(start_millis)),
        }
    }

    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

/// Counts rendered frames and converts them into frames per second
pub struct FrameRateMeter {
    clock: Box<dyn Clock>,
    frames: u64,
    last_sample_ms: u64,
}

impl FrameRateMeter {
    pub fn new(clock: Box<dyn Clock>) -> Self {
        let last_sample_ms = clock.now_millis();
        Self {
            clock,
            frames: 0,
            last_sample_ms,
        }
    }

    /// Forget counted frames and restart the sampling window now
    pub fn reset(&mut self) {
        self.frames = 0;
        self.last_sample_ms = self.clock.now_millis();
    }

    pub fn record_frame(&mut self) {
        self.frames += 1;
    }

    /// Frames counted in the current window
    pub fn frame_count(&self) -> u64 {
        self.frames
    }

    /// Frames per second since the last sample, starting a new window
    ///
    /// Returns 0 without touching the window when no whole millisecond has
    /// passed since the previous sample.
    pub fn sample(&mut self) -> f64 {
        let now = self.clock.now_millis();
        let elapsed = now.saturating_sub(self.last_sample_ms);
        if elapsed == 0 {
            return 0.0;
        }

        let fps = self.frames as f64 * 1000.0 / elapsed as f64;
        self.last_sample_ms = now;
        self.frames = 0;
        fps
    }
}

impl Default for FrameRateMeter {
    fn default() -> Self {
        Self::new(Box::new(MonotonicClock::new()))
    }
}

impl std::fmt::Debug for FrameRateMeter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameRateMeter")
            .field("frames", &self.frames)
            .field("last_sample_ms", &self.last_sample_ms)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fps_over_one_second() {
        let clock = ManualClock::new(1_000);
        let mut meter = FrameRateMeter::new(Box::new(clock.clone()));
        for _ in 0..30 {
            meter.record_frame();
        }
        clock.advance(1_000);
        assert_eq!(meter.sample(), 30.0);
        assert_eq!(meter.frame_count(), 0);
    }

    #[test]
    fn test_zero_elapsed_returns_zero_without_reset() {
        let clock = ManualClock::new(0);
        let mut meter = FrameRateMeter::new(Box::new(clock.clone()));
        meter.record_frame();
        meter.record_frame();
        clock.advance(500);

        assert_eq!(meter.sample(), 4.0);
        meter.record_frame();
        // Same millisecond as the previous sample
        assert_eq!(meter.sample(), 0.0);
        assert_eq!(meter.frame_count(), 1);

        clock.advance(250);
        assert_eq!(meter.sample(), 4.0);
    }

    #[test]
    fn test_reset_restarts_window() {
        let clock = ManualClock::new(0);
        let mut meter = FrameRateMeter::new(Box::new(clock.clone()));
        meter.record_frame();
        clock.advance(100);
        meter.reset();
        assert_eq!(meter.frame_count(), 0);
        clock.advance(100);
        assert_eq!(meter.sample(), 0.0);
    }
}
