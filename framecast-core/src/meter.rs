//! Consumer-side throughput metering.
//!
//! Accumulates received-frame counts over a fixed wall-clock window;
//! once the window elapses, reports `frames / elapsed` and resets
//! both the counter and the window start. Purely observational —
//! never blocks the receive loop.

use std::time::{Duration, Instant};

/// Rolling frames-per-second meter.
#[derive(Debug)]
pub struct FpsMeter {
    window: Duration,
    window_start: Instant,
    frames: u64,
    total_frames: u64,
}

impl FpsMeter {
    /// Meter reporting once per `window`.
    pub fn new(window: Duration) -> Self {
        Self::starting_at(window, Instant::now())
    }

    /// Meter with an explicit window start (useful for testing).
    pub fn starting_at(window: Duration, start: Instant) -> Self {
        Self {
            window,
            window_start: start,
            frames: 0,
            total_frames: 0,
        }
    }

    /// Record one received frame at the current instant.
    pub fn record(&mut self) -> Option<f64> {
        self.record_at(Instant::now())
    }

    /// Record one received frame at `now`. Returns the measured FPS
    /// when the window has just elapsed, resetting counter and window
    /// start exactly once per crossing.
    pub fn record_at(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        self.total_frames += 1;

        let elapsed = now.duration_since(self.window_start);
        if elapsed < self.window {
            return None;
        }

        let fps = self.frames as f64 / elapsed.as_secs_f64();
        self.frames = 0;
        self.window_start = now;
        Some(fps)
    }

    /// Frames recorded in the current window.
    pub fn frames_in_window(&self) -> u64 {
        self.frames
    }

    /// Frames recorded since construction.
    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn window(&self) -> Duration {
        self.window
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reports_frames_over_elapsed() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::starting_at(Duration::from_secs(5), t0);

        // 149 frames strictly inside the window report nothing.
        for i in 1..150u64 {
            let now = t0 + Duration::from_millis(i * 33);
            assert_eq!(meter.record_at(now), None, "frame {i} crossed early");
        }

        // The 150th lands at 5.0s: 150 frames / 5 seconds = 30 fps.
        let fps = meter.record_at(t0 + Duration::from_secs(5)).unwrap();
        assert!((fps - 30.0).abs() < 1e-9, "fps = {fps}");
    }

    #[test]
    fn resets_exactly_once_per_crossing() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::starting_at(Duration::from_secs(2), t0);

        assert!(meter.record_at(t0 + Duration::from_secs(2)).is_some());
        assert_eq!(meter.frames_in_window(), 0);

        // The next frame starts a fresh window anchored at the
        // crossing instant.
        assert_eq!(meter.record_at(t0 + Duration::from_secs(3)), None);
        assert_eq!(meter.frames_in_window(), 1);

        let fps = meter.record_at(t0 + Duration::from_secs(4)).unwrap();
        assert!((fps - 1.0).abs() < 1e-9, "fps = {fps}");
    }

    #[test]
    fn total_survives_window_resets() {
        let t0 = Instant::now();
        let mut meter = FpsMeter::starting_at(Duration::from_secs(1), t0);

        for i in 1..=10u64 {
            meter.record_at(t0 + Duration::from_millis(i * 400));
        }
        assert_eq!(meter.total_frames(), 10);
        assert!(meter.frames_in_window() < 10);
    }
}
