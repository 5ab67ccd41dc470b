//! Producer-side frame pacing.
//!
//! Caps the outbound rate to a target cadence by sleeping away the
//! remainder of each frame interval. Used by the message-mode
//! producer only; the remote-write producer free-runs and relies on
//! completion backpressure instead.

use std::time::Duration;

use tokio::time::Instant;

/// Holds the producer to a target inter-frame interval.
#[derive(Debug)]
pub struct RateGovernor {
    interval: Duration,
    last_tick: Instant,
}

impl RateGovernor {
    /// Governor for `target_fps` frames per second. A target of 0
    /// disables pacing (zero interval, never sleeps).
    pub fn new(target_fps: u32) -> Self {
        let interval = if target_fps == 0 {
            Duration::ZERO
        } else {
            Duration::from_secs(1) / target_fps
        };
        Self::with_interval(interval)
    }

    pub fn with_interval(interval: Duration) -> Self {
        Self {
            interval,
            last_tick: Instant::now(),
        }
    }

    /// Target inter-frame interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Remaining wait before the next frame may go out, given `now`.
    /// Zero when the frame's compute cost already used up the
    /// interval.
    pub fn delay_until_next(&self, now: Instant) -> Duration {
        let elapsed = now.duration_since(self.last_tick);
        self.interval.saturating_sub(elapsed)
    }

    /// Move the tick to `now` without sleeping.
    pub fn mark(&mut self, now: Instant) {
        self.last_tick = now;
    }

    /// Sleep away the remainder of the current interval, then advance
    /// the tick to the current time — whether or not we slept.
    pub async fn pace(&mut self) {
        let wait = self.delay_until_next(Instant::now());
        if !wait.is_zero() {
            tokio::time::sleep(wait).await;
        }
        self.last_tick = Instant::now();
    }
}

// ── Tests ────────────────────────────────────────────────────────
