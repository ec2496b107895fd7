//! Frame timer with delta clamping.

use std::time::{Duration, Instant};

/// Upper bound for a single simulation step, in seconds.
///
/// Stalls (window drags, breakpoints) would otherwise produce one huge step.
pub const MAX_FRAME_TIME: f32 = 0.5;

/// Clamps a frame delta to `max`.
///
/// Negative or NaN inputs collapse to zero.
#[inline]
pub fn clamp_frame_time(delta: f32, max: f32) -> f32 {
    if delta.is_nan() || delta <= 0.0 {
        0.0
    } else {
        delta.min(max)
    }
}

/// High-resolution timer for measuring frame deltas.
#[derive(Debug)]
pub struct Timer {
    start: Instant,
    last_tick: Instant,
    max_delta: f32,
}

impl Timer {
    /// Create a new timer clamping deltas to [`MAX_FRAME_TIME`].
    pub fn new() -> Self {
        Self::with_max_delta(MAX_FRAME_TIME)
    }

    /// Create a new timer with a custom delta ceiling.
    pub fn with_max_delta(max_delta: f32) -> Self {
        let now = Instant::now();
        Self {
            start: now,
            last_tick: now,
            max_delta,
        }
    }

    /// Total elapsed time since the timer was created.
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Total elapsed time in seconds.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Raw time since the last call to `tick()`.
    pub fn tick(&mut self) -> Duration {
        let now = Instant::now();
        let delta = now - self.last_tick;
        self.last_tick = now;
        delta
    }

    /// Clamped delta in seconds since the last tick.
    pub fn delta_secs(&mut self) -> f32 {
        let raw = self.tick().as_secs_f32();
        clamp_frame_time(raw, self.max_delta)
    }

    /// The configured delta ceiling.
    pub fn max_delta(&self) -> f32 {
        self.max_delta
    }

    /// Reset the timer to the current time.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.start = now;
        self.last_tick = now;
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}
