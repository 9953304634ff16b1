//! Time-bounded transitions between colors.

use embassy_time::{Duration, Instant};

use crate::color::Rgb;
use crate::easing::EasingMode;

/// Start and end colors of the active (or most recent) fade.
///
/// The executor latches `start = end` when a transition completes so the
/// next fade departs from the last observed color.
#[derive(Debug, Clone, Copy)]
pub struct ColorFader {
    pub start: Rgb,
    pub end: Rgb,
}

impl ColorFader {
    pub const fn new(color: Rgb) -> Self {
        Self {
            start: color,
            end: color,
        }
    }
}

/// Timing state of a single color transition.
#[derive(Debug, Clone)]
pub struct Transition {
    active: bool,
    start: Instant,
    duration: Duration,
    easing: EasingMode,
}

impl Transition {
    pub const fn new() -> Self {
        Self {
            active: false,
            start: Instant::from_millis(0),
            duration: Duration::from_millis(0),
            easing: EasingMode::Linear,
        }
    }

    pub const fn active(&self) -> bool {
        self.active
    }

    /// Begin a transition. `duration` must be nonzero; zero-length fades
    /// take the immediate path in the executor and never start one.
    pub fn begin(&mut self, start: Instant, duration: Duration, easing: EasingMode) {
        self.start = start;
        self.duration = duration;
        self.easing = easing;
        self.active = true;
    }

    /// Abandon the transition without reaching the end color.
    pub fn cancel(&mut self) {
        self.active = false;
    }

    /// Advance to `now`.
    ///
    /// Returns the post-easing progress to render, or `None` when no
    /// transition is active. The call that reaches pre-easing progress 1
    /// still reports (so the end color gets written) and then deactivates;
    /// the caller must latch the fader afterwards.
    pub fn step(&mut self, now: Instant) -> Option<f32> {
        if !self.active {
            return None;
        }
        let progress = self.progress_pre_easing(now);
        if progress >= 1.0 {
            self.active = false;
        }
        Some(self.easing.apply(progress))
    }

    #[allow(clippy::cast_precision_loss)]
    fn progress_pre_easing(&self, now: Instant) -> f32 {
        if now <= self.start {
            return 0.0;
        }
        let elapsed = (now - self.start).as_millis() as f32;
        let duration = self.duration.as_millis() as f32;
        if elapsed >= duration {
            1.0
        } else {
            elapsed / duration
        }
    }
}

impl Default for Transition {
    fn default() -> Self {
        Self::new()
    }
}
