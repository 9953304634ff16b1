//! Hysteretic edge detection over noisy analog samples.
//!
//! Samples are bytes where 0 is a clean digital LOW and 255 a clean HIGH.
//! The range splits into three bands: below `mid_low` is LOW, at or above
//! `mid_high` is HIGH, and the mid band preserves the previous state so a
//! signal hovering around a threshold cannot chatter.

use embassy_time::{Duration, Instant};

/// A detected signal transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Edge {
    Rising,
    Falling,
}

/// Band boundaries and debounce interval for an [`EdgeDetector`].
#[derive(Debug, Clone, Copy)]
pub struct EdgeConfig {
    /// First sample value that is no longer LOW (inclusive)
    pub mid_low: u8,
    /// First sample value that counts as HIGH (inclusive)
    pub mid_high: u8,
    /// Transitions within this interval of the previous one are suppressed
    pub debounce: Duration,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            mid_low: 64,
            mid_high: 192,
            debounce: Duration::from_millis(0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// No sample has left the mid band yet
    Start,
    Low,
    High,
}

/// Classifies an analog sample stream into rising and falling edges.
#[derive(Debug, Clone)]
pub struct EdgeDetector {
    config: EdgeConfig,
    state: State,
    last_transition: Option<Instant>,
}

impl EdgeDetector {
    pub const fn new(config: EdgeConfig) -> Self {
        Self {
            config,
            state: State::Start,
            last_transition: None,
        }
    }

    /// Feed one sample taken at `now`.
    ///
    /// Timestamps must be monotonically nondecreasing across calls.
    /// Returns the edge that fired, if any. The first sample that lands in
    /// the LOW or HIGH band only establishes the initial state and never
    /// reports an edge.
    pub fn feed(&mut self, sample: u8, now: Instant) -> Option<Edge> {
        let band = self.classify(sample);
        match (self.state, band) {
            (State::Start, Some(State::Low)) => {
                self.state = State::Low;
                None
            }
            (State::Start, Some(State::High)) => {
                self.state = State::High;
                None
            }
            (State::Low, Some(State::High)) => self.transition(State::High, Edge::Rising, now),
            (State::High, Some(State::Low)) => self.transition(State::Low, Edge::Falling, now),
            _ => None,
        }
    }

    /// Reset to the ground state, forgetting debounce history.
    pub fn reset(&mut self) {
        self.state = State::Start;
        self.last_transition = None;
    }

    /// Current digital estimate: `Some(true)` for HIGH, `Some(false)` for
    /// LOW, `None` while the state is still unknown.
    pub fn level(&self) -> Option<bool> {
        match self.state {
            State::Start => None,
            State::Low => Some(false),
            State::High => Some(true),
        }
    }

    fn classify(&self, sample: u8) -> Option<State> {
        if sample < self.config.mid_low {
            Some(State::Low)
        } else if sample >= self.config.mid_high {
            Some(State::High)
        } else {
            None
        }
    }

    fn transition(&mut self, next: State, edge: Edge, now: Instant) -> Option<Edge> {
        if let Some(last) = self.last_transition {
            if now < last + self.config.debounce {
                return None;
            }
        }
        self.state = next;
        self.last_transition = Some(now);
        Some(edge)
    }
}

impl Default for EdgeDetector {
    fn default() -> Self {
        Self::new(EdgeConfig::default())
    }
}
