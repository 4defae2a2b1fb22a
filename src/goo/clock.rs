//! Active/paused window state machine.
//!
//! The clock has no timer of its own. It is advanced lazily by the engine on
//! every packet, so with no traffic the window state stays frozen.

use std::fmt;
use std::time::{Duration, Instant};

use rand::Rng;

use super::GooType;

/// A transition from an active window into a pause.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowChange {
    /// Length of the pause that just started.
    pub pause: Duration,
    /// Variant for the active window after the pause.
    pub next: GooType,
}

impl fmt::Display for WindowChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Pausing goo for {} ms, next goo type: {}",
            self.pause.as_millis(),
            self.next
        )
    }
}

/// Result of the per-packet clock check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    /// Whether the packet falls inside an active window.
    pub eligible: bool,
    /// Pause that began on this packet, if any.
    pub window: Option<WindowChange>,
}

/// Timing state deciding when corruption is eligible.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GooClock {
    /// Start of the current active window. While in the future it marks the end
    /// of a pause (or of the warmup).
    window_start: Instant,
    current: GooType,
    forced: Option<GooType>,
    active: Duration,
    pause: Duration,
}

impl GooClock {
    /// Create a clock whose first active window opens `warmup` after `now`.
    pub fn new<R: Rng + ?Sized>(
        now: Instant,
        warmup: Duration,
        active: Duration,
        pause: Duration,
        forced: Option<GooType>,
        rng: &mut R,
    ) -> Self {
        Self {
            window_start: now + warmup,
            current: forced.unwrap_or_else(|| GooType::random(rng)),
            forced,
            active,
            pause,
        }
    }

    /// Variant in effect for the current active window.
    pub fn current(&self) -> GooType {
        self.current
    }

    /// Start of the current active window.
    pub fn window_start(&self) -> Instant {
        self.window_start
    }

    /// Whether the active window has run out and a pause must begin.
    pub fn should_enter_paused_window(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.window_start) > self.active
    }

    /// Begin a pause at `now` and pick the variant for the next active window.
    pub fn advance_to_paused_window<R: Rng + ?Sized>(
        &mut self,
        now: Instant,
        rng: &mut R,
    ) -> WindowChange {
        self.window_start = now + self.pause;
        self.current = self.forced.unwrap_or_else(|| GooType::random(rng));
        WindowChange {
            pause: self.pause,
            next: self.current,
        }
    }

    /// Whether `now` falls inside an active window.
    pub fn is_within_active_window(&self, now: Instant) -> bool {
        now >= self.window_start
    }

    /// Run the per-packet transition check and report eligibility.
    pub fn tick<R: Rng + ?Sized>(&mut self, now: Instant, rng: &mut R) -> Tick {
        let window = self
            .should_enter_paused_window(now)
            .then(|| self.advance_to_paused_window(now, rng));
        Tick {
            eligible: self.is_within_active_window(now),
            window,
        }
    }
}
