//! Tick pacing.
//!
//! Each tick has a budget of `1/fps`. Whatever the tick did not use is slept
//! away; an overrun is simply lost. There is no catch-up, so drift accumulates
//! when ticks overrun.

use std::cell::Cell;
use std::time::{Duration, Instant};

pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, duration: Duration);
}

/// Operating-system clock.
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when slept or advanced explicitly.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    offset: Cell<Duration>,
    slept: Cell<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Cell::new(Duration::ZERO),
            slept: Cell::new(Duration::ZERO),
        }
    }

    /// Move time forward without counting it as sleep (simulates work).
    pub fn advance(&self, duration: Duration) {
        self.offset.set(self.offset.get() + duration);
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    /// Total time spent in `sleep`.
    pub fn slept(&self) -> Duration {
        self.slept.get()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        self.slept.set(self.slept.get() + duration);
    }
}

/// Fixed-rate tick scheduler without catch-up.
#[derive(Clone, Copy, Debug)]
pub struct TickScheduler {
    budget: Duration,
}

impl TickScheduler {
    /// `fps` must be at least 1; zero is clamped to 1.
    pub fn new(fps: u32) -> Self {
        Self {
            budget: Duration::from_secs_f64(1.0 / f64::from(fps.max(1))),
        }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    /// Time left in the tick that started at `tick_start`, or `None` if the
    /// budget is already spent.
    pub fn remaining(&self, tick_start: Instant, now: Instant) -> Option<Duration> {
        let used = now.saturating_duration_since(tick_start);
        self.budget.checked_sub(used).filter(|left| !left.is_zero())
    }

    /// Sleep out the rest of the tick. Returns how long it slept.
    pub fn wait<C: Clock + ?Sized>(&self, clock: &C, tick_start: Instant) -> Duration {
        match self.remaining(tick_start, clock.now()) {
            Some(left) => {
                clock.sleep(left);
                left
            }
            None => Duration::ZERO,
        }
    }
}

/// Frame budget of one episode: `ceil(duration * fps)`.
pub fn max_frames(duration_s: f64, fps: u32) -> u64 {
    if !duration_s.is_finite() || duration_s <= 0.0 {
        return 0;
    }
    (duration_s * f64::from(fps)).ceil() as u64
}
