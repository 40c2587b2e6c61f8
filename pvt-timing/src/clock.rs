use std::cell::Cell;
use std::rc::Rc;
use std::time::Instant;

/// Monotonic time source. All engine timing decisions are relative to it;
/// wall-clock time never enters the trial path.
pub trait Clock {
    /// Milliseconds since an arbitrary fixed origin. Never decreases.
    fn now_ms(&self) -> f64;
}

/// Production clock backed by `Instant`. Copies share the same origin, so a
/// clone handed to the UI layer reads the same timeline as the engine's.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1e3
    }
}

/// Settable clock for deterministic tests. Clones share the same cell, so a
/// test can hold one handle while the machine under test owns another.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<f64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, ms: f64) {
        self.now.set(ms);
    }

    pub fn advance(&self, ms: f64) {
        self.now.set(self.now.get() + ms);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> f64 {
        self.now.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_clock_never_decreases() {
        let clock = MonotonicClock::new();
        let a = clock.now_ms();
        let b = clock.now_ms();
        assert!(b >= a);
    }

    #[test]
    fn clones_share_a_timeline() {
        let clock = ManualClock::new();
        let other = clock.clone();
        clock.set(1500.0);
        assert_eq!(other.now_ms(), 1500.0);
        other.advance(250.0);
        assert_eq!(clock.now_ms(), 1750.0);
    }
}
