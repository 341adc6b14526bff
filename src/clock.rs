//! Time source for the feed timers.
use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

#[derive(Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Clock that only moves when told to.
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }
}

impl ManualClock {
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Fixed-period timer driven by whoever owns it.
#[derive(Debug, Clone)]
pub struct Interval {
    period: Duration,
    last: Option<Instant>,
}

impl Interval {
    pub fn new(period: Duration) -> Self {
        Self { period, last: None }
    }

    /// Returns true once per elapsed period. The first call only arms it.
    pub fn due(&mut self, now: Instant) -> bool {
        match self.last {
            None => {
                self.last = Some(now);
                false
            }
            Some(last) if now.saturating_duration_since(last) >= self.period => {
                self.last = Some(now);
                true
            }
            Some(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_fires_once_per_period() {
        let clock = ManualClock::default();
        let mut interval = Interval::new(Duration::from_secs(5));
        assert!(!interval.due(clock.now()));
        clock.advance(Duration::from_secs(4));
        assert!(!interval.due(clock.now()));
        clock.advance(Duration::from_secs(1));
        assert!(interval.due(clock.now()));
        assert!(!interval.due(clock.now()));
    }
}
