//! The pacing state machine.

use std::num::NonZeroU64;
use std::time::{Duration, Instant};

/// Shortest sleep the limiter will schedule.
const MINIMUM_SLEEP: Duration = Duration::from_millis(100);

#[cfg(test)]
thread_local! {
    static RECORDED: std::cell::RefCell<Vec<Duration>> = const { std::cell::RefCell::new(Vec::new()) };
}

#[cfg(test)]
fn sleep_for(duration: Duration) {
    RECORDED.with(|r| r.borrow_mut().push(duration));
}

#[cfg(test)]
pub(crate) fn recorded_sleeps() -> Vec<Duration> {
    RECORDED.with(|r| std::mem::take(&mut *r.borrow_mut()))
}

#[cfg(not(test))]
fn sleep_for(duration: Duration) {
    std::thread::sleep(duration);
}

/// Paces registered bytes to a fixed rate.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    limit_bytes: NonZeroU64,
    total_registered: u128,
    started: Option<Instant>,
}

impl RateLimiter {
    /// Constructs a limiter for `limit` bytes per second.
    #[must_use]
    pub fn new(limit: NonZeroU64) -> Self {
        Self {
            limit_bytes: limit,
            total_registered: 0,
            started: None,
        }
    }

    /// The configured rate in bytes per second.
    #[must_use]
    pub fn limit_bytes(&self) -> NonZeroU64 {
        self.limit_bytes
    }

    /// Restarts the accounting window, keeping the configured rate.
    ///
    /// Called between files so a long think-pause on the control channel
    /// does not turn into a burst allowance.
    pub fn reset(&mut self) {
        self.total_registered = 0;
        self.started = None;
    }

    /// Registers `bytes` just moved and sleeps if the loop runs hot.
    pub fn register(&mut self, bytes: usize) {
        self.total_registered += bytes as u128;
        let started = *self.started.get_or_insert_with(Instant::now);

        let due_micros =
            self.total_registered * 1_000_000 / u128::from(self.limit_bytes.get());
        let due = Duration::from_micros(due_micros.min(u128::from(u64::MAX)) as u64);
        let elapsed = started.elapsed();

        if due > elapsed {
            let behind = due - elapsed;
            if behind >= MINIMUM_SLEEP {
                sleep_for(behind);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(bytes_per_sec: u64) -> RateLimiter {
        RateLimiter::new(NonZeroU64::new(bytes_per_sec).expect("non-zero"))
    }

    #[test]
    fn big_burst_sleeps_proportionally() {
        let _ = recorded_sleeps();
        let mut limiter = limiter(1024);
        limiter.register(10 * 1024);

        let sleeps = recorded_sleeps();
        assert_eq!(sleeps.len(), 1);
        // 10 KiB at 1 KiB/s is ten seconds of debt, minus negligible
        // elapsed time.
        assert!(sleeps[0] > Duration::from_secs(9));
        assert!(sleeps[0] <= Duration::from_secs(10));
    }

    #[test]
    fn small_debt_is_carried_not_slept() {
        let _ = recorded_sleeps();
        let mut limiter = limiter(1024 * 1024);
        limiter.register(1024);
        assert!(recorded_sleeps().is_empty());

        // Accumulated debt eventually crosses the sleep floor.
        for _ in 0..2048 {
            limiter.register(1024);
        }
        let sleeps = recorded_sleeps();
        assert!(!sleeps.is_empty());
        assert!(sleeps.iter().all(|s| *s >= MINIMUM_SLEEP));
    }

    #[test]
    fn reset_forgets_the_window() {
        let _ = recorded_sleeps();
        let mut limiter = limiter(1024);
        limiter.register(5 * 1024);
        let first = recorded_sleeps();
        assert_eq!(first.len(), 1);

        limiter.reset();
        limiter.register(16);
        assert!(recorded_sleeps().is_empty());
    }
}
