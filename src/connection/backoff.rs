//! Jittered exponential backoff with a total time budget

use crate::core::BackoffPolicy;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::time::{Duration, Instant};

const MIN_SLEEP_MS: u64 = 10;

/// Produces the sleep intervals of one reconnect cycle
///
/// A fresh state is created for every reconnect cycle, so the budget is
/// measured from the first failure of that cycle.
pub struct Backoff {
    policy: BackoffPolicy,
    current: Duration,
    started: Option<Instant>,
    rng: StdRng,
}

impl Backoff {
    pub fn new(policy: BackoffPolicy) -> Self {
        Self {
            current: policy.base.min(policy.cap),
            started: None,
            rng: StdRng::from_entropy(),
            policy,
        }
    }

    /// Next sleep after a failure at `now`, or `None` once the budget is spent
    ///
    /// The ceiling doubles after every call up to `cap`; the returned value is
    /// drawn uniformly between 10ms and the current ceiling.
    pub fn next_sleep(&mut self, now: Instant) -> Option<Duration> {
        let start = *self.started.get_or_insert(now);
        let elapsed = now.saturating_duration_since(start);
        if elapsed >= self.policy.deadline {
            return None;
        }

        let ceiling = self.current;
        self.current = self.current.saturating_mul(2).min(self.policy.cap);

        let max_ms = ceiling.as_millis().min(u128::from(u64::MAX)) as u64;
        let sleep_ms = match max_ms {
            0 => MIN_SLEEP_MS,
            1..=MIN_SLEEP_MS => max_ms,
            _ => self.rng.gen_range(MIN_SLEEP_MS..=max_ms),
        };

        // Never sleep past the budget.
        let remaining = self.policy.deadline - elapsed;
        Some(Duration::from_millis(sleep_ms).min(remaining))
    }
}
