//! Requeue delays: truncated exponential backoff for failures, fixed
//! intervals for dependency waits and long-running-operation polls.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;

use crate::config::duration_secs;
use crate::model::Identity;

/// Backoff parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BackoffPolicy {
    /// Delay of the first retry.
    #[serde(with = "duration_secs")]
    pub base: Duration,
    /// Upper bound of any failure delay.
    #[serde(with = "duration_secs")]
    pub max_delay: Duration,
    /// Exponent at which doubling stops.
    pub cap_exponent: u32,
    /// Relative jitter, e.g. 0.1 for +/-10%.
    pub jitter: f64,
    /// Interval while a parent is not ready.
    #[serde(with = "duration_secs")]
    pub soft_wait: Duration,
    /// Interval while a long-running operation is in flight.
    #[serde(with = "duration_secs")]
    pub poll: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(1),
            max_delay: Duration::from_secs(300),
            cap_exponent: 10,
            jitter: 0.1,
            soft_wait: Duration::from_secs(5),
            poll: Duration::from_secs(10),
        }
    }
}

impl BackoffPolicy {
    /// Delay before the next attempt after `retry_count` consecutive failures.
    ///
    /// `min(max_delay, base * 2^min(retry_count, cap_exponent) * (1 + f))`.
    /// The jitter factor `f` is fixed per identity, which spreads different
    /// records apart while keeping one record's delays non-decreasing.
    pub fn failure_delay(&self, identity: &Identity, retry_count: u32) -> Duration {
        let exponent = retry_count.min(self.cap_exponent).min(63);
        let factor = (1u64 << exponent) as f64 * (1.0 + self.jitter_factor(identity));
        let delay = self.base.as_secs_f64() * factor;
        let max = self.max_delay.as_secs_f64();

        if !delay.is_finite() || delay >= max {
            self.max_delay
        } else {
            Duration::from_secs_f64(delay.max(0.0))
        }
    }

    pub fn soft_wait_delay(&self) -> Duration {
        self.soft_wait
    }

    pub fn poll_delay(&self) -> Duration {
        self.poll
    }

    fn jitter_factor(&self, identity: &Identity) -> f64 {
        let jitter = self.jitter.clamp(0.0, 1.0);
        if jitter == 0.0 {
            return 0.0;
        }
        let mut hasher = DefaultHasher::new();
        identity.hash(&mut hasher);
        let mut rng = StdRng::seed_from_u64(hasher.finish());
        rng.gen_range(-jitter..=jitter)
    }
}
