//! Engine tuning.

use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::backoff::BackoffPolicy;

/// Configuration for the engine and the dispatch loop.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Parallel workers. Distinct identities reconcile concurrently.
    pub workers: usize,
    /// Deadline of one reconcile, from dequeue to outcome.
    #[serde(with = "duration_secs")]
    pub request_timeout: Duration,
    /// Bound on any single store or manager call.
    #[serde(with = "duration_secs")]
    pub call_timeout: Duration,
    pub backoff: BackoffPolicy,
    /// Unknown errors become terminal once this many retries were spent.
    pub max_unknown_retries: u32,
    /// Whole-reconcile reruns after a status write conflict.
    pub conflict_retries: u32,
    /// Period of the full level-triggered sweep.
    #[serde(with = "duration_secs")]
    pub resync_interval: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            request_timeout: Duration::from_secs(120),
            call_timeout: Duration::from_secs(30),
            backoff: BackoffPolicy::default(),
            max_unknown_retries: 10,
            conflict_retries: 3,
            resync_interval: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("workers must be at least 1")]
    NoWorkers,
    #[error("{0} must be greater than zero")]
    ZeroDuration(&'static str),
    #[error("backoff base {base:?} exceeds max delay {max:?}")]
    BaseAboveMax { base: Duration, max: Duration },
    #[error("jitter must be within [0, 1), got {0}")]
    Jitter(String),
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::NoWorkers);
        }
        for (name, value) in [
            ("request_timeout", self.request_timeout),
            ("call_timeout", self.call_timeout),
            ("backoff.base", self.backoff.base),
            ("backoff.soft_wait", self.backoff.soft_wait),
            ("backoff.poll", self.backoff.poll),
        ] {
            if value.is_zero() {
                return Err(ConfigError::ZeroDuration(name));
            }
        }
        if self.backoff.base > self.backoff.max_delay {
            return Err(ConfigError::BaseAboveMax {
                base: self.backoff.base,
                max: self.backoff.max_delay,
            });
        }
        if !(0.0..1.0).contains(&self.backoff.jitter) {
            return Err(ConfigError::Jitter(self.backoff.jitter.to_string()));
        }
        Ok(())
    }
}

/// Serde helper: durations as (fractional) seconds.
pub(crate) mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, de};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(de::Error::custom)
    }
}
