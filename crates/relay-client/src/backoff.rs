//! Reconnect delay policies.
//!
//! The session asks its policy for a delay after every failed or dropped
//! connection. `attempt` is 0 for the first retry after a healthy session and
//! grows with each consecutive failure.

use relay_types::config::BackoffConfig;
use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

/// Delay before reconnect attempt `attempt` (0-indexed).
pub trait BackoffPolicy: Send + Sync + Debug {
    fn delay(&self, attempt: u32) -> Duration;
}

/// Reconnect immediately. Meant for tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackoff;

impl BackoffPolicy for NoBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        Duration::ZERO
    }
}

/// Same delay before every attempt.
#[derive(Debug, Clone, Copy)]
pub struct ConstantBackoff {
    pub delay: Duration,
}

impl ConstantBackoff {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl Default for ConstantBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}

impl BackoffPolicy for ConstantBackoff {
    fn delay(&self, _attempt: u32) -> Duration {
        self.delay
    }
}

/// `min(min_delay * 2^attempt, max_delay)`.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl ExponentialBackoff {
    pub fn new(min_delay: Duration, max_delay: Duration) -> Self {
        Self {
            min_delay,
            max_delay: max_delay.max(min_delay),
        }
    }
}

impl BackoffPolicy for ExponentialBackoff {
    fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.min_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// Build the policy named by configuration.
pub fn from_config(config: &BackoffConfig) -> Arc<dyn BackoffPolicy> {
    match config {
        BackoffConfig::None => Arc::new(NoBackoff),
        BackoffConfig::Constant { delay_ms } => {
            Arc::new(ConstantBackoff::new(Duration::from_millis(*delay_ms)))
        }
        BackoffConfig::Exponential {
            min_delay_ms,
            max_delay_ms,
        } => Arc::new(ExponentialBackoff::new(
            Duration::from_millis(*min_delay_ms),
            Duration::from_millis(*max_delay_ms),
        )),
    }
}
