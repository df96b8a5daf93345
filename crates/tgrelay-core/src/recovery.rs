//! Failure recovery.
//!
//! Every fallible step of the relay reports its error here. Rate-limit errors
//! wait out the platform-issued flood wait; everything else backs off
//! exponentially from `base_delay`. With `max_attempts` set, the N+1th
//! consecutive failure ends the run with [`Error::RetriesExhausted`].

use std::time::Duration;

use tokio::time::sleep;
use tracing::{error, warn};

use crate::{errors::Error, rate_limit::FloodWait, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecoveryConfig {
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(300),
            max_attempts: Some(10),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    Retry(Duration),
    GiveUp,
}

#[derive(Clone, Copy, Debug)]
pub struct RecoveryPolicy {
    cfg: RecoveryConfig,
}

impl RecoveryPolicy {
    pub fn new(cfg: RecoveryConfig) -> Self {
        Self { cfg }
    }

    pub fn config(&self) -> RecoveryConfig {
        self.cfg
    }

    /// Decide what to do about the `attempt`-th consecutive failure (1-based).
    pub fn decide(&self, attempt: u32, err: &Error) -> Decision {
        if let Some(max) = self.cfg.max_attempts {
            if attempt > max {
                return Decision::GiveUp;
            }
        }

        if let Some(flood) = flood_wait(err) {
            return Decision::Retry(flood.suspend());
        }

        Decision::Retry(self.backoff(attempt))
    }

    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(20);
        self.cfg
            .base_delay
            .saturating_mul(1u32 << shift)
            .min(self.cfg.max_delay)
    }
}

fn flood_wait(err: &Error) -> Option<FloodWait> {
    err.as_rpc()?.flood_wait()
}

/// Stateful side of the policy: counts consecutive failures and sleeps.
#[derive(Debug)]
pub struct Recovery {
    policy: RecoveryPolicy,
    failures: u32,
}

impl Recovery {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
        }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Call after any successful step.
    pub fn reset(&mut self) {
        self.failures = 0;
    }

    /// Record a failure of `context` and wait before the caller retries.
    ///
    /// Returns `Err(RetriesExhausted)` once the policy gives up.
    pub async fn recover(&mut self, context: &str, err: &Error) -> Result<()> {
        self.failures = self.failures.saturating_add(1);
        let attempt = self.failures;

        match self.policy.decide(attempt, err) {
            Decision::GiveUp => {
                error!(context, attempt, error = %err, "giving up");
                Err(Error::RetriesExhausted {
                    attempts: attempt,
                    last: err.to_string(),
                })
            }
            Decision::Retry(wait) => {
                match flood_wait(err) {
                    Some(flood) => warn!(
                        context,
                        attempt,
                        wait_secs = wait.as_secs(),
                        "{}",
                        flood.operator_notice()
                    ),
                    None => warn!(
                        context,
                        attempt,
                        error = %err,
                        wait_ms = wait.as_millis() as u64,
                        "operation failed, retrying"
                    ),
                }
                sleep(wait).await;
                Ok(())
            }
        }
    }
}
