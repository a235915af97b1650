//! Retry state machine for failed group writes
//!
//! A failing group is retried forever. Every `escalate_every`-th consecutive
//! failure the caller is told to back off before the next attempt.

use async_trait::async_trait;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Consecutive failures between two backoffs
    pub escalate_every: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            escalate_every: 5,
            backoff: Duration::from_secs(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryState {
    Idle,
    Attempting { attempt: u32 },
    BackoffWait { failures: u32 },
    Succeeded { attempts: u32 },
}

/// What to do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    RetryNow,
    Backoff(Duration),
}

/// Tracks one dispatch loop. The failure counter lives as long as the loop.
#[derive(Debug)]
pub struct RetryTracker {
    policy: RetryPolicy,
    failures: u32,
    state: RetryState,
}

impl RetryTracker {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            failures: 0,
            state: RetryState::Idle,
        }
    }

    pub fn begin_attempt(&mut self) {
        self.state = RetryState::Attempting {
            attempt: self.failures + 1,
        };
    }

    pub fn record_failure(&mut self) -> RetryDecision {
        self.failures = self.failures.saturating_add(1);

        if self.policy.escalate_every > 0 && self.failures % self.policy.escalate_every == 0 {
            self.state = RetryState::BackoffWait {
                failures: self.failures,
            };
            RetryDecision::Backoff(self.policy.backoff)
        } else {
            RetryDecision::RetryNow
        }
    }

    pub fn record_success(&mut self) {
        self.state = RetryState::Succeeded {
            attempts: self.failures + 1,
        };
        self.failures = 0;
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn state(&self) -> RetryState {
        self.state
    }
}

/// Backoff clock, injected so tests do not wait for real
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}
