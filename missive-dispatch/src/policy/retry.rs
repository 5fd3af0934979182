//! Retry policy for a single recipient's send.
//!
//! Retries happen inside one dispatch invocation: the engine sleeps for
//! [`RetryPolicy::backoff`] between attempts, and the recipient is written
//! only once the loop reaches a [`SendOutcome`].

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::transport::TransportError;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total transport attempts per recipient, including the first.
    ///
    /// Default: 5
    #[serde(default = "defaults::max_attempts")]
    pub max_attempts: u32,

    /// Base delay in milliseconds; attempt `n` waits `base * 2^n`.
    ///
    /// Default: 1000
    #[serde(default = "defaults::base_delay_ms")]
    pub base_delay_ms: u64,

    /// Upper bound on any single wait, jitter included.
    ///
    /// Default: 60000
    #[serde(default = "defaults::max_delay_ms")]
    pub max_delay_ms: u64,

    /// Up to this many random milliseconds are added to each wait.
    ///
    /// Default: 500
    #[serde(default = "defaults::max_jitter_ms")]
    pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::max_attempts(),
            base_delay_ms: defaults::base_delay_ms(),
            max_delay_ms: defaults::max_delay_ms(),
            max_jitter_ms: defaults::max_jitter_ms(),
        }
    }
}

/// How a recipient's retry loop ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendOutcome {
    Sent { message_id: String, attempts: u32 },
    Failed { error: TransportError, attempts: u32 },
}

impl SendOutcome {
    #[must_use]
    pub const fn attempts(&self) -> u32 {
        match self {
            Self::Sent { attempts, .. } | Self::Failed { attempts, .. } => *attempts,
        }
    }
}

/// What to do after one attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendStep {
    Done(SendOutcome),
    RetryAfter(Duration),
}

impl RetryPolicy {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that retries without waiting
    #[must_use]
    pub const fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay_ms: 0,
            max_delay_ms: 0,
            max_jitter_ms: 0,
        }
    }

    /// Whether another attempt may follow `attempt` completed attempts
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    #[must_use]
    pub const fn remaining_attempts(&self, attempt: u32) -> u32 {
        self.max_attempts.saturating_sub(attempt)
    }

    /// Wait before the attempt following attempt number `attempt` (1-indexed)
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let delay = if attempt >= 63 {
            self.max_delay_ms
        } else {
            self.base_delay_ms.saturating_mul(1u64 << attempt)
        };

        let jitter = if self.max_jitter_ms == 0 {
            0
        } else {
            rand::rng().random_range(0..=self.max_jitter_ms)
        };

        Duration::from_millis(delay.saturating_add(jitter).min(self.max_delay_ms))
    }

    /// Classify the result of attempt number `attempt` (1-indexed).
    ///
    /// Success and terminal errors settle immediately. Retriable errors settle
    /// as failed once `max_attempts` is reached.
    #[must_use]
    pub fn step(&self, attempt: u32, result: Result<String, TransportError>) -> SendStep {
        match result {
            Ok(message_id) => SendStep::Done(SendOutcome::Sent {
                message_id,
                attempts: attempt,
            }),
            Err(error) if error.is_retriable() && self.should_retry(attempt) => {
                SendStep::RetryAfter(self.backoff(attempt))
            }
            Err(error) => SendStep::Done(SendOutcome::Failed {
                error,
                attempts: attempt,
            }),
        }
    }
}

mod defaults {
    pub const fn max_attempts() -> u32 {
        5
    }

    pub const fn base_delay_ms() -> u64 {
        1_000
    }

    pub const fn max_delay_ms() -> u64 {
        60_000
    }

    pub const fn max_jitter_ms() -> u64 {
        500
    }
}
