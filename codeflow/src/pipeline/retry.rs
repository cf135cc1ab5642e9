//! Retry policy and backoff between retries.
//!
//! [`decide`] is a pure function of a stage definition and that stage's
//! attempt history; it performs no I/O and is tested without capabilities.

use super::StageDefinition;
use crate::core::{AttemptRecord, FailureReason, OutcomeKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Outcome of a retry decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Attempt the same stage again with accumulated feedback.
    Retry,
    /// Move to the next stage.
    Advance {
        /// True when an advisory stage gave up and was skipped over.
        degraded: bool,
    },
    /// Stop the pipeline.
    Abort(FailureReason),
}

/// Decides what to do after the latest attempt of a stage.
///
/// - `Retry` when the latest attempt soft-failed or timed out below the ceiling
///   (or the stage has not been attempted yet).
/// - `Advance` when the latest attempt succeeded.
/// - Otherwise the stage is spent: blocking stages `Abort`, advisory stages
///   `Advance { degraded: true }`. Cancellation always aborts.
#[must_use]
pub fn decide(stage: &StageDefinition, history: &[AttemptRecord]) -> RetryDecision {
    let Some(latest) = history.last() else {
        return if stage.max_attempts > 0 {
            RetryDecision::Retry
        } else {
            RetryDecision::Abort(FailureReason::StageExhausted)
        };
    };

    let attempts = history.len();
    let reason = match latest.kind {
        OutcomeKind::Success => return RetryDecision::Advance { degraded: false },
        OutcomeKind::Cancelled => return RetryDecision::Abort(FailureReason::Cancelled),
        OutcomeKind::SoftFailure | OutcomeKind::Timeout if attempts < stage.max_attempts => {
            return RetryDecision::Retry;
        }
        OutcomeKind::SoftFailure => FailureReason::StageExhausted,
        OutcomeKind::Timeout => FailureReason::Timeout,
        OutcomeKind::Fatal => FailureReason::Fatal,
    };

    if stage.is_blocking() {
        RetryDecision::Abort(reason)
    } else {
        RetryDecision::Advance { degraded: true }
    }
}

/// Collects the feedback for the next attempt of a stage.
///
/// Returns the error details of every prior soft failure (and timeout), oldest
/// first, so later attempts see the full error context.
#[must_use]
pub fn accumulated_feedback(history: &[AttemptRecord]) -> Vec<String> {
    history
        .iter()
        .filter(|record| record.kind.is_retryable())
        .flat_map(|record| record.details.iter().cloned())
        .collect()
}

/// Backoff strategy for retry delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackoffStrategy {
    /// delay = base * 2^retry
    #[default]
    Exponential,
    /// delay = base * (retry + 1)
    Linear,
    /// delay = base (constant)
    Constant,
}

/// Delay applied before each retry of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryBackoff {
    /// Backoff strategy.
    #[serde(default)]
    pub strategy: BackoffStrategy,
    /// Base delay in milliseconds. Zero disables backoff.
    #[serde(default)]
    pub base_delay_ms: u64,
    /// Maximum delay cap in milliseconds.
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

const fn default_max_delay_ms() -> u64 {
    30_000
}

impl Default for RetryBackoff {
    fn default() -> Self {
        Self {
            strategy: BackoffStrategy::Exponential,
            base_delay_ms: 0,
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl RetryBackoff {
    /// Creates a backoff with no delay.
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    /// Sets the base delay.
    #[must_use]
    pub fn with_base_delay_ms(mut self, delay: u64) -> Self {
        self.base_delay_ms = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = delay;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_strategy(mut self, strategy: BackoffStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Returns the delay before retry number `retry` (0-indexed).
    #[must_use]
    pub fn delay_for(&self, retry: usize) -> Duration {
        let base = self.base_delay_ms;
        let exponent = u32::try_from(retry).unwrap_or(u32::MAX);
        let delay = match self.strategy {
            BackoffStrategy::Exponential => base.saturating_mul(2u64.saturating_pow(exponent)),
            BackoffStrategy::Linear => {
                base.saturating_mul(u64::try_from(retry).unwrap_or(u64::MAX).saturating_add(1))
            }
            BackoffStrategy::Constant => base,
        };
        Duration::from_millis(delay.min(self.max_delay_ms))
    }
}
