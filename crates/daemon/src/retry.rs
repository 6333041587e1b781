//! Retry and backoff planning for loopcast
//!
//! Derives the retry policy from configuration and turns attempt results into
//! the delay before the next attempt.

use crate::config::Config;
use crate::session::StreamSession;
use serde::Serialize;
use std::time::Duration;

/// Failures allowed per endpoint before the long backoff, when not configured explicitly
const DEFAULT_RETRIES_PER_ENDPOINT: u32 = 3;

/// Retry policy derived from configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive failures that trigger the long backoff
    pub max_retries: u32,
    /// Delay after an ordinary failure
    pub retry_delay: Duration,
    /// Delay after a successful run
    pub success_delay: Duration,
    /// Delay once `max_retries` is reached
    pub backoff_delay: Duration,
}

/// Why the next attempt is delayed the way it is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NextAttemptKind {
    AfterSuccess,
    Retry,
    Backoff,
}

/// Delay and reason for the next attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NextAttempt {
    pub kind: NextAttemptKind,
    pub delay: Duration,
}

impl RetryPolicy {
    /// Derive a retry policy from configuration
    ///
    /// Uses the following rules:
    /// - `max_retries` comes from config when set (clamped to at least 1)
    /// - otherwise it is 3 failures per configured endpoint, so every endpoint
    ///   gets several tries before the long backoff
    pub fn derive(cfg: &Config, endpoint_count: usize) -> Self {
        let max_retries = match cfg.retry.max_retries {
            Some(n) => n.max(1),
            None => DEFAULT_RETRIES_PER_ENDPOINT * endpoint_count.max(1) as u32,
        };

        Self {
            max_retries,
            retry_delay: Duration::from_millis(cfg.retry.retry_delay_ms),
            success_delay: Duration::from_millis(cfg.retry.success_delay_ms),
            backoff_delay: Duration::from_millis(cfg.retry.backoff_delay_ms),
        }
    }

    /// Bookkeeping after a successful run: counter cleared, short delay
    pub fn on_success(&self, session: &mut StreamSession) -> NextAttempt {
        session.retry_count = 0;
        NextAttempt {
            kind: NextAttemptKind::AfterSuccess,
            delay: self.success_delay,
        }
    }

    /// Bookkeeping after a failed attempt
    ///
    /// Counts the failure and fails over to the next endpoint. Reaching
    /// `max_retries` resets the counter and returns the long backoff.
    pub fn on_failure(&self, session: &mut StreamSession) -> NextAttempt {
        session.retry_count += 1;
        session.endpoints.advance();

        if session.retry_count >= self.max_retries {
            session.retry_count = 0;
            NextAttempt {
                kind: NextAttemptKind::Backoff,
                delay: self.backoff_delay,
            }
        } else {
            NextAttempt {
                kind: NextAttemptKind::Retry,
                delay: self.retry_delay,
            }
        }
    }
}
