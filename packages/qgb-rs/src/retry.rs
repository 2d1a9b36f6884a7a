//! Retry policy shared by the orchestrator and the relayer
//!
//! Provides exponential backoff and error classification for RPC calls, event
//! subscriptions and transaction submission.

use eyre::{eyre, Result};
use std::time::Duration;
use tracing::{debug, warn};

/// Retry configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first one included
    pub max_retries: u32,
    /// Initial backoff duration
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Backoff multiplier for exponential growth
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 5,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(60),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff: Duration, max_backoff: Duration) -> Self {
        Self {
            max_retries,
            initial_backoff,
            max_backoff,
            ..Self::default()
        }
    }

    /// Calculate backoff duration for a given attempt (0-indexed)
    pub fn backoff_for_attempt(&self, attempt: u32) -> Duration {
        let backoff_secs =
            self.initial_backoff.as_secs_f64() * self.backoff_multiplier.powi(attempt as i32);
        let capped = backoff_secs.min(self.max_backoff.as_secs_f64());
        Duration::from_secs_f64(capped)
    }

    /// Check if we should retry based on attempt count
    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }
}

/// Classifies errors for retry decisions
#[derive(Debug, Clone, PartialEq)]
pub enum ErrorClass {
    /// Temporary failure - should retry (RPC timeout, network issues)
    Transient,
    /// The effect already happened (duplicate confirm, stale contract nonce)
    AlreadyApplied,
    /// Permanent failure - do not retry (rejected message, contract revert)
    Permanent,
    /// Unknown error - may retry with backoff
    Unknown,
}

/// Classify an error for retry decisions
pub fn classify_error(error: &str) -> ErrorClass {
    let error_lower = error.to_lowercase();

    if error_lower.contains("timeout")
        || error_lower.contains("timed out")
        || error_lower.contains("connection")
        || error_lower.contains("network")
        || error_lower.contains("rate limit")
        || error_lower.contains("too many requests")
        || error_lower.contains("503")
        || error_lower.contains("502")
        || error_lower.contains("temporarily unavailable")
        || error_lower.contains("account sequence mismatch")
    {
        return ErrorClass::Transient;
    }

    if error_lower.contains("already exists")
        || error_lower.contains("duplicate")
        || error_lower.contains("already known")
        || error_lower.contains("tx already in mempool")
    {
        return ErrorClass::AlreadyApplied;
    }

    if error_lower.contains("reverted")
        || error_lower.contains("invalid signature")
        || error_lower.contains("signature mismatch")
        || error_lower.contains("insufficient funds")
        || error_lower.contains("out of gas")
        || error_lower.contains("not found")
        || error_lower.contains("unauthorized")
        || error_lower.contains("not a validator")
    {
        return ErrorClass::Permanent;
    }

    ErrorClass::Unknown
}

/// Action to take after a failed attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RetryAction {
    /// Retry after a backoff period
    RetryAfter(Duration),
    /// Stop; the operation already took effect
    Skip,
    /// Stop and surface the error
    GiveUp,
}

/// Retry bookkeeping for a single operation
#[derive(Debug, Clone)]
pub struct RetryContext {
    pub policy: RetryPolicy,
    pub attempt: u32,
    pub last_error: Option<String>,
}

impl RetryContext {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempt: 0,
            last_error: None,
        }
    }

    /// Record a failed attempt
    pub fn record_failure(&mut self, error: String) {
        self.attempt += 1;
        self.last_error = Some(error);
    }

    /// Get the decision for the next attempt
    pub fn next_action(&self) -> RetryAction {
        let error = self.last_error.as_deref().unwrap_or("");
        match classify_error(error) {
            ErrorClass::AlreadyApplied => {
                debug!(error = %error, "Operation already applied, skipping");
                RetryAction::Skip
            }
            ErrorClass::Permanent => RetryAction::GiveUp,
            ErrorClass::Transient | ErrorClass::Unknown => {
                if !self.policy.should_retry(self.attempt) {
                    return RetryAction::GiveUp;
                }
                // attempt was already incremented by record_failure
                RetryAction::RetryAfter(self.policy.backoff_for_attempt(self.attempt - 1))
            }
        }
    }
}

/// Error returned by [`with_retry`] when the operation had already taken effect
pub const SKIPPED_PREFIX: &str = "Skipped: ";

/// True if an error produced by [`with_retry`] means "already applied".
pub fn is_skipped(err: &eyre::Report) -> bool {
    err.to_string().starts_with(SKIPPED_PREFIX)
}

/// Execute with retry logic
pub async fn with_retry<F, T, Fut>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut ctx = RetryContext::new(policy.clone());

    loop {
        match operation(ctx.attempt).await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let error_str = e.to_string();
                ctx.record_failure(error_str.clone());

                match ctx.next_action() {
                    RetryAction::RetryAfter(backoff) => {
                        warn!(
                            attempt = ctx.attempt,
                            max = policy.max_retries,
                            ?backoff,
                            error = %error_str,
                            "Retrying after backoff"
                        );
                        tokio::time::sleep(backoff).await;
                    }
                    RetryAction::Skip => {
                        return Err(eyre!("{}{}", SKIPPED_PREFIX, error_str));
                    }
                    RetryAction::GiveUp => {
                        warn!(attempts = ctx.attempt, error = %error_str, "Giving up");
                        return Err(e);
                    }
                }
            }
        }
    }
}
