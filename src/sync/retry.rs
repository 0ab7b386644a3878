//! Retry engine for handling transient failures with jittered exponential backoff
//!
//! The decision part is pure: given an error, the time elapsed since the first
//! attempt, and the backoff state, [`RetryManager::next_step`] says whether to
//! give up or how long to wait. [`RetryManager::execute`] wraps that decision
//! in the actual attempt/sleep loop.
//!
//! Backoff draws each delay uniformly from `[0, ceiling)`; the ceiling starts at
//! the configured initial window and doubles after every retry. The whole
//! sequence is bounded by a deadline measured from the first attempt. There is
//! no separate attempt cap.

use crate::config::RetryConfig;
use crate::error::RetryableError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Classification of a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Another attempt may succeed
    Retryable,
    /// Surface the error immediately
    Fatal,
}

/// Classify an error for the retry loop
pub fn classify<E: RetryableError>(err: &E) -> RetryDecision {
    if err.is_retryable() {
        RetryDecision::Retryable
    } else {
        RetryDecision::Fatal
    }
}

/// What the retry loop should do after a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryStep {
    /// Stop and return the error
    GiveUp(GiveUpReason),
    /// Sleep for the given duration, then try again
    RetryAfter(Duration),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GiveUpReason {
    Fatal,
    DeadlineExceeded,
}

/// Jittered exponential backoff state
#[derive(Debug, Clone)]
pub struct Backoff {
    ceiling: Duration,
}

impl Backoff {
    pub fn new(initial: Duration) -> Self {
        Self { ceiling: initial }
    }

    /// Current jitter ceiling
    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    /// Draw the next delay and double the ceiling
    pub fn next_delay(&mut self) -> Duration {
        let delay = jitter_below(self.ceiling);
        self.ceiling = self.ceiling.saturating_mul(2);
        delay
    }
}

fn jitter_below(ceiling: Duration) -> Duration {
    if ceiling.is_zero() {
        return Duration::ZERO;
    }
    let secs = rand::thread_rng().gen_range(0.0..ceiling.as_secs_f64());
    Duration::from_secs_f64(secs)
}

/// Retry manager bounded by a global deadline
#[derive(Debug, Clone)]
pub struct RetryManager {
    config: RetryConfig,
}

impl RetryManager {
    /// Create a new RetryManager with the given configuration
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    /// Create a RetryManager with default configuration
    pub fn with_defaults() -> Self {
        Self::new(RetryConfig::default())
    }

    /// Fresh backoff state for one retry sequence
    pub fn backoff(&self) -> Backoff {
        Backoff::new(self.config.initial_backoff())
    }

    /// Decide what to do after a failed attempt
    ///
    /// The deadline is checked first, so an elapsed deadline returns the error
    /// whatever its classification. The sleep is clamped so it never runs past
    /// the deadline.
    pub fn next_step<E: RetryableError>(
        &self,
        err: &E,
        elapsed: Duration,
        backoff: &mut Backoff,
    ) -> RetryStep {
        let deadline = self.config.deadline();
        if elapsed >= deadline {
            return RetryStep::GiveUp(GiveUpReason::DeadlineExceeded);
        }
        if classify(err) == RetryDecision::Fatal {
            return RetryStep::GiveUp(GiveUpReason::Fatal);
        }
        RetryStep::RetryAfter(backoff.next_delay().min(deadline - elapsed))
    }

    /// Execute an async operation with retry logic
    ///
    /// Returns the first success, the first fatal error, or the most recent
    /// error once the deadline has passed.
    pub async fn execute<F, Fut, T, E>(&self, mut operation: F) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: RetryableError + std::fmt::Display,
    {
        let started = Instant::now();
        let mut backoff = self.backoff();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            let err = match operation().await {
                Ok(result) => return Ok(result),
                Err(err) => err,
            };

            let elapsed = started.elapsed();
            match self.next_step(&err, elapsed, &mut backoff) {
                RetryStep::GiveUp(GiveUpReason::Fatal) => return Err(err),
                RetryStep::GiveUp(GiveUpReason::DeadlineExceeded) => {
                    warn!(
                        attempts = attempt,
                        elapsed_ms = elapsed.as_millis() as u64,
                        deadline_ms = self.config.deadline_ms,
                        error = %err,
                        "Retry deadline exceeded"
                    );
                    return Err(err);
                }
                RetryStep::RetryAfter(delay) => {
                    debug!(
                        attempt = attempt,
                        backoff_ms = delay.as_millis() as u64,
                        error = %err,
                        "Retrying after transient error"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    /// Get the retry configuration
    pub fn config(&self) -> &RetryConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FeedError;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn config(initial_backoff_ms: u64, deadline_ms: u64) -> RetryConfig {
        RetryConfig {
            initial_backoff_ms,
            deadline_ms,
            attempt_timeout_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn test_success_on_first_attempt() {
        let manager = RetryManager::new(config(0, 1_000));

        let call_count = Arc::new(AtomicU32::new(0));
        let call_count_clone = call_count.clone();

        let result: Result<&str, FeedError> = manager
            .execute(|| {
                let count = call_count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Ok("success")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(call_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_transient_failures() {
        let manager = RetryManager::new(config(1, 5_000));

        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();

        let result: Result<&str, FeedError> = manager
            .execute(|| {
                let count = attempt_count_clone.clone();
                async move {
                    let current = count.fetch_add(1, Ordering::SeqCst);
                    match current {
                        0 => Err(FeedError::ServerError(503)),
                        1 => Err(FeedError::ConnectionReset),
                        _ => Ok("success"),
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(attempt_count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_returns_immediately() {
        let manager = RetryManager::new(config(1_000, 30_000));

        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();
        let started = std::time::Instant::now();

        let result: Result<(), FeedError> = manager
            .execute(|| {
                let count = attempt_count_clone.clone();
                async move {
                    count.fetch_add(1, Ordering::SeqCst);
                    Err(FeedError::Client(404))
                }
            })
            .await;

        assert_eq!(result.unwrap_err(), FeedError::Client(404));
        assert_eq!(attempt_count.load(Ordering::SeqCst), 1);
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_deadline_returns_last_error() {
        let manager = RetryManager::new(config(5, 50));

        let attempt_count = Arc::new(AtomicU32::new(0));
        let attempt_count_clone = attempt_count.clone();
        let started = std::time::Instant::now();

        let result: Result<(), FeedError> = manager
            .execute(|| {
                let count = attempt_count_clone.clone();
                async move {
                    let n = count.fetch_add(1, Ordering::SeqCst);
                    Err(FeedError::ServerError(500 + n as u16 % 4))
                }
            })
            .await;

        let attempts = attempt_count.load(Ordering::SeqCst);
        assert!(attempts >= 2, "expected retries, got {} attempts", attempts);
        // The error surfaced is the one from the final attempt
        let expected = FeedError::ServerError(500 + (attempts - 1) as u16 % 4);
        assert_eq!(result.unwrap_err(), expected);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn test_next_step_deadline_wins_over_classification() {
        let manager = RetryManager::new(config(100, 1_000));
        let mut backoff = manager.backoff();

        // Fatal error before the deadline
        assert_eq!(
            manager.next_step(&FeedError::Client(400), Duration::ZERO, &mut backoff),
            RetryStep::GiveUp(GiveUpReason::Fatal)
        );

        // Retryable error after the deadline
        assert_eq!(
            manager.next_step(
                &FeedError::ServerError(503),
                Duration::from_millis(1_000),
                &mut backoff
            ),
            RetryStep::GiveUp(GiveUpReason::DeadlineExceeded)
        );
    }

    #[test]
    fn test_next_step_clamps_to_remaining_time() {
        let manager = RetryManager::new(config(10_000, 1_000));
        let mut backoff = manager.backoff();

        for _ in 0..50 {
            match manager.next_step(
                &FeedError::MissingStatus,
                Duration::from_millis(990),
                &mut backoff,
            ) {
                RetryStep::RetryAfter(delay) => assert!(delay <= Duration::from_millis(10)),
                other => panic!("Expected RetryAfter, got {:?}", other),
            }
            backoff = manager.backoff();
        }
    }

    #[test]
    fn test_backoff_ceiling_doubles() {
        let mut backoff = Backoff::new(Duration::from_millis(100));

        assert_eq!(backoff.ceiling(), Duration::from_millis(100));
        backoff.next_delay();
        assert_eq!(backoff.ceiling(), Duration::from_millis(200));
        backoff.next_delay();
        assert_eq!(backoff.ceiling(), Duration::from_millis(400));
        backoff.next_delay();
        assert_eq!(backoff.ceiling(), Duration::from_millis(800));
    }

    #[test]
    fn test_backoff_delay_below_ceiling() {
        for _ in 0..100 {
            let mut backoff = Backoff::new(Duration::from_millis(100));
            let first = backoff.next_delay();
            let second = backoff.next_delay();
            assert!(first < Duration::from_millis(100), "{:?}", first);
            assert!(second < Duration::from_millis(200), "{:?}", second);
        }
    }

    #[test]
    fn test_zero_window_yields_zero_delay() {
        let mut backoff = Backoff::new(Duration::ZERO);
        assert_eq!(backoff.next_delay(), Duration::ZERO);
        assert_eq!(backoff.ceiling(), Duration::ZERO);
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(&FeedError::ServerError(502)),
            RetryDecision::Retryable
        );
        assert_eq!(
            classify(&FeedError::AttemptTimeout(5_000)),
            RetryDecision::Retryable
        );
        assert_eq!(classify(&FeedError::Client(401)), RetryDecision::Fatal);
        assert_eq!(
            classify(&FeedError::Parse("eof".to_string())),
            RetryDecision::Fatal
        );
    }

    #[test]
    fn test_default_configuration() {
        let manager = RetryManager::with_defaults();
        let config = manager.config();

        assert_eq!(config.initial_backoff(), Duration::from_millis(100));
        assert_eq!(config.deadline(), Duration::from_secs(30));
        assert_eq!(config.attempt_timeout(), Duration::from_secs(5));
    }
}
