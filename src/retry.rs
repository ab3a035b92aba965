//! Retry configuration, backoff state machine, and executor.
//!
//! [`RetryExecutor::execute`] wraps one remote call: transient failures are
//! retried with exponential backoff and jitter, permanent failures return
//! immediately. The delay schedule lives in [`Backoff`], a plain state
//! machine that can be stepped in tests without any timer. Sleeping goes
//! through the [`Sleeper`] trait so tests can record delays instead of
//! waiting for them.
//!
//! Each `execute` call owns its own `Backoff`, so any number of tasks can
//! sit in their backoff windows at once without sharing state.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::telemetry;
use crate::{Result, TalkWalkError};

/// Configuration for retry behaviour on transient errors.
///
/// ```rust
/// # use talkwalk::RetryConfig;
/// # use std::time::Duration;
/// let config = RetryConfig::new()
///     .max_attempts(5)
///     .initial_delay(Duration::from_millis(200))
///     .jitter(0.0);
/// assert_eq!(config.delay_for_attempt(2), Duration::from_millis(800));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts (including the initial request).
    /// 1 = no retry. Default: 3.
    pub max_attempts: u32,
    /// Delay before the first retry. Default: 1s.
    pub initial_delay: Duration,
    /// Growth factor between consecutive retries. Default: 2.
    pub multiplier: f64,
    /// Maximum delay between retries (caps exponential growth). Default: 60s.
    pub max_delay: Duration,
    /// Jitter as a fraction of the delay: 0.2 spreads delays over ±20%.
    /// 0 disables jitter. Default: 0.2.
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            multiplier: 2.0,
            max_delay: Duration::from_secs(60),
            jitter: 0.2,
        }
    }
}

impl RetryConfig {
    /// Create a new config with sensible defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a config that disables retries (single attempt).
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Set maximum attempts (including the initial request).
    pub fn max_attempts(mut self, n: u32) -> Self {
        self.max_attempts = n;
        self
    }

    /// Set the delay before the first retry.
    pub fn initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set the backoff multiplier.
    pub fn multiplier(mut self, m: f64) -> Self {
        self.multiplier = m;
        self
    }

    /// Set the maximum delay between retries.
    pub fn max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set the jitter fraction (clamped to `0.0..=1.0`).
    pub fn jitter(mut self, fraction: f64) -> Self {
        self.jitter = fraction.clamp(0.0, 1.0);
        self
    }

    /// Attempts actually made; zero is treated as one.
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Delay before retry number `retry` (0-indexed), without jitter.
    ///
    /// `initial_delay * multiplier^retry`, capped at `max_delay`.
    pub fn delay_for_attempt(&self, retry: u32) -> Duration {
        let factor = self.multiplier.max(0.0).powi(retry.min(i32::MAX as u32) as i32);
        let nanos = self.initial_delay.as_nanos() as f64 * factor;
        if !nanos.is_finite() || nanos >= self.max_delay.as_nanos() as f64 {
            return self.max_delay;
        }
        Duration::from_nanos(nanos.round() as u64)
    }

    /// Spread `delay` by the jitter fraction.
    ///
    /// `sample` is uniform in `[0, 1)`; 0.5 leaves the delay unchanged.
    pub fn apply_jitter(&self, delay: Duration, sample: f64) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let scale = 1.0 + self.jitter * (2.0 * sample.clamp(0.0, 1.0) - 1.0);
        let nanos = (delay.as_nanos() as f64 * scale.max(0.0)).round();
        Duration::from_nanos(nanos.min(u64::MAX as f64) as u64)
    }

    /// Delay to actually wait, respecting a provider `retry_after` hint.
    ///
    /// A hint takes precedence over the computed (and jittered) backoff.
    pub fn effective_delay(
        &self,
        retry: u32,
        retry_after: Option<Duration>,
        sample: f64,
    ) -> Duration {
        retry_after.unwrap_or_else(|| self.apply_jitter(self.delay_for_attempt(retry), sample))
    }
}

/// Explicit retry state: how many attempts have failed and what comes next.
#[derive(Debug, Clone)]
pub struct Backoff {
    config: RetryConfig,
    failures: u32,
}

impl Backoff {
    pub fn new(config: RetryConfig) -> Self {
        Self {
            config,
            failures: 0,
        }
    }

    /// Failed attempts so far.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    /// Whether another attempt is allowed.
    pub fn can_retry(&self) -> bool {
        self.failures < self.config.attempts()
    }

    /// Record a transient failure.
    ///
    /// Returns the un-jittered delay before the next attempt, or `None` when
    /// the attempt budget is spent.
    pub fn next_delay(&mut self) -> Option<Duration> {
        self.failures += 1;
        if self.failures >= self.config.attempts() {
            return None;
        }
        Some(self.config.delay_for_attempt(self.failures - 1))
    }
}

/// Something that can wait.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Runs operations with bounded retries.
#[derive(Clone)]
pub struct RetryExecutor {
    config: RetryConfig,
    sleeper: Arc<dyn Sleeper>,
}

impl RetryExecutor {
    pub fn new(config: RetryConfig) -> Self {
        Self::with_sleeper(config, Arc::new(TokioSleeper))
    }

    pub fn with_sleeper(config: RetryConfig, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { config, sleeper }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Execute an async operation with retry logic.
    ///
    /// Retries on transient errors (as classified by
    /// [`TalkWalkError::is_transient()`]) up to `max_attempts`. Permanent
    /// errors are returned immediately. When every attempt fails
    /// transiently, returns [`TalkWalkError::RetriesExhausted`] wrapping the
    /// last error.
    pub async fn execute<F, Fut, T>(&self, label: &str, f: F) -> Result<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = Backoff::new(self.config.clone());
        loop {
            let err = match f().await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_transient() => e,
                Err(e) => return Err(e), // permanent error, no retry
            };

            let retry = backoff.failures();
            match backoff.next_delay() {
                Some(_) => {
                    metrics::counter!(telemetry::RETRIES_TOTAL, "category" => label.to_owned())
                        .increment(1);
                    let delay =
                        self.config
                            .effective_delay(retry, err.retry_after(), rand::random::<f64>());
                    warn!(
                        task = label,
                        attempt = backoff.failures(),
                        max_attempts = self.config.attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient error"
                    );
                    self.sleeper.sleep(delay).await;
                }
                None => {
                    return Err(TalkWalkError::RetriesExhausted {
                        attempts: backoff.failures(),
                        last: Box::new(err),
                    });
                }
            }
        }
    }
}

impl std::fmt::Debug for RetryExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryExecutor")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
