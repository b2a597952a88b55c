//! Retry with exponential backoff for rate-limited sends.
//!
//! Only rate-limit-class failures are retried. Anything else (bad recipient,
//! authentication failure, malformed message) is surfaced on the first attempt so a
//! permanent error is never hidden behind a retry loop.

use crate::config::RetryConfig;
use crate::email::{EmailProvider, OutgoingEmail, SendReceipt};
use crate::error::SendError;
use rand::Rng;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Longest provider supplied wait honoured before a retry.
pub const RETRY_AFTER_CEILING: Duration = Duration::from_secs(60);

/// Tells the executor whether a failure is worth retrying.
pub trait RetryClassify {
    fn is_rate_limited(&self) -> bool;

    /// Provider supplied wait, overriding the computed backoff.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

impl RetryClassify for SendError {
    fn is_rate_limited(&self) -> bool {
        SendError::is_rate_limited(self)
    }

    fn retry_after(&self) -> Option<Duration> {
        SendError::retry_after(self)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_jitter: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            max_jitter: Duration::from_millis(config.max_jitter_ms),
        }
    }
}

impl RetryPolicy {
    /// `initial_backoff * 2^retry`, capped at `max_backoff`. `retry` is 0-based.
    pub fn base_backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.checked_pow(retry).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    /// Base backoff plus a uniform jitter in `[0, max_jitter]`.
    pub fn backoff(&self, retry: u32) -> Duration {
        self.base_backoff(retry) + self.jitter()
    }

    fn jitter(&self) -> Duration {
        let max_ms = self.max_jitter.as_millis() as u64;
        if max_ms == 0 {
            return Duration::ZERO;
        }
        Duration::from_millis(rand::rng().random_range(0..=max_ms))
    }

    /// Wait before retry `retry`. A `Retry-After` hint on the error wins, capped at
    /// [`RETRY_AFTER_CEILING`].
    pub fn delay_for<E: RetryClassify>(&self, retry: u32, error: &E) -> Duration {
        match error.retry_after() {
            Some(hint) => hint.min(RETRY_AFTER_CEILING),
            None => self.backoff(retry),
        }
    }
}

/// A successful operation and how many attempts it took.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("Rate limit: retries exhausted after {attempts} attempts ({last})")]
    Exhausted { attempts: u32, last: E },
    #[error("{error}")]
    Failed { attempts: u32, error: E },
}

impl<E> RetryError<E> {
    pub fn attempts(&self) -> u32 {
        match self {
            RetryError::Exhausted { attempts, .. } | RetryError::Failed { attempts, .. } => {
                *attempts
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self, RetryError::Exhausted { .. })
    }
}

impl From<RetryError<SendError>> for SendError {
    fn from(err: RetryError<SendError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, .. } => SendError::RetriesExhausted { attempts },
            RetryError::Failed { error, .. } => error,
        }
    }
}

/// Runs `op` until it succeeds, fails with a non rate-limit error, or `max_retries`
/// retries have been spent. `op` is attempted at most `max_retries + 1` times.
pub async fn send_with_retry<T, E, F, Fut>(
    policy: &RetryPolicy,
    context: &str,
    mut op: F,
) -> Result<Attempted<T>, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryClassify + Display,
{
    let mut retries = 0u32;
    loop {
        match op().await {
            Ok(value) => {
                return Ok(Attempted {
                    value,
                    attempts: retries + 1,
                });
            }
            Err(error) if error.is_rate_limited() => {
                if retries >= policy.max_retries {
                    tracing::error!(
                        name = "dispatch.retry.exhausted",
                        target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                        context = %context,
                        attempts = retries + 1,
                        error = %error,
                        message = "Rate limit retries exhausted"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: retries + 1,
                        last: error,
                    });
                }
                let delay = policy.delay_for(retries, &error);
                tracing::warn!(
                    name = "dispatch.retry.rate_limited",
                    target = concat!(env!("CARGO_PKG_NAME"), "::", module_path!()),
                    context = %context,
                    attempt = retries + 1,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    message = "Rate limited by provider, backing off"
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
            Err(error) => {
                return Err(RetryError::Failed {
                    attempts: retries + 1,
                    error,
                });
            }
        }
    }
}

/// The one path every endpoint uses to hand a message to the provider.
pub async fn send_email(
    provider: &dyn EmailProvider,
    email: &OutgoingEmail,
    policy: &RetryPolicy,
) -> Result<Attempted<SendReceipt>, RetryError<SendError>> {
    send_with_retry(policy, &email.to, || provider.send(email)).await
}
