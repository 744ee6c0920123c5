//! Bounded retry with exponential backoff for transient stage failures.

use std::future::Future;
use std::time::Duration;

use modpromote_core::config::NetworkSettings;
use modpromote_core::{obs, HarvestError, ResolveError};

/// Errors that may clear up on their own.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for ResolveError {
    fn is_transient(&self) -> bool {
        ResolveError::is_transient(self)
    }
}

impl Transient for HarvestError {
    fn is_transient(&self) -> bool {
        HarvestError::is_transient(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first; at least 1
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&NetworkSettings::default())
    }
}

impl RetryPolicy {
    pub fn from_settings(settings: &NetworkSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_backoff: settings.initial_backoff(),
            multiplier: settings.backoff_multiplier.max(1),
        }
    }

    /// No retries.
    pub fn once() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            multiplier: 1,
        }
    }

    /// Delay before attempt `attempt + 1`, for `attempt` starting at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff.saturating_mul(factor)
    }

    /// Run `call` until it succeeds, fails terminally, or attempts run out.
    ///
    /// Returns the final outcome and the number of attempts made.
    pub async fn run<T, E, F, Fut>(&self, run_id: &str, stage: &str, mut call: F) -> (Result<T, E>, u32)
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            match call().await {
                Ok(value) => return (Ok(value), attempt),
                Err(err) if err.is_transient() && attempt < self.max_attempts => {
                    let delay = self.backoff(attempt);
                    obs::emit_retry(run_id, stage, attempt, delay.as_millis() as u64, &err);
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return (Err(err), attempt),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn unreachable() -> ResolveError {
        ResolveError::Unreachable {
            reason: "connection reset".to_string(),
            transient: true,
        }
    }

    fn policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            multiplier: 2,
        }
    }

    #[test]
    fn test_backoff_grows_geometrically() {
        let policy = policy();
        assert_eq!(policy.backoff(1), Duration::from_millis(500));
        assert_eq!(policy.backoff(2), Duration::from_millis(1000));
        assert_eq!(policy.backoff(3), Duration::from_millis(2000));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_transient_then_succeeds() {
        let calls = &AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let (result, attempts) = policy()
            .run("run-1", "resolving", move || async move {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(unreachable())
                } else {
                    Ok(7)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(attempts, 3);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_max_attempts() {
        let calls = &AtomicU32::new(0);
        let (result, attempts) = policy()
            .run("run-1", "resolving", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(unreachable())
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_errors_are_not_retried() {
        let calls = &AtomicU32::new(0);
        let (result, attempts) = policy()
            .run("run-1", "resolving", move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>(ResolveError::InvalidReference("bad".to_string()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
