use crate::error::{Error, Result};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_MAX_ATTEMPTS: usize = 3;

#[derive(Debug)]
enum RetryState<T> {
    Attempt(usize),
    Backoff(usize, Error),
    Success(T),
    Exhausted(usize, Error),
}

/// Bounded retry with linear backoff: after attempt `n` fails the policy
/// waits `n * backoff_unit` before attempt `n + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: usize,
    pub backoff_unit: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_unit: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, backoff_unit: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_unit,
        }
    }

    pub fn backoff_after(&self, attempt: usize) -> Duration {
        self.backoff_unit
            .saturating_mul(u32::try_from(attempt).unwrap_or(u32::MAX))
    }

    /// Drives `op` until it succeeds or the attempts run out. `op` receives
    /// the 1-based attempt number.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T>
    where
        F: FnMut(usize) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut state = RetryState::Attempt(1);

        loop {
            state = match state {
                RetryState::Attempt(attempt) => match op(attempt).await {
                    Ok(value) => RetryState::Success(value),
                    Err(e) if attempt < max_attempts => RetryState::Backoff(attempt, e),
                    Err(e) => RetryState::Exhausted(attempt, e),
                },
                RetryState::Backoff(attempt, error) => {
                    let delay = self.backoff_after(attempt);
                    warn!(attempt, ?delay, error = %error, "Attempt failed, retrying");
                    tokio::time::sleep(delay).await;
                    RetryState::Attempt(attempt + 1)
                }
                RetryState::Success(value) => {
                    debug!("Attempt succeeded");
                    return Ok(value);
                }
                RetryState::Exhausted(attempts, error) => {
                    warn!(attempts, error = %error, "All attempts failed");
                    return Err(Error::RetriesExhausted {
                        attempts,
                        source: Box::new(error),
                    });
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn first_success_short_circuits() {
        let calls = AtomicUsize::new(0);
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let value = policy
            .run(|_| async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Error>(7)
            })
            .await
            .unwrap();
        assert_eq!(value, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn recovers_on_a_later_attempt() {
        let policy = RetryPolicy::new(3, Duration::ZERO);
        let value = policy
            .run(|attempt| async move {
                if attempt < 3 {
                    Err(Error::Provider(format!("flaky {attempt}")))
                } else {
                    Ok(attempt)
                }
            })
            .await
            .unwrap();
        assert_eq!(value, 3);
    }

    #[tokio::test]
    async fn exhaustion_reports_attempts_and_last_cause() {
        let policy = RetryPolicy::new(2, Duration::ZERO);
        let err = policy
            .run(|attempt| async move { Err::<(), _>(Error::Provider(format!("down {attempt}"))) })
            .await
            .unwrap_err();

        match err {
            Error::RetriesExhausted { attempts, source } => {
                assert_eq!(attempts, 2);
                assert_eq!(source.to_string(), "provider error: down 2");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_grows_linearly() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert_eq!(policy.backoff_after(2), Duration::from_secs(2));

        let started = tokio::time::Instant::now();
        let _ = policy
            .run(|_| async { Err::<(), _>(Error::Provider("down".into())) })
            .await;
        // 1s after the first failure, 2s after the second, none after the last.
        assert_eq!(started.elapsed(), Duration::from_secs(3));
    }
}
