use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_INITIAL_DELAY_MS: u64 = 1_000;
const DEFAULT_MAX_DELAY_MS: u64 = 10_000;

/// Errors that may go away on their own, such as a refused or timed-out connect.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

/// Exponential backoff for establishing a connection to a provider.
///
/// Delays double from `initial_delay` and are capped at `max_delay`; there is no
/// jitter. `max_attempts` counts every attempt including the first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_millis(DEFAULT_MAX_DELAY_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            max_delay: max_delay.max(initial_delay),
        }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Wait before attempt number `attempt` (1-based). The first attempt never waits.
    pub fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// All waits between attempts, in order.
    pub fn delays(&self) -> Vec<Duration> {
        (2..=self.max_attempts).map(|attempt| self.delay_before(attempt)).collect()
    }

    /// Runs `operation` until it succeeds, fails with a non-transient error, or
    /// the attempt ceiling is reached. Returns the last error on failure.
    pub async fn run<T, E, F, Fut>(&self, mut operation: F) -> Result<T, E>
    where
        E: Transient + Display,
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let mut attempt = 1;
        loop {
            let delay = self.delay_before(attempt);
            if !delay.is_zero() {
                tracing::debug!(attempt, ?delay, "waiting before retry");
                tokio::time::sleep(delay).await;
            }

            match operation(attempt).await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.max_attempts => {
                    tracing::warn!(attempt, max = self.max_attempts, "attempt failed: {}", e);
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(attempt, "giving up: {}", e);
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug, thiserror::Error)]
    enum DialError {
        #[error("refused")]
        Refused,
        #[error("bad credentials")]
        Unauthorized,
    }

    impl Transient for DialError {
        fn is_transient(&self) -> bool {
            matches!(self, Self::Refused)
        }
    }

    #[test]
    fn default_delays_double_and_cap() {
        let delays = RetryPolicy::default().delays();

        assert_eq!(
            delays,
            vec![
                Duration::from_secs(1),
                Duration::from_secs(2),
                Duration::from_secs(4),
                Duration::from_secs(8),
            ]
        );
    }

    #[test]
    fn delays_never_exceed_cap() {
        let policy = RetryPolicy::new(8, Duration::from_secs(1), Duration::from_secs(10));

        let delays = policy.delays();

        assert_eq!(delays.len(), 7);
        assert!(delays.windows(2).all(|pair| pair[0] <= pair[1]));
        assert_eq!(delays.last(), Some(&Duration::from_secs(10)));
    }

    #[tokio::test(start_paused = true)]
    async fn stops_after_max_attempts() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = RetryPolicy::default()
            .run(|_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(DialError::Refused) }
            })
            .await;

        assert!(matches!(result, Err(DialError::Refused)));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn does_not_retry_permanent_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: Result<(), _> = RetryPolicy::default()
            .run(|_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err(DialError::Unauthorized) }
            })
            .await;

        assert!(matches!(result, Err(DialError::Unauthorized)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn returns_first_success() {
        let result = RetryPolicy::default()
            .run(|attempt| async move {
                if attempt < 3 {
                    Err(DialError::Refused)
                } else {
                    Ok(attempt)
                }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
    }
}
