//! Exponential backoff for rate-limited upstream APIs

use std::future::Future;
use std::time::Duration;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Default number of tries, including the first one
const DEFAULT_MAX_TRIES: usize = 3;

/// Default delay before the first retry in milliseconds
const DEFAULT_INITIAL_DELAY_MS: u64 = 1000;

/// Default cap on a single delay in seconds
const DEFAULT_MAX_DELAY_SECS: u64 = 30;

/// Configuration for the backoff retry loop
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Total tries, including the first one
    pub max_tries: usize,
    /// Delay before the first retry; doubles on each further retry
    pub initial_delay: Duration,
    /// Upper bound for any single delay
    pub max_delay: Duration,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            max_tries: DEFAULT_MAX_TRIES,
            initial_delay: Duration::from_millis(DEFAULT_INITIAL_DELAY_MS),
            max_delay: Duration::from_secs(DEFAULT_MAX_DELAY_SECS),
        }
    }
}

impl BackoffConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_tries(mut self, max_tries: usize) -> Self {
        self.max_tries = max_tries;
        self
    }

    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Delays between consecutive tries: `initial`, `2 * initial`, ...
    pub fn delays(&self) -> impl Iterator<Item = Duration> {
        // ExponentialBackoff yields factor * base^n, so base 2 doubles.
        let factor = (self.initial_delay.as_millis() as u64 / 2).max(1);
        ExponentialBackoff::from_millis(2)
            .factor(factor)
            .max_delay(self.max_delay)
            .take(self.max_tries.saturating_sub(1))
    }
}

/// Run `op` until `should_retry` rejects its result or the tries run out,
/// sleeping with exponential backoff in between.
///
/// The cancellation token is checked between tries and during the sleep;
/// an in-flight `op` is never interrupted. The last result is returned as-is
/// when retrying stops.
pub async fn retry_with_backoff<T, F, Fut, P>(
    config: &BackoffConfig,
    cancel: &CancellationToken,
    mut op: F,
    should_retry: P,
) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = T>,
    P: Fn(&T) -> bool,
{
    let mut delays = config.delays();
    let mut attempt = 1;

    loop {
        let result = op().await;
        if !should_retry(&result) {
            return result;
        }

        let Some(delay) = delays.next() else {
            return result;
        };

        if cancel.is_cancelled() {
            return result;
        }

        warn!(
            "Rate limited on attempt {}, retrying in {:?}",
            attempt, delay
        );
        tokio::select! {
            _ = cancel.cancelled() => return result,
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn fast_config() -> BackoffConfig {
        BackoffConfig::new().with_initial_delay(Duration::from_millis(10))
    }

    #[test]
    fn test_default_delays_double() {
        let delays: Vec<_> = BackoffConfig::default().delays().collect();
        assert_eq!(
            delays,
            vec![Duration::from_secs(1), Duration::from_secs(2)]
        );
    }

    #[test]
    fn test_single_try_has_no_delays() {
        let config = BackoffConfig::new().with_max_tries(1);
        assert_eq!(config.delays().count(), 0);
    }

    #[tokio::test]
    async fn test_stops_on_acceptable_result() {
        let calls = AtomicUsize::new(0);
        let result = retry_with_backoff(
            &fast_config(),
            &CancellationToken::new(),
            || async {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 2 { "rate limited" } else { "ok" }
            },
            |r| *r == "rate limited",
        )
        .await;

        assert_eq!(result, "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_gives_up_after_max_tries() {
        let calls = AtomicUsize::new(0);
        let result = retry_with_backoff(
            &fast_config(),
            &CancellationToken::new(),
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                "rate limited"
            },
            |r| *r == "rate limited",
        )
        .await;

        assert_eq!(result, "rate limited");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancellation_stops_retrying() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let calls = AtomicUsize::new(0);

        retry_with_backoff(
            &fast_config(),
            &cancel,
            || async {
                calls.fetch_add(1, Ordering::SeqCst);
                "rate limited"
            },
            |r| *r == "rate limited",
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
