use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, warn};

use super::dedup::DONT_FILTER;
use super::{DownloaderMiddleware, RequestException};
use crate::clock::Clock;

/// Meta key holding how often a request was already retried.
pub const RETRY_COUNT: &str = "retry_count";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u64,
    /// Delay before the first retry; doubled for every further attempt.
    pub backoff: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig {
            max_retries: 3,
            backoff: Duration::from_secs(1),
        }
    }
}

impl RetryConfig {
    fn delay_for(&self, attempt: u64) -> Duration {
        let factor = 1u32.checked_shl(attempt as u32).unwrap_or(u32::MAX);
        self.backoff.saturating_mul(factor)
    }
}

/// Reschedules requests whose transport call failed.
///
/// The retry is parked with a ready-at time, so it only waits its backoff
/// when paired with a scheduler that honours ready-at times.
pub struct RetryMiddleware {
    config: RetryConfig,
    clock: Arc<dyn Clock>,
}

impl RetryMiddleware {
    pub fn new(config: RetryConfig, clock: Arc<dyn Clock>) -> Self {
        RetryMiddleware { config, clock }
    }
}

#[async_trait]
impl DownloaderMiddleware for RetryMiddleware {
    fn name(&self) -> &str {
        "RetryMiddleware"
    }

    async fn process_exception(&self, mut exception: RequestException) -> RequestException {
        let attempt = exception.request.meta_u64(RETRY_COUNT).unwrap_or(0);
        if attempt >= self.config.max_retries {
            warn!(
                "Giving up on {} after {} retries: {}",
                exception.request.uri(),
                attempt,
                exception.error
            );
            return exception;
        }

        let ready_at = self.clock.now() + self.config.delay_for(attempt);
        let retry = exception
            .request
            .clone()
            .with_meta(RETRY_COUNT, attempt + 1)
            .with_meta(DONT_FILTER, true)
            .with_ready_at(ready_at);
        debug!(
            "Retrying {} (attempt {} of {})",
            retry.uri(),
            attempt + 1,
            self.config.max_retries
        );
        exception.resolve(retry);
        exception
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::VirtualClock;
    use crate::engine::Droppable;
    use crate::error::TransportError;
    use crate::request::Request;

    fn failure(request: Request) -> RequestException {
        RequestException::new(request, TransportError::Connect("refused".into()))
    }

    #[tokio::test]
    async fn test_failure_is_rescheduled_with_backoff() {
        let clock = Arc::new(VirtualClock::new());
        let mw = RetryMiddleware::new(
            RetryConfig {
                max_retries: 2,
                backoff: Duration::from_secs(2),
            },
            clock.clone(),
        );

        let request = Request::get("https://example.com/flaky").unwrap();
        let exception = mw.process_exception(failure(request)).await;
        assert!(exception.is_dropped());

        let retry = exception.into_resolution().unwrap();
        assert_eq!(retry.meta_u64(RETRY_COUNT), Some(1));
        assert_eq!(retry.ready_at(), Some(clock.now() + Duration::from_secs(2)));

        let exception = mw.process_exception(failure(retry)).await;
        let retry = exception.into_resolution().unwrap();
        assert_eq!(retry.meta_u64(RETRY_COUNT), Some(2));
        assert_eq!(retry.ready_at(), Some(clock.now() + Duration::from_secs(4)));
    }

    #[tokio::test]
    async fn test_exhausted_retries_stay_unresolved() {
        let mw = RetryMiddleware::new(RetryConfig::default(), Arc::new(VirtualClock::new()));
        let request = Request::get("https://example.com/down")
            .unwrap()
            .with_meta(RETRY_COUNT, 3u64);

        let exception = mw.process_exception(failure(request)).await;
        assert!(!exception.is_dropped());
        assert!(exception.resolution().is_none());
    }
}
