//! Retry policy for API calls.
//!
//! - Transport failures (connection, timeout, 5xx) are retried up to
//!   `max_retries` times with capped exponential backoff, then surface as
//!   [`ApiError::RetriesExhausted`].
//! - Rate-limit responses are retried after exactly the delay the server
//!   asked for. They do not count against the retry budget.
//! - Everything else is returned as-is.

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{Sleep, sleep};
use tower::retry::Policy;
use tracing::warn;

use courier_core::ApiError;

use crate::request::ApiRequest;

/// Backoff parameters for transport failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Delay before the `retry`-th retry (1-based):
    /// `min(initial_delay * multiplier^(retry - 1), max_delay)`.
    ///
    /// Never decreases as `retry` grows. Multipliers below 1 are treated as 1.
    pub fn backoff(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let factor = self.multiplier.max(1.0).powi(exponent);
        let delay = self.initial_delay.as_secs_f64() * factor;
        Duration::from_secs_f64(delay.min(self.max_delay.as_secs_f64()))
    }
}

/// [`tower::retry::Policy`] for [`ApiRequest`]s.
///
/// One instance is cloned per call, so the retry count is per call.
#[derive(Debug, Clone)]
pub struct ApiRetryPolicy {
    config: RetryConfig,
    retries: u32,
}

impl ApiRetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config, retries: 0 }
    }
}

impl Policy<Arc<ApiRequest>, Value, ApiError> for ApiRetryPolicy {
    type Future = Sleep;

    fn retry(
        &mut self,
        request: &mut Arc<ApiRequest>,
        result: &mut Result<Value, ApiError>,
    ) -> Option<Self::Future> {
        match result.as_ref().err()? {
            ApiError::RateLimited { retry_after } => {
                warn!(
                    method = request.method(),
                    retry_after_ms = retry_after.as_millis() as u64,
                    "Rate limited by remote, waiting"
                );
                Some(sleep(*retry_after))
            }
            ApiError::Transport(last) => {
                if self.retries >= self.config.max_retries {
                    let last = last.clone();
                    let attempts = self.retries + 1;
                    warn!(
                        method = request.method(),
                        attempts, "Giving up after transport failures: {last}"
                    );
                    *result = Err(ApiError::RetriesExhausted { attempts, last });
                    return None;
                }

                self.retries += 1;
                let delay = self.config.backoff(self.retries);
                warn!(
                    method = request.method(),
                    attempt = self.retries,
                    delay_ms = delay.as_millis() as u64,
                    "Transport failure, retrying: {last}"
                );
                Some(sleep(delay))
            }
            _ => None,
        }
    }

    fn clone_request(&mut self, request: &Arc<ApiRequest>) -> Option<Arc<ApiRequest>> {
        Some(request.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::TransportError;

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = RetryConfig {
            max_retries: 10,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        };
        let delays: Vec<_> = (1..=6).map(|n| config.backoff(n).as_millis()).collect();
        assert_eq!(delays, vec![100, 200, 400, 800, 1000, 1000]);
    }

    #[test]
    fn test_backoff_never_decreases() {
        let config = RetryConfig {
            multiplier: 0.5,
            ..Default::default()
        };
        let delays: Vec<_> = (1..=40).map(|n| config.backoff(n)).collect();
        assert!(delays.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(config.backoff(u32::MAX), config.initial_delay);
    }

    #[tokio::test]
    async fn test_policy_budget() {
        let mut policy = ApiRetryPolicy::new(RetryConfig {
            max_retries: 1,
            ..Default::default()
        });
        let mut request = Arc::new(ApiRequest::new("getMe", &()).unwrap());
        let failure = || Err(ApiError::from(TransportError::Connection("reset".into())));

        let mut result = failure();
        assert!(policy.retry(&mut request, &mut result).is_some());

        // Rate limits are free.
        let mut limited = Err(ApiError::RateLimited {
            retry_after: Duration::from_secs(1),
        });
        assert!(policy.retry(&mut request, &mut limited).is_some());

        let mut result = failure();
        assert!(policy.retry(&mut request, &mut result).is_none());
        assert!(matches!(
            result,
            Err(ApiError::RetriesExhausted { attempts: 2, .. })
        ));
    }
}
