//! The resilient client.
//!
//! Every attempt (retries included) takes a token from a shared
//! [`TokenBucket`], is bounded by a read timeout, and has its response
//! classified into the [`ApiError`] taxonomy. Retrying is delegated to a
//! [`tower::retry::Retry`] service driven by [`ApiRetryPolicy`].
//!
//! ```text
//! execute ─▶ Retry(ApiRetryPolicy) ─▶ Attempt: acquire ─▶ timeout(send) ─▶ classify
//! ```

use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::time::timeout;
use tower::retry::Retry;
use tower::{Service, ServiceExt};
use tracing::{Instrument, debug, debug_span, info, warn};

use courier_core::{ApiError, ApiResult, TokenBucket, TransportError};

use crate::error::ClientError;
use crate::request::ApiRequest;
use crate::retry::{ApiRetryPolicy, RetryConfig};
use crate::transport::{ApiTransport, RawResponse};

/// Delay used when a rate-limit response carries no hint.
pub const DEFAULT_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Limits of a [`ResilientClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Read timeout of a single attempt.
    pub timeout: Duration,
    /// Tokens per refill period.
    pub rate_limit_capacity: u32,
    pub rate_limit_period: Duration,
    pub retry: RetryConfig,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            rate_limit_capacity: 30,
            rate_limit_period: Duration::from_secs(1),
            retry: RetryConfig::default(),
        }
    }
}

impl ClientConfig {
    pub fn validate(&self) -> Result<(), ClientError> {
        if self.timeout.is_zero() {
            return Err(ClientError::InvalidSetting {
                field: "timeout",
                reason: "must be greater than zero".into(),
            });
        }
        if self.rate_limit_capacity == 0 {
            return Err(ClientError::InvalidSetting {
                field: "rate_limit_capacity",
                reason: "must be at least 1".into(),
            });
        }
        if self.rate_limit_period.is_zero() {
            return Err(ClientError::InvalidSetting {
                field: "rate_limit_period",
                reason: "must be greater than zero".into(),
            });
        }
        if !self.retry.multiplier.is_finite() {
            return Err(ClientError::InvalidSetting {
                field: "retry.multiplier",
                reason: "must be a finite number".into(),
            });
        }
        Ok(())
    }
}

/// One rate-limited, time-bounded attempt.
#[derive(Clone)]
struct Attempt {
    transport: Arc<dyn ApiTransport>,
    limiter: Arc<TokenBucket>,
    timeout: Duration,
}

impl Service<Arc<ApiRequest>> for Attempt {
    type Response = Value;
    type Error = ApiError;
    type Future = BoxFuture<'static, ApiResult<Value>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Arc<ApiRequest>) -> Self::Future {
        let this = self.clone();
        Box::pin(async move {
            this.limiter.acquire().await;
            debug!(method = request.method(), "Sending API request");

            let response = match timeout(this.timeout, this.transport.send(&request)).await {
                Ok(response) => response?,
                Err(_) => return Err(TransportError::Timeout(this.timeout).into()),
            };
            classify(response)
        })
    }
}

/// API client with rate limiting, retry and backoff.
#[derive(Clone)]
pub struct ResilientClient {
    attempt: Attempt,
    retry: RetryConfig,
}

impl ResilientClient {
    pub fn new(transport: Arc<dyn ApiTransport>, config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let limiter = TokenBucket::new(config.rate_limit_capacity, config.rate_limit_period);
        Ok(Self {
            attempt: Attempt {
                transport,
                limiter: Arc::new(limiter),
                timeout: config.timeout,
            },
            retry: config.retry,
        })
    }

    /// The limiter shared by every call of this client.
    pub fn limiter(&self) -> &Arc<TokenBucket> {
        &self.attempt.limiter
    }

    /// Executes `request`.
    ///
    /// Returns `Ok(None)` when the remote refuses to reach the target.
    pub async fn execute(&self, request: ApiRequest) -> ApiResult<Option<Value>> {
        let method = request.method().to_string();
        let span = debug_span!("api_call", method = %method);
        let service = Retry::new(ApiRetryPolicy::new(self.retry.clone()), self.attempt.clone());

        match service.oneshot(Arc::new(request)).instrument(span).await {
            Ok(value) => Ok(Some(value)),
            Err(ApiError::Forbidden { description }) => {
                info!(method = %method, "Remote refused the call, skipping: {description}");
                Ok(None)
            }
            Err(err) => {
                warn!(method = %method, "API call failed: {err}");
                Err(err)
            }
        }
    }

    /// Serializes `params`, executes `method` and deserializes the result.
    pub async fn call<P, T>(&self, method: &str, params: &P) -> ApiResult<Option<T>>
    where
        P: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::new(method, params)?;
        match self.execute(request).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResilientClient")
            .field("timeout", &self.attempt.timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

/// Maps a response onto the result or the error taxonomy.
///
/// A `2xx` body of the form `{"ok": true, "result": X}` yields `X`; a body
/// without the envelope is returned whole. An `{"ok": false}` envelope is
/// classified by its `error_code`.
pub fn classify(response: RawResponse) -> ApiResult<Value> {
    let RawResponse {
        mut status,
        retry_after,
        body,
    } = response;

    if (200..300).contains(&status) {
        match body.get("ok").and_then(Value::as_bool) {
            Some(true) => {
                return Ok(match body {
                    Value::Object(mut fields) => fields.remove("result").unwrap_or(Value::Null),
                    other => other,
                });
            }
            None => return Ok(body),
            Some(false) => {
                status = body
                    .get("error_code")
                    .and_then(Value::as_u64)
                    .and_then(|code| u16::try_from(code).ok())
                    .unwrap_or(400);
            }
        }
    }

    let description = body
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_owned);

    match status {
        429 => {
            let hint = body
                .pointer("/parameters/retry_after")
                .and_then(Value::as_u64)
                .map(Duration::from_secs)
                .or(retry_after)
                .unwrap_or(DEFAULT_RETRY_AFTER);
            Err(ApiError::RateLimited { retry_after: hint })
        }
        403 => Err(ApiError::Forbidden {
            description: description.unwrap_or_else(|| "forbidden".into()),
        }),
        500..=599 => Err(TransportError::Server {
            status,
            body: truncate(description.unwrap_or_else(|| body.to_string())),
        }
        .into()),
        code => Err(ApiError::Api {
            code,
            description: description.unwrap_or_else(|| format!("HTTP {code}")),
        }),
    }
}

fn truncate(mut text: String) -> String {
    const LIMIT: usize = 512;
    if let Some((idx, _)) = text.char_indices().nth(LIMIT) {
        text.truncate(idx);
        text.push('…');
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Scripted, ScriptedTransport};
    use serde_json::json;
    use tokio::time::Instant;

    fn ok(result: Value) -> Scripted {
        Scripted::Respond(RawResponse::new(200, json!({ "ok": true, "result": result })))
    }

    fn reset() -> Scripted {
        Scripted::Fail(TransportError::Connection("connection reset".into()))
    }

    fn client(transport: &Arc<ScriptedTransport>, retry: RetryConfig) -> ResilientClient {
        ResilientClient::new(
            transport.clone(),
            ClientConfig {
                timeout: Duration::from_secs(5),
                retry,
                ..Default::default()
            },
        )
        .unwrap()
    }

    fn quick_retry(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            multiplier: 2.0,
        }
    }

    #[test]
    fn test_classify() {
        assert_eq!(
            classify(RawResponse::new(200, json!({ "ok": true, "result": 5 }))).unwrap(),
            json!(5)
        );
        assert_eq!(
            classify(RawResponse::new(200, json!({ "id": 1 }))).unwrap(),
            json!({ "id": 1 })
        );
        assert!(matches!(
            classify(RawResponse::new(
                200,
                json!({ "ok": false, "error_code": 429, "parameters": { "retry_after": 7 } })
            )),
            Err(ApiError::RateLimited { retry_after }) if retry_after == Duration::from_secs(7)
        ));
        assert!(matches!(
            classify(RawResponse::new(429, json!("slow down")).with_retry_after(Duration::from_secs(3))),
            Err(ApiError::RateLimited { retry_after }) if retry_after == Duration::from_secs(3)
        ));
        assert!(matches!(
            classify(RawResponse::new(429, Value::Null)),
            Err(ApiError::RateLimited { retry_after }) if retry_after == DEFAULT_RETRY_AFTER
        ));
        assert!(matches!(
            classify(RawResponse::new(403, json!({ "description": "bot was blocked by the user" }))),
            Err(ApiError::Forbidden { description }) if description == "bot was blocked by the user"
        ));
        assert!(matches!(
            classify(RawResponse::new(502, json!("bad gateway"))),
            Err(ApiError::Transport(TransportError::Server { status: 502, .. }))
        ));
        assert!(matches!(
            classify(RawResponse::new(400, json!({ "description": "chat not found" }))),
            Err(ApiError::Api { code: 400, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_retry_with_backoff_then_exhaust() {
        let transport = ScriptedTransport::new([reset(), reset(), reset(), reset()]);
        let client = client(&transport, quick_retry(2));

        let start = Instant::now();
        let err = client
            .execute(ApiRequest::new("getMe", &()).unwrap())
            .await
            .unwrap_err();

        assert!(matches!(err, ApiError::RetriesExhausted { attempts: 3, .. }));
        assert_eq!(transport.calls(), 3);
        // 100ms before the first retry, 200ms before the second.
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_hint_is_honoured_outside_budget() {
        let limited = RawResponse::new(
            429,
            json!({ "ok": false, "error_code": 429, "parameters": { "retry_after": 5 } }),
        );
        let transport = ScriptedTransport::new([
            Scripted::Respond(limited.clone()),
            Scripted::Respond(limited),
            ok(json!({ "message_id": 9 })),
        ]);
        let client = client(&transport, quick_retry(0));

        let start = Instant::now();
        let value = client
            .execute(ApiRequest::new("sendMessage", &json!({ "chat_id": 1 })).unwrap())
            .await
            .unwrap();

        assert_eq!(value, Some(json!({ "message_id": 9 })));
        assert_eq!(transport.calls(), 3);
        assert_eq!(start.elapsed(), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_is_retried() {
        let transport = ScriptedTransport::new([Scripted::Hang, ok(json!(true))]);
        let client = client(&transport, quick_retry(1));

        let value = client
            .execute(ApiRequest::new("getMe", &()).unwrap())
            .await
            .unwrap();
        assert_eq!(value, Some(json!(true)));
        assert_eq!(transport.calls(), 2);
    }

    #[tokio::test]
    async fn test_forbidden_is_a_skip() {
        let transport = ScriptedTransport::new([Scripted::Respond(RawResponse::new(
            403,
            json!({ "ok": false, "description": "Forbidden: bot was blocked by the user" }),
        ))]);
        let client = client(&transport, quick_retry(3));

        let value: Option<Value> = client.call("sendMessage", &json!({ "chat_id": 1 })).await.unwrap();
        assert_eq!(value, None);
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn test_api_error_is_terminal() {
        let transport = ScriptedTransport::new([Scripted::Respond(RawResponse::new(
            400,
            json!({ "ok": false, "description": "Bad Request: chat not found" }),
        ))]);
        let client = client(&transport, quick_retry(3));

        let err = client
            .execute(ApiRequest::new("sendMessage", &json!({})).unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, ApiError::Api { code: 400, .. }));
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_every_attempt_takes_a_token() {
        let transport = ScriptedTransport::new([reset(), ok(json!(1))]);
        let client = client(&transport, quick_retry(1));
        let before = client.limiter().available();

        client
            .execute(ApiRequest::new("getMe", &()).unwrap())
            .await
            .unwrap();
        assert_eq!(client.limiter().available(), before - 2);
    }

    #[test]
    fn test_invalid_config() {
        let transport = ScriptedTransport::new([]);
        let result = ResilientClient::new(
            transport,
            ClientConfig {
                rate_limit_capacity: 0,
                ..Default::default()
            },
        );
        assert!(matches!(
            result,
            Err(ClientError::InvalidSetting { field: "rate_limit_capacity", .. })
        ));
    }
}
