//! The wire seam of the client.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use courier_core::ApiResult;

use crate::request::ApiRequest;

/// What came back from one attempt, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResponse {
    pub status: u16,
    /// Delay from a `Retry-After` header, if any.
    pub retry_after: Option<Duration>,
    /// JSON body. A body that is not JSON is kept as a string.
    pub body: Value,
}

impl RawResponse {
    pub fn new(status: u16, body: Value) -> Self {
        Self {
            status,
            retry_after: None,
            body,
        }
    }

    pub fn with_retry_after(mut self, retry_after: Duration) -> Self {
        self.retry_after = Some(retry_after);
        self
    }
}

/// Performs a single attempt of an API call.
///
/// Implementations report wire failures as
/// [`ApiError::Transport`](courier_core::ApiError::Transport) and leave status
/// handling to the client.
#[async_trait]
pub trait ApiTransport: Send + Sync + 'static {
    async fn send(&self, request: &ApiRequest) -> ApiResult<RawResponse>;
}
