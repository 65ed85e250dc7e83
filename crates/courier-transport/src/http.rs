//! HTTP transport over `reqwest`.
//!
//! Posts each call to `{base_url}/{method}`: plain calls as a JSON body,
//! calls with attachments as `multipart/form-data`. Files on disk are
//! streamed rather than read into memory.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, ClientBuilder, Url, header};
use serde_json::Value;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use courier_core::{ApiError, ApiResult, TransportError};

use crate::error::ClientError;
use crate::request::{ApiRequest, Attachment, InputFile};
use crate::transport::{ApiTransport, RawResponse};

/// [`ApiTransport`] backed by a `reqwest` client.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: String,
    access_token: Option<String>,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ClientError> {
        let url = Url::parse(base_url).map_err(|e| ClientError::InvalidBaseUrl {
            url: base_url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ClientError::InvalidBaseUrl {
                url: base_url.to_string(),
                reason: format!("unsupported scheme `{}`", url.scheme()),
            });
        }

        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;

        info!(url = %url, "HTTP transport ready");
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            access_token: None,
            timeout,
        })
    }

    /// Sends the token as a bearer `Authorization` header.
    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn map_error(&self, err: reqwest::Error) -> ApiError {
        let err = if err.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if err.is_body() || err.is_decode() {
            TransportError::Io(err.to_string())
        } else {
            TransportError::Connection(err.to_string())
        };
        err.into()
    }
}

#[async_trait]
impl ApiTransport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> ApiResult<RawResponse> {
        let url = format!("{}/{}", self.base_url, request.method());
        let mut builder = self.client.post(&url);
        if let Some(token) = &self.access_token {
            builder = builder.bearer_auth(token);
        }

        builder = if request.is_multipart() {
            builder.multipart(build_form(request).await?)
        } else {
            builder.json(request.body())
        };

        let response = builder.send().await.map_err(|e| self.map_error(e))?;
        let status = response.status().as_u16();
        let retry_after = response
            .headers()
            .get(header::RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let bytes = response.bytes().await.map_err(|e| self.map_error(e))?;

        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        debug!(method = request.method(), status, "API response received");

        Ok(RawResponse {
            status,
            retry_after,
            body,
        })
    }
}

/// Builds the form: one text part per top-level field, one file part per
/// attachment, named by its placeholder.
async fn build_form(request: &ApiRequest) -> ApiResult<Form> {
    let mut form = Form::new();
    for (name, value) in request.form_fields()? {
        form = form.text(name, value);
    }
    for attachment in request.attachments() {
        let part = file_part(attachment).await?;
        form = form.part(attachment.name().to_string(), part);
    }
    Ok(form)
}

async fn file_part(attachment: &Attachment) -> ApiResult<Part> {
    let part = match attachment.file() {
        InputFile::Path(path) => {
            let file = tokio::fs::File::open(path).await.map_err(|e| {
                ApiError::Attachment(format!("cannot open `{}`: {e}", path.display()))
            })?;
            let length = file
                .metadata()
                .await
                .map_err(|e| ApiError::Attachment(format!("cannot stat `{}`: {e}", path.display())))?
                .len();
            Part::stream_with_length(Body::wrap_stream(ReaderStream::new(file)), length)
        }
        InputFile::Memory { data, .. } => Part::bytes(data.clone()),
        InputFile::Remote(reference) => {
            return Err(ApiError::Attachment(format!(
                "remote file `{reference}` cannot be uploaded"
            )));
        }
    };
    Ok(part.file_name(attachment.file_name()))
}
