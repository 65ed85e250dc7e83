//! Errors raised while setting up a client.
//!
//! Failures of individual calls are [`ApiError`](courier_core::ApiError)s;
//! this type only covers construction.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// The base URL could not be parsed or has an unsupported scheme.
    #[error("invalid base URL `{url}`: {reason}")]
    InvalidBaseUrl { url: String, reason: String },

    /// A limit or delay was configured with an unusable value.
    #[error("invalid client setting `{field}`: {reason}")]
    InvalidSetting { field: &'static str, reason: String },

    /// The underlying HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    Build(String),
}
