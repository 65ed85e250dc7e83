//! Unified error types for outbound API calls.
//!
//! The taxonomy separates failures by how they must be handled:
//!
//! - [`TransportError`]: network, timeout or 5xx failures, retried with a
//!   bounded budget.
//! - [`ApiError::RateLimited`]: remote back-pressure, retried without a bound
//!   after the server-provided delay.
//! - [`ApiError::Forbidden`]: the remote refuses to reach the actor; callers
//!   treat it as a benign skip.
//! - everything else is terminal for the call.

use std::time::Duration;

use thiserror::Error;

// =============================================================================
// Transport Errors
// =============================================================================

/// Errors that occur below the remote API, on the wire.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Could not connect, or the connection dropped mid-request.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The attempt did not complete within the read timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The remote answered with a 5xx status.
    #[error("server error ({status}): {body}")]
    Server {
        /// HTTP status code.
        status: u16,
        /// Response body, possibly truncated.
        body: String,
    },

    /// Local I/O failure while preparing or streaming a request.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<std::io::Error> for TransportError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

// =============================================================================
// API Errors
// =============================================================================

/// Error type for calls against the remote messaging API.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// A single attempt failed on the wire.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Every attempt in the retry budget failed on the wire.
    #[error("transport failed after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Total attempts made, including the first.
        attempts: u32,
        /// The failure of the final attempt.
        last: TransportError,
    },

    /// The remote asked us to slow down.
    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited {
        /// Delay requested by the server.
        retry_after: Duration,
    },

    /// The remote refused to deliver to the target (for example the user
    /// blocked the bot).
    #[error("forbidden: {description}")]
    Forbidden {
        /// Description returned by the remote.
        description: String,
    },

    /// The remote rejected the call.
    #[error("API error ({code}): {description}")]
    Api {
        /// Status or error code.
        code: u16,
        /// Description returned by the remote.
        description: String,
    },

    /// Failed to serialize a request or deserialize a response.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// An attachment could not be read.
    #[error("attachment error: {0}")]
    Attachment(String),

    /// No outbound client is attached.
    #[error("bot is not connected")]
    NotConnected,

    /// Other error.
    #[error("{0}")]
    Other(String),
}

impl ApiError {
    /// Returns `true` for wire-level failures eligible for bounded retry.
    pub fn is_transport(&self) -> bool {
        matches!(self, Self::Transport(_))
    }

    /// Returns the server-provided delay if this is a rate-limit response.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for API calls.
pub type ApiResult<T> = Result<T, ApiError>;
