//! # Courier Transport
//!
//! The outbound side of Courier: a resilient client for the remote messaging
//! API and a [`Bot`](courier_core::Bot) implementation built on it.
//!
//! ## Features
//!
//! - `http-client`: the `reqwest`-backed [`HttpTransport`]
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  ApiBot             │  (Bot trait for handlers)
//! ├─────────────────────┤
//! │  ResilientClient    │  token bucket, retry/backoff, classification
//! ├─────────────────────┤
//! │  ApiTransport       │  HttpTransport, or an in-memory double
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier_transport::{ApiBot, ApiRequest, ClientConfig, HttpTransport, InputFile, ResilientClient};
//!
//! let transport = HttpTransport::new("https://api.example.com/bot<token>", Duration::from_secs(30))?;
//! let client = Arc::new(ResilientClient::new(Arc::new(transport), ClientConfig::default())?);
//!
//! #[derive(Serialize)]
//! struct SendPhoto { chat_id: i64, photo: InputFile }
//!
//! client
//!     .execute(ApiRequest::new("sendPhoto", &SendPhoto { chat_id: 1, photo: InputFile::path("cat.jpg") })?)
//!     .await?;
//! ```

pub mod bot;
pub mod client;
pub mod error;
pub mod request;
pub mod retry;
pub mod transport;

#[cfg(feature = "http-client")]
pub mod http;

#[cfg(test)]
mod testing;

pub use bot::ApiBot;
pub use client::{ClientConfig, DEFAULT_RETRY_AFTER, ResilientClient, classify};
pub use error::ClientError;
pub use request::{ATTACH_SCHEME, ApiRequest, Attachment, InputFile};
pub use retry::{ApiRetryPolicy, RetryConfig};
pub use transport::{ApiTransport, RawResponse};

#[cfg(feature = "http-client")]
pub use http::HttpTransport;
