//! # Courier Core
//!
//! Shared building blocks of the Courier bot dispatch framework.
//!
//! This crate defines the seams every other crate talks through:
//!
//! - **Events**: the inbound side ([`Event`], [`BoxedEvent`], [`TextEvent`])
//! - **Bots**: the outbound side handlers reply through ([`Bot`], [`BoxedBot`])
//! - **Errors**: the API error taxonomy ([`ApiError`], [`TransportError`])
//! - **Rate limiting**: the periodic-reset [`TokenBucket`]
//!
//! ```text
//! ┌─────────────┐  Event   ┌────────────┐  Bot   ┌─────────────┐
//! │ front door  │─────────▶│  framework │───────▶│  transport  │
//! └─────────────┘          └────────────┘        └─────────────┘
//! ```

pub mod bot;
pub mod error;
pub mod event;
pub mod limiter;

pub use bot::{Bot, BoxedBot, downcast_bot};
pub use error::{ApiError, ApiResult, TransportError, TransportResult};
pub use event::{ActorId, BoxedEvent, ChatId, Event, EventKind, MessageId, TextEvent};
pub use limiter::TokenBucket;

/// Prelude for common imports.
pub mod prelude {
    pub use super::bot::{Bot, BoxedBot};
    pub use super::error::{ApiError, ApiResult};
    pub use super::event::{ActorId, BoxedEvent, ChatId, Event, TextEvent};
}
