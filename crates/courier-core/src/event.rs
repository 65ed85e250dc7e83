//! Inbound event abstraction.
//!
//! The dispatch core never parses the full shape of a platform event. It only
//! needs the three things every routing decision depends on:
//!
//! - the **actor** (originating user), used as the session and scheduling key
//! - the **chat** the event arrived in, used for replies
//! - the optional **raw text**, used for trigger matching and argument binding
//!
//! Transport front doors implement [`Event`] for their own payload types and
//! hand them to the runtime as a [`BoxedEvent`].

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// Identifier of the user an event originates from.
pub type ActorId = i64;

/// Identifier of the chat or conversation an event belongs to.
pub type ChatId = i64;

/// Identifier of a message inside a chat.
pub type MessageId = i64;

/// Coarse classification of inbound events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// A text or media message.
    #[default]
    Message,
    /// An inline button press carrying callback data as its text.
    Callback,
    /// A membership or chat state change.
    StateChange,
    /// Anything else the front door chose to forward.
    Other,
}

/// The base trait for all inbound events.
///
/// Implementations are type-erased behind [`BoxedEvent`] and can be recovered
/// with [`downcast_ref`](trait.Event.html#method.downcast_ref).
pub trait Event: Any + Send + Sync + fmt::Debug {
    /// The user this event originates from.
    fn actor_id(&self) -> ActorId;

    /// The chat this event belongs to.
    fn chat_id(&self) -> ChatId;

    /// Raw text of the event, if it carries any.
    ///
    /// For callback events this is the callback data.
    fn text(&self) -> Option<&str> {
        None
    }

    /// Id of the inbound message, if the event wraps one.
    fn message_id(&self) -> Option<MessageId> {
        None
    }

    /// The high-level kind of this event.
    fn kind(&self) -> EventKind {
        EventKind::Message
    }

    /// Returns a reference to self as `Any` for downcasting.
    fn as_any(&self) -> &dyn Any;
}

impl dyn Event {
    /// Attempts to view this event as the concrete type `T`.
    pub fn downcast_ref<T: Event>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Returns `true` if the concrete event type is `T`.
    pub fn is<T: Event>(&self) -> bool {
        self.as_any().is::<T>()
    }
}

/// A shared, type-erased event.
pub type BoxedEvent = Arc<dyn Event>;

/// A plain event carrying only the fields the core needs.
///
/// Front doors with no richer payload of their own can forward this directly;
/// it is also what tests and demos build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextEvent {
    pub actor_id: ActorId,
    pub chat_id: ChatId,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub message_id: Option<MessageId>,
    #[serde(default)]
    pub kind: EventKind,
}

impl TextEvent {
    /// Creates a message event from `actor` in `chat`.
    pub fn message(actor_id: ActorId, chat_id: ChatId, text: impl Into<String>) -> Self {
        Self {
            actor_id,
            chat_id,
            text: Some(text.into()),
            message_id: None,
            kind: EventKind::Message,
        }
    }

    /// Creates a button-press event whose text is the callback data.
    pub fn callback(actor_id: ActorId, chat_id: ChatId, data: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Callback,
            ..Self::message(actor_id, chat_id, data)
        }
    }

    /// Sets the inbound message id.
    pub fn with_message_id(mut self, message_id: MessageId) -> Self {
        self.message_id = Some(message_id);
        self
    }

    /// Wraps this event into a [`BoxedEvent`].
    pub fn boxed(self) -> BoxedEvent {
        Arc::new(self)
    }
}

impl Event for TextEvent {
    fn actor_id(&self) -> ActorId {
        self.actor_id
    }

    fn chat_id(&self) -> ChatId {
        self.chat_id
    }

    fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    fn message_id(&self) -> Option<MessageId> {
        self.message_id
    }

    fn kind(&self) -> EventKind {
        self.kind
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
