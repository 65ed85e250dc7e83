//! Per-dispatch context.
//!
//! One [`DispatchContext`] is created for each inbound event and shared as an
//! `Arc` by every middleware and by the handler. It carries:
//!
//! - the event and the bot replies go through
//! - a correlation id that ties together logs and error reports
//! - the actor's session snapshot, plus `enter_state` / `clear_state`
//! - a typed state map middleware can use to pass data down the chain
//!
//! A redirect builds a fresh context for the new text that keeps the event,
//! bot and correlation id.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};
use uuid::Uuid;

use courier_core::{ActorId, ApiResult, BoxedBot, BoxedEvent, ChatId, MessageId};

use crate::error::SessionError;
use crate::fsm::{Session, SessionStore};

/// Who ended up handling the event. Set by the endpoint or the FSM router
/// and read at the dispatch boundary to build the outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum HandledBy {
    Command(String),
    Detached(String),
    State(String),
    Cancelled,
}

/// The context shared by every step of one dispatch.
pub struct DispatchContext {
    event: BoxedEvent,
    bot: BoxedBot,
    correlation_id: Uuid,
    text: Option<String>,
    sessions: Arc<dyn SessionStore>,
    session: Mutex<Option<Session>>,
    handled_by: Mutex<Option<HandledBy>>,
    state: Mutex<HashMap<TypeId, Box<dyn Any + Send + Sync>>>,
}

impl DispatchContext {
    pub fn new(event: BoxedEvent, bot: BoxedBot, sessions: Arc<dyn SessionStore>) -> Self {
        let text = event.text().map(str::to_string);
        Self {
            event,
            bot,
            correlation_id: Uuid::new_v4(),
            text,
            sessions,
            session: Mutex::new(None),
            handled_by: Mutex::new(None),
            state: Mutex::new(HashMap::new()),
        }
    }

    /// A context for re-running the pipeline against `text`.
    pub(crate) fn redirected(&self, text: String) -> Self {
        Self {
            event: self.event.clone(),
            bot: self.bot.clone(),
            correlation_id: self.correlation_id,
            text: Some(text),
            sessions: self.sessions.clone(),
            session: Mutex::new(None),
            handled_by: Mutex::new(None),
            state: Mutex::new(HashMap::new()),
        }
    }

    // ─── Event ────────────────────────────────────────────────────────────────

    pub fn event(&self) -> &BoxedEvent {
        &self.event
    }

    pub fn bot(&self) -> &BoxedBot {
        &self.bot
    }

    pub fn actor_id(&self) -> ActorId {
        self.event.actor_id()
    }

    pub fn chat_id(&self) -> ChatId {
        self.event.chat_id()
    }

    /// The text being dispatched: the event's raw text, or the redirect
    /// target when this context was created by a redirect.
    pub fn text(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn correlation_id(&self) -> Uuid {
        self.correlation_id
    }

    // ─── Outbound ─────────────────────────────────────────────────────────────

    /// Sends `text` to the chat the event came from.
    pub async fn reply(&self, text: &str) -> ApiResult<Option<MessageId>> {
        self.bot.send_text(self.chat_id(), text).await
    }

    /// Sends `text` to another chat.
    pub async fn send(&self, chat_id: ChatId, text: &str) -> ApiResult<Option<MessageId>> {
        self.bot.send_text(chat_id, text).await
    }

    /// Deletes a message from the chat the event came from.
    pub async fn delete_message(&self, message_id: MessageId) -> ApiResult<()> {
        self.bot.delete_message(self.chat_id(), message_id).await
    }

    // ─── Session ──────────────────────────────────────────────────────────────

    /// Snapshot of the actor's session as loaded at the start of dispatch and
    /// updated by `enter_state` / `clear_state`.
    pub fn session(&self) -> Option<Session> {
        self.session.lock().clone()
    }

    /// Deserializes the session payload.
    pub fn session_data<T: DeserializeOwned>(&self) -> Result<Option<T>, SessionError> {
        match self.session.lock().as_ref() {
            Some(session) if !session.payload.is_null() => {
                Ok(Some(serde_json::from_value(session.payload.clone())?))
            }
            _ => Ok(None),
        }
    }

    /// Moves the actor into conversation state `tag` with `payload`.
    ///
    /// The actor's next event is routed to the handler registered for `tag`.
    pub async fn enter_state(
        &self,
        tag: impl Into<String>,
        payload: impl Serialize,
    ) -> Result<(), SessionError> {
        let session = Session::new(tag, serde_json::to_value(payload)?);
        debug!(
            actor_id = self.actor_id(),
            state = session.state.as_deref(),
            "Entering conversation state"
        );
        self.sessions.set(self.actor_id(), session.clone()).await?;
        *self.session.lock() = Some(session);
        Ok(())
    }

    /// Replaces the payload, keeping the current state tag.
    pub async fn update_session(&self, payload: impl Serialize) -> Result<(), SessionError> {
        let payload = serde_json::to_value(payload)?;
        let state = self.session.lock().as_ref().and_then(|s| s.state.clone());
        let session = Session { state, payload };
        self.sessions.set(self.actor_id(), session.clone()).await?;
        *self.session.lock() = Some(session);
        Ok(())
    }

    /// Ends the actor's conversation.
    pub async fn clear_state(&self) -> Result<(), SessionError> {
        self.sessions.clear(self.actor_id()).await?;
        *self.session.lock() = None;
        Ok(())
    }

    pub(crate) fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub(crate) fn set_session_snapshot(&self, session: Option<Session>) {
        *self.session.lock() = session;
    }

    // ─── Typed state ──────────────────────────────────────────────────────────

    /// Stores a value for later steps of this dispatch. One value per type.
    pub fn set_state<T: Send + Sync + 'static>(&self, value: T) {
        self.state.lock().insert(TypeId::of::<T>(), Box::new(value));
    }

    pub fn get_state<T: Clone + 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .get(&TypeId::of::<T>())
            .and_then(|v| v.downcast_ref::<T>())
            .cloned()
    }

    pub fn take_state<T: 'static>(&self) -> Option<T> {
        self.state
            .lock()
            .remove(&TypeId::of::<T>())
            .and_then(|v| v.downcast::<T>().ok())
            .map(|v| *v)
    }

    // ─── Bookkeeping ──────────────────────────────────────────────────────────

    pub(crate) fn mark_handled(&self, by: HandledBy) {
        let mut slot = self.handled_by.lock();
        if let Some(previous) = slot.as_ref() {
            warn!(?previous, current = ?by, "Event marked handled twice");
        }
        *slot = Some(by);
    }

    pub(crate) fn handled_by(&self) -> Option<HandledBy> {
        self.handled_by.lock().clone()
    }
}

impl fmt::Debug for DispatchContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DispatchContext")
            .field("event", &self.event)
            .field("bot", &self.bot.id())
            .field("correlation_id", &self.correlation_id)
            .field("text", &self.text)
            .finish_non_exhaustive()
    }
}
