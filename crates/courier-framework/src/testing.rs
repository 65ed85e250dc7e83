//! Test doubles shared by the unit tests of this crate.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use courier_core::{
    ActorId, ApiResult, Bot, BoxedBot, BoxedEvent, ChatId, MessageId, TextEvent,
};

/// A bot that records every text it is asked to send.
#[derive(Default)]
pub(crate) struct RecordingBot {
    sent: Mutex<Vec<(ChatId, String)>>,
}

impl RecordingBot {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn sent(&self) -> Vec<String> {
        self.sent.lock().iter().map(|(_, text)| text.clone()).collect()
    }

    pub(crate) fn boxed(self: &Arc<Self>) -> BoxedBot {
        self.clone()
    }
}

#[async_trait]
impl Bot for RecordingBot {
    fn id(&self) -> &str {
        "test-bot"
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> ApiResult<Option<MessageId>> {
        let mut sent = self.sent.lock();
        sent.push((chat_id, text.to_string()));
        Ok(Some(sent.len() as MessageId))
    }

    async fn delete_message(&self, _chat_id: ChatId, _message_id: MessageId) -> ApiResult<()> {
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// A message event whose chat id equals the actor id.
pub(crate) fn text_event(actor_id: ActorId, text: &str) -> BoxedEvent {
    TextEvent::message(actor_id, actor_id, text).boxed()
}
