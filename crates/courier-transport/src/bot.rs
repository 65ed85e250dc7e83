//! [`Bot`] implementation backed by the resilient client.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use courier_core::{ApiResult, Bot, ChatId, MessageId};

use crate::client::ResilientClient;

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: ChatId,
    text: &'a str,
}

#[derive(Serialize)]
struct DeleteMessage {
    chat_id: ChatId,
    message_id: MessageId,
}

/// A bot that talks to the remote API through a [`ResilientClient`].
#[derive(Debug, Clone)]
pub struct ApiBot {
    id: String,
    client: Arc<ResilientClient>,
}

impl ApiBot {
    pub fn new(id: impl Into<String>, client: Arc<ResilientClient>) -> Self {
        Self {
            id: id.into(),
            client,
        }
    }

    /// The client, for calls beyond the [`Bot`] surface.
    pub fn client(&self) -> &Arc<ResilientClient> {
        &self.client
    }
}

#[async_trait]
impl Bot for ApiBot {
    fn id(&self) -> &str {
        &self.id
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> ApiResult<Option<MessageId>> {
        let sent: Option<Value> = self
            .client
            .call("sendMessage", &SendMessage { chat_id, text })
            .await?;
        Ok(sent.and_then(|message| message.get("message_id").and_then(Value::as_i64)))
    }

    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> ApiResult<()> {
        self.client
            .call::<_, Value>("deleteMessage", &DeleteMessage { chat_id, message_id })
            .await?;
        Ok(())
    }

    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::ClientConfig;
    use crate::testing::{Scripted, ScriptedTransport};
    use crate::transport::RawResponse;
    use courier_core::downcast_bot;
    use serde_json::json;

    fn bot(script: Vec<Scripted>) -> (Arc<ApiBot>, Arc<ScriptedTransport>) {
        let transport = ScriptedTransport::new(script);
        let client = ResilientClient::new(transport.clone(), ClientConfig::default()).unwrap();
        (Arc::new(ApiBot::new("courier", Arc::new(client))), transport)
    }

    #[tokio::test]
    async fn test_send_text_returns_message_id() {
        let (bot, transport) = bot(vec![Scripted::Respond(RawResponse::new(
            200,
            json!({ "ok": true, "result": { "message_id": 55, "chat": { "id": 1 } } }),
        ))]);

        assert_eq!(bot.send_text(1, "hi").await.unwrap(), Some(55));
        assert_eq!(transport.methods(), vec!["sendMessage"]);
    }

    #[tokio::test]
    async fn test_blocked_actor_is_not_an_error() {
        let (bot, _) = bot(vec![
            Scripted::Respond(RawResponse::new(
                403,
                json!({ "ok": false, "description": "Forbidden: bot was blocked by the user" }),
            )),
            Scripted::Respond(RawResponse::new(
                403,
                json!({ "ok": false, "description": "Forbidden: bot was kicked" }),
            )),
        ]);

        assert_eq!(bot.send_text(1, "hi").await.unwrap(), None);
        assert!(bot.delete_message(1, 2).await.is_ok());
    }

    #[tokio::test]
    async fn test_downcast() {
        let (bot, _) = bot(Vec::new());
        let boxed: courier_core::BoxedBot = bot;
        let bot = downcast_bot::<ApiBot>(boxed).unwrap();
        assert_eq!(bot.id(), "courier");
    }
}
