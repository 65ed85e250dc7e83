//! Bot trait: the outbound half handlers talk to.
//!
//! A [`Bot`] is whatever can deliver replies to the remote messaging API on
//! behalf of a handler. The transport crate provides an implementation backed
//! by the resilient client; tests substitute in-memory doubles.

use std::any::Any;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::ApiResult;
use crate::event::{ChatId, MessageId};

/// The core Bot trait.
///
/// # API Design
///
/// - `send_text`: deliver a plain text message to a chat
/// - `delete_message`: remove a message from a chat
///
/// Both are expected to go through rate limiting and retry. A `Forbidden`
/// response is not an error here: implementations return `Ok(None)` / `Ok(())`.
#[async_trait]
pub trait Bot: Send + Sync + 'static {
    /// Returns the bot's identifier (its username or configured id).
    fn id(&self) -> &str;

    /// Sends a text message, returning the new message id when the remote
    /// reports one.
    async fn send_text(&self, chat_id: ChatId, text: &str) -> ApiResult<Option<MessageId>>;

    /// Deletes a message from a chat.
    async fn delete_message(&self, chat_id: ChatId, message_id: MessageId) -> ApiResult<()>;

    /// Returns self as an `Arc<dyn Any>` for safe downcasting.
    ///
    /// Implementors should simply return `self`.
    fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// A shared Bot trait object.
pub type BoxedBot = Arc<dyn Bot>;

/// Attempts to recover the concrete bot type from a [`BoxedBot`].
pub fn downcast_bot<T: Bot>(bot: BoxedBot) -> Option<Arc<T>> {
    bot.as_any().downcast::<T>().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ApiError;

    struct OfflineBot;

    #[async_trait]
    impl Bot for OfflineBot {
        fn id(&self) -> &str {
            "offline"
        }

        async fn send_text(&self, _chat_id: ChatId, _text: &str) -> ApiResult<Option<MessageId>> {
            Err(ApiError::NotConnected)
        }

        async fn delete_message(&self, _chat_id: ChatId, _message_id: MessageId) -> ApiResult<()> {
            Err(ApiError::NotConnected)
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    struct OtherBot;

    #[async_trait]
    impl Bot for OtherBot {
        fn id(&self) -> &str {
            "other"
        }

        async fn send_text(&self, _chat_id: ChatId, _text: &str) -> ApiResult<Option<MessageId>> {
            Ok(None)
        }

        async fn delete_message(&self, _chat_id: ChatId, _message_id: MessageId) -> ApiResult<()> {
            Ok(())
        }

        fn as_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
            self
        }
    }

    #[test]
    fn test_downcast_bot() {
        let bot: BoxedBot = Arc::new(OfflineBot);
        assert!(downcast_bot::<OtherBot>(bot.clone()).is_none());
        let concrete = downcast_bot::<OfflineBot>(bot).unwrap();
        assert_eq!(concrete.id(), "offline");
    }

    #[tokio::test]
    async fn test_offline_bot_reports_not_connected() {
        let bot: BoxedBot = Arc::new(OfflineBot);
        let err = bot.send_text(1, "hi").await.unwrap_err();
        assert!(matches!(err, ApiError::NotConnected));
    }
}
