use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::SessionPolicy;
use crate::args::{ResolverRegistry, bind};
use crate::context::{DispatchContext, HandledBy};
use crate::descriptor::{HandlerDescriptor, normalize};
use crate::error::{ArgumentError, DispatchError, SessionError};
use crate::middleware::{Middleware, Next};
use crate::outcome::DispatchResult;

/// State tag to state handler.
#[derive(Debug, Default, Clone)]
pub struct StateRegistry {
    handlers: HashMap<String, Arc<HandlerDescriptor>>,
}

impl StateRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a handler to the state named by its trigger. Last one wins.
    pub fn insert(&mut self, descriptor: HandlerDescriptor) {
        let tag = descriptor.trigger().to_string();
        if self.handlers.insert(tag.clone(), Arc::new(descriptor)).is_some() {
            debug!(state = %tag, "Replacing state handler");
        }
    }

    pub fn get(&self, tag: &str) -> Option<&Arc<HandlerDescriptor>> {
        self.handlers.get(&normalize(tag))
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub(crate) fn descriptors(&self) -> impl Iterator<Item = &Arc<HandlerDescriptor>> {
        self.handlers.values()
    }
}

/// Routing decision of the [`FsmRouter`].
#[derive(Debug)]
pub enum FsmRoute {
    /// The event was consumed by the conversation layer.
    Handled(DispatchResult),
    /// No active conversation (or no handler for it); route normally.
    NotHandled,
}

/// Routes events of actors with an active conversation to state handlers.
#[derive(Debug)]
pub struct FsmRouter {
    states: StateRegistry,
    resolvers: Arc<ResolverRegistry>,
    cancel_keywords: Vec<String>,
    cancel_message: String,
}

impl FsmRouter {
    pub fn new(states: StateRegistry, resolvers: Arc<ResolverRegistry>) -> Self {
        Self {
            states,
            resolvers,
            cancel_keywords: vec!["/cancel".to_string(), "cancel".to_string()],
            cancel_message: "Cancelled.".to_string(),
        }
    }

    /// Replaces the cancellation keywords. Compared case-insensitively.
    pub fn cancel_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.cancel_keywords = keywords
            .into_iter()
            .map(|k| k.into().trim().to_lowercase())
            .collect();
        self
    }

    pub fn cancel_message(mut self, message: impl Into<String>) -> Self {
        self.cancel_message = message.into();
        self
    }

    pub fn states(&self) -> &StateRegistry {
        &self.states
    }

    fn is_cancel(&self, text: &str) -> bool {
        let text = text.trim().to_lowercase();
        self.cancel_keywords.iter().any(|k| *k == text)
    }

    /// Looks up the actor's session and, if a conversation is active, runs
    /// the state handler for it.
    pub async fn route(&self, ctx: &Arc<DispatchContext>) -> Result<FsmRoute, SessionError> {
        let actor_id = ctx.actor_id();
        let session = ctx.sessions().get(actor_id).await?;
        ctx.set_session_snapshot(session.clone());

        let Some(tag) = session.and_then(|s| s.state) else {
            return Ok(FsmRoute::NotHandled);
        };

        let text = ctx.text().unwrap_or_default();
        if self.is_cancel(text) {
            debug!(actor_id, state = %tag, "Conversation cancelled");
            ctx.clear_state().await?;
            ctx.mark_handled(HandledBy::Cancelled);
            return Ok(FsmRoute::Handled(DispatchResult::stop(
                self.cancel_message.clone(),
            )));
        }

        let Some(descriptor) = self.states.get(&tag) else {
            debug!(actor_id, state = %tag, "No handler bound to state, falling through");
            return Ok(FsmRoute::NotHandled);
        };

        let args = match bind(descriptor, text, &self.resolvers) {
            Ok(args) => args,
            Err(err) if err.is_user_facing() => {
                return Ok(FsmRoute::Handled(DispatchResult::Stop(Some(
                    usage_message(&err, descriptor),
                ))));
            }
            Err(err) => {
                return Ok(FsmRoute::Handled(DispatchResult::Error(
                    DispatchError::Binding(err),
                )));
            }
        };

        ctx.mark_handled(HandledBy::State(tag.clone()));
        let result = (descriptor.handler())(ctx.clone(), args).await;

        if descriptor.session_policy() == SessionPolicy::Clear {
            let current = ctx.sessions().get(actor_id).await?;
            if current.as_ref().and_then(|s| s.state.as_deref()) == Some(tag.as_str()) {
                ctx.clear_state().await?;
            } else {
                debug!(actor_id, state = %tag, "State changed by handler, keeping session");
            }
        }

        Ok(FsmRoute::Handled(result))
    }
}

/// Message shown for a user-facing argument error.
pub(crate) fn usage_message(err: &ArgumentError, descriptor: &HandlerDescriptor) -> String {
    format!("{err}\nUsage: {}", descriptor.usage())
}

/// Runs the [`FsmRouter`] ahead of command middleware.
pub struct FsmMiddleware {
    router: Arc<FsmRouter>,
}

impl FsmMiddleware {
    pub const PRIORITY: i32 = -100;

    pub fn new(router: Arc<FsmRouter>) -> Self {
        Self { router }
    }
}

#[async_trait]
impl Middleware for FsmMiddleware {
    fn name(&self) -> &str {
        "fsm"
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    async fn handle(
        &self,
        ctx: &Arc<DispatchContext>,
        _descriptor: Option<&Arc<HandlerDescriptor>>,
        next: Next<'_>,
    ) -> DispatchResult {
        match self.router.route(ctx).await {
            Ok(FsmRoute::Handled(result)) => result,
            Ok(FsmRoute::NotHandled) => next.run(ctx).await,
            Err(err) => {
                warn!(actor_id = ctx.actor_id(), "Session lookup failed: {err}");
                DispatchResult::Error(err.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::ParamSpec;
    use crate::extractor::{Ctx, SessionData};
    use crate::fsm::{InMemorySessionStore, Session, SessionStore};
    use crate::testing::{RecordingBot, text_event};
    use serde_json::json;

    async fn ask_age(ctx: Ctx, SessionData(name): SessionData<String>, age: u32) -> String {
        ctx.enter_state("confirm", json!({ "name": name, "age": age }))
            .await
            .ok();
        format!("{name} is {age}?")
    }

    async fn confirm(answer: bool) -> &'static str {
        if answer { "Saved." } else { "Discarded." }
    }

    fn router() -> FsmRouter {
        let mut states = StateRegistry::new();
        states.insert(
            HandlerDescriptor::builder(ask_age)
                .param(ParamSpec::session())
                .param(ParamSpec::int("age"))
                .session_policy(SessionPolicy::Clear)
                .build("ask_age")
                .unwrap(),
        );
        states.insert(
            HandlerDescriptor::builder(confirm)
                .param(ParamSpec::bool("answer"))
                .session_policy(SessionPolicy::Clear)
                .build("confirm")
                .unwrap(),
        );
        FsmRouter::new(states, Arc::new(ResolverRegistry::new()))
    }

    fn context_for(
        store: &Arc<InMemorySessionStore>,
        text: &str,
    ) -> (Arc<DispatchContext>, Arc<RecordingBot>) {
        let bot = RecordingBot::new();
        let ctx = DispatchContext::new(text_event(9, text), bot.boxed(), store.clone());
        (Arc::new(ctx), bot)
    }

    #[tokio::test]
    async fn test_no_session_is_not_handled() {
        let store = Arc::new(InMemorySessionStore::new());
        let (ctx, _) = context_for(&store, "/start");
        assert!(matches!(
            router().route(&ctx).await.unwrap(),
            FsmRoute::NotHandled
        ));
    }

    #[tokio::test]
    async fn test_state_handler_runs_and_new_state_survives_clear_policy() {
        let store = Arc::new(InMemorySessionStore::new());
        store
            .set(9, Session::new("ask_age", json!("Alice")))
            .await
            .unwrap();

        let (ctx, bot) = context_for(&store, "30");
        let route = router().route(&ctx).await.unwrap();
        assert!(matches!(route, FsmRoute::Handled(DispatchResult::Continue)));
        assert_eq!(bot.sent(), vec!["Alice is 30?"]);
        assert_eq!(ctx.handled_by(), Some(HandledBy::State("ask_age".into())));

        // The handler moved on to `confirm`, so `Clear` must not wipe it.
        let session = store.get(9).await.unwrap().unwrap();
        assert_eq!(session.state.as_deref(), Some("confirm"));

        let (ctx, bot) = context_for(&store, "yes");
        router().route(&ctx).await.unwrap();
        assert_eq!(bot.sent(), vec!["Saved."]);
        assert!(store.get(9).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_bad_input_keeps_session() {
        let store = Arc::new(InMemorySessionStore::new());
        store
            .set(9, Session::new("ask_age", json!("Alice")))
            .await
            .unwrap();

        let (ctx, bot) = context_for(&store, "thirty");
        let route = router().route(&ctx).await.unwrap();
        let FsmRoute::Handled(DispatchResult::Stop(Some(message))) = route else {
            panic!("expected a stop with usage");
        };
        assert!(message.contains("`age`"));
        assert!(bot.sent().is_empty());
        assert!(store.get(9).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_cancel_keyword_clears_session() {
        let store = Arc::new(InMemorySessionStore::new());
        store
            .set(9, Session::new("ask_age", json!("Alice")))
            .await
            .unwrap();

        let (ctx, _) = context_for(&store, "  CANCEL ");
        let route = router().route(&ctx).await.unwrap();
        assert!(matches!(route, FsmRoute::Handled(DispatchResult::Stop(Some(ref m))) if m == "Cancelled."));
        assert_eq!(ctx.handled_by(), Some(HandledBy::Cancelled));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unbound_state_falls_through() {
        let store = Arc::new(InMemorySessionStore::new());
        store
            .set(9, Session::new("unknown", json!(null)))
            .await
            .unwrap();

        let (ctx, _) = context_for(&store, "/help");
        assert!(matches!(
            router().route(&ctx).await.unwrap(),
            FsmRoute::NotHandled
        ));
        assert!(store.get(9).await.unwrap().is_some());
    }
}
