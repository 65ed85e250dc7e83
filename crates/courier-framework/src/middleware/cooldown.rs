use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;

use courier_core::{ActorId, TokenBucket};

use super::{Middleware, Next};
use crate::context::DispatchContext;
use crate::descriptor::HandlerDescriptor;
use crate::outcome::DispatchResult;

/// Enforces a handler's [`RateLimitPolicy`](crate::RateLimitPolicy) with one
/// token bucket per (actor, trigger).
///
/// Never waits: an empty bucket stops the chain with a message. Buckets that
/// have refilled are dropped whenever a new one is created.
#[derive(Default)]
pub struct CooldownMiddleware {
    buckets: Mutex<HashMap<(ActorId, String), Arc<TokenBucket>>>,
}

impl CooldownMiddleware {
    pub const PRIORITY: i32 = 10;

    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Middleware for CooldownMiddleware {
    fn name(&self) -> &str {
        "cooldown"
    }

    fn priority(&self) -> i32 {
        Self::PRIORITY
    }

    async fn handle(
        &self,
        ctx: &Arc<DispatchContext>,
        descriptor: Option<&Arc<HandlerDescriptor>>,
        next: Next<'_>,
    ) -> DispatchResult {
        let Some((descriptor, policy)) =
            descriptor.and_then(|d| d.rate_limit().map(|policy| (d, policy)))
        else {
            return next.run(ctx).await;
        };

        let bucket = {
            let mut buckets = self.buckets.lock();
            let key = (ctx.actor_id(), descriptor.trigger().to_string());
            match buckets.get(&key) {
                Some(bucket) => bucket.clone(),
                None => {
                    // A full bucket behaves like a fresh one, so idle entries can go.
                    buckets.retain(|_, bucket| bucket.available() < bucket.capacity());
                    let bucket = Arc::new(TokenBucket::new(policy.capacity, policy.period));
                    buckets.insert(key, bucket.clone());
                    bucket
                }
            }
        };

        match bucket.try_acquire() {
            Ok(()) => next.run(ctx).await,
            Err(wait) => {
                let seconds = wait.as_secs() + u64::from(wait.subsec_nanos() > 0);
                debug!(
                    actor_id = ctx.actor_id(),
                    trigger = descriptor.trigger(),
                    wait_secs = seconds,
                    "Cooldown active"
                );
                DispatchResult::stop(format!("Slow down! Try again in {seconds}s."))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RateLimitPolicy;
    use crate::fsm::InMemorySessionStore;
    use crate::middleware::Endpoint;
    use crate::testing::{RecordingBot, text_event};
    use std::time::Duration;

    struct Handled;

    #[async_trait]
    impl Endpoint for Handled {
        async fn call(
            &self,
            _ctx: &Arc<DispatchContext>,
            _descriptor: Option<&Arc<HandlerDescriptor>>,
        ) -> DispatchResult {
            DispatchResult::Continue
        }
    }

    async fn roll(
        cooldown: &Arc<dyn Middleware>,
        descriptor: &Arc<HandlerDescriptor>,
        actor: ActorId,
    ) -> DispatchResult {
        let ctx = Arc::new(DispatchContext::new(
            text_event(actor, "/roll"),
            RecordingBot::new().boxed(),
            Arc::new(InMemorySessionStore::new()),
        ));
        let chain = [cooldown.clone()];
        Next::new(&chain, Some(descriptor), &Handled).run(&ctx).await
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_buckets_are_evicted() {
        async fn noop() {}

        let descriptor = Arc::new(
            HandlerDescriptor::builder(noop)
                .cooldown(RateLimitPolicy::new(1, Duration::from_secs(1)))
                .build("/roll")
                .unwrap(),
        );
        let middleware = Arc::new(CooldownMiddleware::new());
        let cooldown: Arc<dyn Middleware> = middleware.clone();

        for actor in 0..100 {
            assert!(roll(&cooldown, &descriptor, actor).await.is_continue());
        }
        assert!(matches!(
            roll(&cooldown, &descriptor, 0).await,
            DispatchResult::Stop(Some(_))
        ));
        assert_eq!(middleware.buckets.lock().len(), 100);

        tokio::time::advance(Duration::from_secs(3600)).await;
        assert!(roll(&cooldown, &descriptor, 1000).await.is_continue());
        assert_eq!(middleware.buckets.lock().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_draining_buckets_are_kept() {
        async fn noop() {}

        let descriptor = Arc::new(
            HandlerDescriptor::builder(noop)
                .cooldown(RateLimitPolicy::new(1, Duration::from_secs(30)))
                .build("/roll")
                .unwrap(),
        );
        let middleware = Arc::new(CooldownMiddleware::new());
        let cooldown: Arc<dyn Middleware> = middleware.clone();

        assert!(roll(&cooldown, &descriptor, 1).await.is_continue());
        tokio::time::advance(Duration::from_secs(10)).await;
        assert!(roll(&cooldown, &descriptor, 2).await.is_continue());

        assert_eq!(middleware.buckets.lock().len(), 2);
        assert!(!roll(&cooldown, &descriptor, 1).await.is_continue());
    }
}
