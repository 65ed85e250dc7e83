use std::sync::Arc;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{Instrument, debug, info_span};

use super::{Middleware, Next};
use crate::context::DispatchContext;
use crate::descriptor::HandlerDescriptor;
use crate::outcome::DispatchResult;

/// Opens a `dispatch` span around the rest of the chain.
///
/// The span carries the correlation id, actor, chat and matched trigger, so
/// every log line emitted by later middleware and the handler is tagged with
/// them.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingMiddleware;

impl TracingMiddleware {
    pub const PRIORITY: i32 = -1000;
}

#[async_trait]
impl Middleware for TracingMiddleware {
    fn name(&self) -> &str {
        "tracing"
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
        let span = info_span!(
            "dispatch",
            correlation_id = %ctx.correlation_id(),
            actor_id = ctx.actor_id(),
            chat_id = ctx.chat_id(),
            trigger = descriptor.map(|d| d.trigger()).unwrap_or("-"),
        );

        let start = Instant::now();
        let result = next.run(ctx).instrument(span.clone()).await;

        span.in_scope(|| {
            debug!(
                elapsed_ms = start.elapsed().as_millis() as u64,
                result = result.kind(),
                "Dispatch finished"
            );
        });
        result
    }
}
