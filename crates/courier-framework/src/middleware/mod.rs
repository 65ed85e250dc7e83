//! The middleware chain.
//!
//! Every dispatch passes through an ordered list of [`Middleware`]s before
//! reaching the handler endpoint. Each one receives the context, the resolved
//! descriptor (if any trigger matched) and a [`Next`] it may call to continue.
//! Not calling `next` ends the chain with whatever result the middleware
//! returns.
//!
//! Ordering is by ascending [`Middleware::priority`], ties broken by
//! registration order.
//!
//! ```text
//!  Tracing(-1000) ─▶ Fsm(-100) ─▶ Permission(0) ─▶ Cooldown(10) ─▶ endpoint
//! ```
//!
//! Setup/teardown around `next` should be done with guards so teardown also
//! runs when a later step panics:
//!
//! ```rust,ignore
//! async fn handle(&self, ctx: &Arc<DispatchContext>, d: Option<&Arc<HandlerDescriptor>>, next: Next<'_>) -> DispatchResult {
//!     let _guard = self.open_transaction(ctx);
//!     next.run(ctx).await
//! }
//! ```

mod cooldown;
mod permission;
mod trace;

pub use cooldown::CooldownMiddleware;
pub use permission::{ActorPermissions, PermissionMiddleware, PermissionProvider, StaticPermissions};
pub use trace::TracingMiddleware;

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::context::DispatchContext;
use crate::descriptor::HandlerDescriptor;
use crate::outcome::DispatchResult;

/// An interceptor wrapping every dispatch.
#[async_trait]
pub trait Middleware: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Lower runs first.
    fn priority(&self) -> i32 {
        0
    }

    async fn handle(
        &self,
        ctx: &Arc<DispatchContext>,
        descriptor: Option<&Arc<HandlerDescriptor>>,
        next: Next<'_>,
    ) -> DispatchResult;
}

/// The step at the end of the chain.
#[async_trait]
pub(crate) trait Endpoint: Send + Sync {
    async fn call(
        &self,
        ctx: &Arc<DispatchContext>,
        descriptor: Option<&Arc<HandlerDescriptor>>,
    ) -> DispatchResult;
}

/// The rest of the chain after the current middleware.
pub struct Next<'a> {
    chain: &'a [Arc<dyn Middleware>],
    descriptor: Option<&'a Arc<HandlerDescriptor>>,
    endpoint: &'a dyn Endpoint,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        chain: &'a [Arc<dyn Middleware>],
        descriptor: Option<&'a Arc<HandlerDescriptor>>,
        endpoint: &'a dyn Endpoint,
    ) -> Self {
        Self {
            chain,
            descriptor,
            endpoint,
        }
    }

    /// Runs the remaining middleware and then the endpoint.
    pub fn run(self, ctx: &'a Arc<DispatchContext>) -> BoxFuture<'a, DispatchResult> {
        match self.chain.split_first() {
            Some((current, rest)) => {
                let next = Next {
                    chain: rest,
                    descriptor: self.descriptor,
                    endpoint: self.endpoint,
                };
                current.handle(ctx, self.descriptor, next)
            }
            None => self.endpoint.call(ctx, self.descriptor),
        }
    }
}

/// Stable sort by priority, keeping registration order for ties.
pub(crate) fn sort_chain(chain: &mut [Arc<dyn Middleware>]) {
    chain.sort_by_key(|m| m.priority());
}
