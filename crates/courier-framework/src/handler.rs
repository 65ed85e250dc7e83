//! Handler system for the Courier framework.
//!
//! Handlers are plain async functions. The [`Handler`] trait is implemented
//! for functions of up to twelve parameters through blanket implementations,
//! similar to Axum's handler system. Every parameter implements
//! [`Extract`]: injected extractors read the dispatch context, value
//! extractors take the next bound argument.
//!
//! # Example
//!
//! ```rust,ignore
//! // No parameters, no reply
//! async fn ping() {}
//!
//! // Injected actor plus two bound arguments; the String return is sent back
//! async fn pay(actor: Actor, name: String, amount: i64) -> String {
//!     format!("{} sent {amount} to {name}", actor.0)
//! }
//!
//! // anyhow errors become system failures with a correlation id
//! async fn sync_profile(ctx: Ctx) -> anyhow::Result<()> {
//!     ctx.reply("done").await?;
//!     Ok(())
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use tracing::{error, warn};

use crate::args::BoundArgs;
use crate::context::DispatchContext;
use crate::error::{ArgumentError, DispatchError, HandlerError};
use crate::extractor::Extract;
use crate::outcome::DispatchResult;

// ============================================================================
// HandlerResponse - Handle handler return values
// ============================================================================

/// A trait for types that can be returned from handlers.
#[async_trait]
pub trait HandlerResponse: Send {
    /// Performs any side effect of the value (such as sending a reply) and
    /// turns it into the step result.
    async fn into_result(self, ctx: &Arc<DispatchContext>) -> DispatchResult;
}

/// Implementation for `()` - nothing to send.
#[async_trait]
impl HandlerResponse for () {
    async fn into_result(self, _ctx: &Arc<DispatchContext>) -> DispatchResult {
        DispatchResult::Continue
    }
}

/// Implementation for `String` - reply to the originating chat.
#[async_trait]
impl HandlerResponse for String {
    async fn into_result(self, ctx: &Arc<DispatchContext>) -> DispatchResult {
        if let Err(e) = ctx.reply(&self).await {
            error!(correlation_id = %ctx.correlation_id(), "Failed to send reply: {e}");
        }
        DispatchResult::Continue
    }
}

#[async_trait]
impl HandlerResponse for &'static str {
    async fn into_result(self, ctx: &Arc<DispatchContext>) -> DispatchResult {
        self.to_string().into_result(ctx).await
    }
}

/// Implementation for `DispatchResult` - passed through as is.
#[async_trait]
impl HandlerResponse for DispatchResult {
    async fn into_result(self, _ctx: &Arc<DispatchContext>) -> DispatchResult {
        self
    }
}

/// Implementation for `Option<T>` - `None` does nothing.
#[async_trait]
impl<T: HandlerResponse> HandlerResponse for Option<T> {
    async fn into_result(self, ctx: &Arc<DispatchContext>) -> DispatchResult {
        match self {
            Some(t) => t.into_result(ctx).await,
            None => DispatchResult::Continue,
        }
    }
}

/// Implementation for `Result<T, E>`.
///
/// Validation and permission errors become a STOP with the message; anything
/// else is a system failure.
#[async_trait]
impl<T, E> HandlerResponse for Result<T, E>
where
    T: HandlerResponse,
    E: Into<HandlerError> + Send,
{
    async fn into_result(self, ctx: &Arc<DispatchContext>) -> DispatchResult {
        match self {
            Ok(t) => t.into_result(ctx).await,
            Err(e) => match e.into() {
                HandlerError::Validation(message) | HandlerError::Permission(message) => {
                    DispatchResult::Stop(Some(message))
                }
                HandlerError::System(err) => DispatchResult::Error(DispatchError::Handler(err)),
            },
        }
    }
}

// ============================================================================
// Handler Trait
// ============================================================================

/// The core trait for handlers.
///
/// # Blanket Implementation
///
/// Implemented for async functions that:
/// - Take 0-12 parameters that implement [`Extract`]
/// - Return a type that implements [`HandlerResponse`]
#[async_trait]
pub trait Handler<T>: Clone + Send + Sync + 'static {
    /// Calls the handler with the given context and bound arguments.
    async fn call(self, ctx: Arc<DispatchContext>, args: BoundArgs) -> DispatchResult;
}

// ============================================================================
// BoxedHandler - Type-erased handler stored in descriptors
// ============================================================================

/// A type-erased handler.
pub type BoxedHandler =
    Arc<dyn Fn(Arc<DispatchContext>, BoundArgs) -> BoxFuture<'static, DispatchResult> + Send + Sync>;

/// Converts a handler function into a boxed handler.
pub fn into_handler<F, T>(f: F) -> BoxedHandler
where
    F: Handler<T>,
    T: 'static,
{
    Arc::new(move |ctx, args| f.clone().call(ctx, args))
}

fn binding_failed(err: ArgumentError) -> DispatchResult {
    DispatchResult::Error(DispatchError::Binding(err))
}

// ============================================================================
// Handler implementations for functions (Axum-style)
// ============================================================================

/// Macro to generate Handler implementations for functions with different arities.
macro_rules! impl_handler {
    (
        $($ty:ident),*
    ) => {
        #[allow(non_snake_case, unused_mut)]
        #[async_trait]
        impl<F, Fut, Res, $($ty,)*> Handler<($($ty,)*)> for F
        where
            F: FnOnce($($ty,)*) -> Fut + Clone + Send + Sync + 'static,
            Fut: Future<Output = Res> + Send + 'static,
            Res: HandlerResponse + 'static,
            $( $ty: Extract + 'static, )*
        {
            async fn call(self, ctx: Arc<DispatchContext>, args: BoundArgs) -> DispatchResult {
                let mut args = args;
                $(
                    let $ty = match $ty::extract(&ctx, &mut args) {
                        Ok(value) => value,
                        Err(e) => return binding_failed(e),
                    };
                )*

                if !args.is_empty() {
                    warn!(
                        correlation_id = %ctx.correlation_id(),
                        unconsumed = args.len(),
                        "Handler signature takes fewer values than were declared"
                    );
                    return binding_failed(ArgumentError::Unconsumed { count: args.len() });
                }

                let res = (self)($($ty,)*).await;
                res.into_result(&ctx).await
            }
        }
    };
}

// Generate implementations for 0-12 parameters
impl_handler!();
impl_handler!(T1);
impl_handler!(T1, T2);
impl_handler!(T1, T2, T3);
impl_handler!(T1, T2, T3, T4);
impl_handler!(T1, T2, T3, T4, T5);
impl_handler!(T1, T2, T3, T4, T5, T6);
impl_handler!(T1, T2, T3, T4, T5, T6, T7);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11);
impl_handler!(T1, T2, T3, T4, T5, T6, T7, T8, T9, T10, T11, T12);
