//! # Courier Framework
//!
//! The dispatch and execution core of Courier.
//!
//! This layer provides:
//! - A trigger registry with longest-match routing and command groups
//! - Declarative handler descriptors with typed argument binding
//! - Axum-style handlers taking extractors ([`Actor`], [`Ctx`], `String`, ...)
//! - A prioritized middleware chain (tracing, conversations, permissions,
//!   cooldowns)
//! - A conversation state machine backed by a pluggable [`SessionStore`]
//! - A per-actor [`Scheduler`] that serializes each actor's events
//!
//! ```rust,ignore
//! async fn pay(Actor(from): Actor, to: String, amount: u32) -> String {
//!     format!("{from} paid {to} {amount}")
//! }
//!
//! let dispatcher = Dispatcher::builder()
//!     .command(
//!         "/pay",
//!         HandlerDescriptor::builder(pay)
//!             .param(ParamSpec::actor())
//!             .param(ParamSpec::mention("to"))
//!             .param(ParamSpec::int("amount")),
//!     )
//!     .build()?;
//! ```

pub mod args;
pub mod context;
pub mod descriptor;
pub mod dispatcher;
pub mod error;
pub mod extractor;
pub mod fsm;
pub mod handler;
pub mod middleware;
pub mod outcome;
pub mod registry;
pub mod scheduler;

#[cfg(test)]
mod testing;

pub use args::{ArgResolver, ArgValue, BoundArgs, FromArgValue, ResolverRegistry, bind, tokenize};
pub use context::DispatchContext;
pub use descriptor::{
    DescriptorBuilder, ExecutionMode, HandlerDescriptor, Injected, ParamKind, ParamSpec,
    RateLimitPolicy, TypeTag, normalize,
};
pub use dispatcher::{
    DispatchSettings, Dispatcher, DispatcherBuilder, ErrorSink, TracingErrorSink,
};
pub use error::{
    ArgumentError, BuildError, DescriptorError, DispatchError, HandlerError, SchedulerError,
    SessionError,
};
pub use extractor::{Actor, Chat, Client, Ctx, Custom, Extract, RawEvent, SessionData};
pub use fsm::{
    FsmMiddleware, FsmRouter, InMemorySessionStore, Session, SessionPolicy, SessionStore,
    StateRegistry,
};
pub use handler::{BoxedHandler, Handler, HandlerResponse, into_handler};
pub use middleware::{
    ActorPermissions, CooldownMiddleware, Middleware, Next, PermissionMiddleware,
    PermissionProvider, StaticPermissions, TracingMiddleware,
};
pub use outcome::{DispatchOutcome, DispatchResult};
pub use registry::{CommandGroup, RouteMatch, TriggerRegistry, TriggerRegistryBuilder};
pub use scheduler::{Backpressure, Scheduler, SchedulerConfig, TaskHandle};

/// Prelude for writing handlers.
pub mod prelude {
    pub use super::descriptor::{HandlerDescriptor, ParamSpec, RateLimitPolicy};
    pub use super::dispatcher::Dispatcher;
    pub use super::error::HandlerError;
    pub use super::extractor::{Actor, Chat, Client, Ctx, Custom, SessionData};
    pub use super::fsm::SessionPolicy;
    pub use super::outcome::{DispatchOutcome, DispatchResult};
    pub use super::registry::CommandGroup;
}
