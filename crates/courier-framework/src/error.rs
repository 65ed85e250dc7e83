//! Error types for the Courier framework.
//!
//! Errors are split by audience. [`ArgumentError`] and the `Validation` /
//! `Permission` kinds of [`HandlerError`] are shown to the actor as a STOP
//! message. Everything that ends up in a [`DispatchError`] is a system failure:
//! it is logged, reported to the error sink, and the actor only sees a generic
//! message with a correlation id.

use thiserror::Error;

use courier_core::ApiError;

// =============================================================================
// Argument binding
// =============================================================================

/// Errors raised while binding text tokens to handler parameters.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ArgumentError {
    /// A required parameter had no token left to consume.
    #[error("missing argument `{param}`")]
    Missing {
        /// Display name of the parameter.
        param: String,
    },

    /// A token could not be converted to the parameter's type.
    #[error("invalid value `{token}` for `{param}`: {reason}")]
    Invalid {
        /// Display name of the parameter.
        param: String,
        /// The offending token.
        token: String,
        /// Why the resolver rejected it.
        reason: String,
    },

    /// Tokens were left over after every parameter was bound.
    #[error("too many arguments")]
    TooMany {
        /// Usage string of the handler.
        usage: String,
    },

    /// A handler parameter asked for a different kind of value than the one
    /// bound for its position.
    #[error("handler parameter expected {expected}, bound value is {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// The handler signature consumed fewer values than were bound.
    #[error("{count} bound value(s) were not consumed by the handler")]
    Unconsumed { count: usize },

    /// An injected parameter had nothing to inject.
    #[error("nothing to inject for {0}")]
    Unavailable(&'static str),
}

impl ArgumentError {
    /// Returns `true` for errors caused by user input rather than by a
    /// mismatch between declared parameters and the handler signature.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::Missing { .. } | Self::Invalid { .. } | Self::TooMany { .. }
        )
    }

    /// Display name of the offending parameter, if there is one.
    pub fn param(&self) -> Option<&str> {
        match self {
            Self::Missing { param } | Self::Invalid { param, .. } => Some(param),
            _ => None,
        }
    }
}

// =============================================================================
// Composition
// =============================================================================

/// Errors in a handler's declared parameter list.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DescriptorError {
    #[error("trigger must not be empty")]
    EmptyTrigger,

    #[error("vararg parameter `{param}` of `{trigger}` must be the last token-consuming parameter")]
    VarargNotLast { trigger: String, param: String },

    #[error("duplicate parameter name `{param}` in `{trigger}`")]
    DuplicateParam { trigger: String, param: String },

    #[error("state handler `{state}` cannot declare {policy}; guard the command that enters the state instead")]
    StatePolicy { state: String, policy: &'static str },
}

/// Errors raised when assembling a [`Dispatcher`](crate::Dispatcher).
#[derive(Debug, Clone, Error)]
pub enum BuildError {
    #[error(transparent)]
    Descriptor(#[from] DescriptorError),

    #[error("`{trigger}` declares parameter `{param}` of custom type `{type_name}` with no registered resolver")]
    UnknownResolver {
        trigger: String,
        param: String,
        type_name: String,
    },
}

// =============================================================================
// Sessions
// =============================================================================

/// Errors from a [`SessionStore`](crate::fsm::SessionStore) backend.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("session backend error: {0}")]
    Backend(String),

    #[error("session payload error: {0}")]
    Payload(String),
}

impl From<serde_json::Error> for SessionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Payload(err.to_string())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Error type a handler may return.
///
/// Handlers can return `Result<T, E>` for any `E: Into<HandlerError>`, which
/// includes `anyhow::Error`.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Bad user input detected by the handler itself. Shown to the actor.
    #[error("{0}")]
    Validation(String),

    /// The actor may not do this. Shown to the actor.
    #[error("{0}")]
    Permission(String),

    /// Anything else. Logged and reported, never shown.
    #[error(transparent)]
    System(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn permission(message: impl Into<String>) -> Self {
        Self::Permission(message.into())
    }
}

impl From<ApiError> for HandlerError {
    fn from(err: ApiError) -> Self {
        Self::System(err.into())
    }
}

impl From<SessionError> for HandlerError {
    fn from(err: SessionError) -> Self {
        Self::System(err.into())
    }
}

// =============================================================================
// Dispatch
// =============================================================================

/// A system-class failure that reached the dispatch boundary.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The handler returned a system error.
    #[error("handler failed: {0:#}")]
    Handler(anyhow::Error),

    /// The handler or a middleware panicked.
    #[error("panicked: {0}")]
    Panic(String),

    /// Declared parameters and the handler signature disagree.
    #[error("argument binding failed: {0}")]
    Binding(ArgumentError),

    /// A redirect pointed back at itself or tried a second hop.
    #[error("redirect from `{from}` to `{to}` rejected: only a single hop is allowed")]
    RedirectLoop { from: String, to: String },

    /// The session store failed.
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A middleware reported a failure.
    #[error("middleware `{name}` failed: {reason}")]
    Middleware { name: String, reason: String },
}

impl DispatchError {
    pub(crate) fn from_panic(payload: Box<dyn std::any::Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panic(message)
    }
}

/// Errors returned by the [`Scheduler`](crate::Scheduler).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchedulerError {
    /// The queue is at capacity and the back-pressure policy is `Reject`.
    #[error("scheduler queue is full ({capacity} pending tasks)")]
    QueueFull { capacity: usize },

    /// The scheduler no longer accepts tasks.
    #[error("scheduler is shutting down")]
    ShuttingDown,

    /// The task ended without producing a result (it panicked).
    #[error("task for actor {actor_id} ended without a result")]
    TaskFailed { actor_id: i64 },
}
