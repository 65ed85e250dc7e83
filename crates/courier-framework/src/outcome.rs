//! Results of middleware steps and of whole dispatches.

use uuid::Uuid;

use crate::error::DispatchError;

/// The result of one middleware or handler step.
///
/// Anything other than `Continue` ends the chain: no later middleware and no
/// handler runs.
#[derive(Debug)]
pub enum DispatchResult {
    /// Keep going.
    Continue,
    /// End the chain, optionally telling the actor why.
    Stop(Option<String>),
    /// End the chain with a system failure.
    Error(DispatchError),
    /// Re-run the pipeline against a different trigger text.
    Redirect(String),
}

impl DispatchResult {
    /// Stop with a message for the actor.
    pub fn stop(message: impl Into<String>) -> Self {
        Self::Stop(Some(message.into()))
    }

    pub fn redirect(text: impl Into<String>) -> Self {
        Self::Redirect(text.into())
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Stop(_) => "stop",
            Self::Error(_) => "error",
            Self::Redirect(_) => "redirect",
        }
    }
}

impl From<DispatchError> for DispatchResult {
    fn from(err: DispatchError) -> Self {
        Self::Error(err)
    }
}

/// What the dispatcher reports back to the caller for one inbound event.
///
/// A redirect is folded into the outcome of the hop it led to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// A command handler ran.
    Handled { trigger: String },
    /// A conversation state handler ran.
    StateHandled { state: String },
    /// The actor cancelled their conversation.
    Cancelled,
    /// A middleware or handler stopped the chain.
    Stopped { message: Option<String> },
    /// A detached handler was spawned.
    Detached { trigger: String },
    /// A system failure. The id matches the logs and the error report.
    Failed { correlation_id: Uuid },
    /// Nothing matched the event.
    NotMatched,
}

impl DispatchOutcome {
    pub fn is_handled(&self) -> bool {
        matches!(
            self,
            Self::Handled { .. } | Self::StateHandled { .. } | Self::Detached { .. }
        )
    }
}
