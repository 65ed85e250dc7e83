//! Conversation state machine.
//!
//! A handler moves an actor into a named state with
//! [`DispatchContext::enter_state`](crate::DispatchContext::enter_state). While
//! the actor has a state, their next event is routed to the handler registered
//! for that state instead of through the trigger registry. If no handler is
//! bound to the tag, ordinary routing takes over.
//!
//! Safe read-modify-write of sessions relies on the scheduler running an
//! actor's events one at a time.

mod router;
mod store;

pub use router::{FsmMiddleware, FsmRoute, FsmRouter, StateRegistry};
pub(crate) use router::usage_message;
pub use store::{InMemorySessionStore, SessionStore};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-actor conversation record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Active state tag. `None` means no conversation is in progress.
    pub state: Option<String>,
    /// Arbitrary data carried between steps.
    #[serde(default)]
    pub payload: Value,
}

impl Session {
    pub fn new(state: impl Into<String>, payload: Value) -> Self {
        Self {
            state: Some(state.into()),
            payload,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state.is_some()
    }
}

/// What happens to the session after a state handler returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPolicy {
    /// Keep the session; the handler clears or advances it explicitly.
    #[default]
    Preserve,
    /// Clear the session, unless the handler already moved it to a
    /// different state.
    Clear,
}
