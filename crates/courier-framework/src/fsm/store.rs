use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use courier_core::ActorId;

use super::Session;
use crate::error::SessionError;

/// Storage for per-actor sessions.
///
/// The default [`InMemorySessionStore`] is process-local. An external
/// key-value store can be plugged in as long as it offers atomic per-key
/// reads and writes.
#[async_trait]
pub trait SessionStore: Send + Sync + 'static {
    async fn get(&self, actor_id: ActorId) -> Result<Option<Session>, SessionError>;

    async fn set(&self, actor_id: ActorId, session: Session) -> Result<(), SessionError>;

    async fn clear(&self, actor_id: ActorId) -> Result<(), SessionError>;
}

/// Process-local session store.
#[derive(Debug, Default)]
pub struct InMemorySessionStore {
    sessions: RwLock<HashMap<ActorId, Session>>,
}

impl InMemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of actors with a stored session.
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionStore {
    async fn get(&self, actor_id: ActorId) -> Result<Option<Session>, SessionError> {
        Ok(self.sessions.read().get(&actor_id).cloned())
    }

    async fn set(&self, actor_id: ActorId, session: Session) -> Result<(), SessionError> {
        self.sessions.write().insert(actor_id, session);
        Ok(())
    }

    async fn clear(&self, actor_id: ActorId) -> Result<(), SessionError> {
        self.sessions.write().remove(&actor_id);
        Ok(())
    }
}
