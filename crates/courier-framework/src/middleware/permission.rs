use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use courier_core::ActorId;

use super::{Middleware, Next};
use crate::context::DispatchContext;
use crate::descriptor::HandlerDescriptor;
use crate::outcome::DispatchResult;

/// Permission that grants every other permission.
pub const WILDCARD: &str = "*";

/// What an actor is allowed to do.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActorPermissions {
    #[serde(default)]
    pub level: u8,
    #[serde(default)]
    pub permissions: BTreeSet<String>,
}

impl ActorPermissions {
    pub fn has(&self, permission: &str) -> bool {
        self.permissions.contains(WILDCARD) || self.permissions.contains(permission)
    }
}

/// Source of per-actor permissions.
#[async_trait]
pub trait PermissionProvider: Send + Sync + 'static {
    async fn permissions(&self, actor_id: ActorId) -> ActorPermissions;
}

/// A fixed table of permissions, with a default for unlisted actors.
#[derive(Debug, Clone, Default)]
pub struct StaticPermissions {
    default: ActorPermissions,
    actors: HashMap<ActorId, ActorPermissions>,
}

impl StaticPermissions {
    pub fn new(default: ActorPermissions) -> Self {
        Self {
            default,
            actors: HashMap::new(),
        }
    }

    pub fn with_actor(mut self, actor_id: ActorId, permissions: ActorPermissions) -> Self {
        self.actors.insert(actor_id, permissions);
        self
    }
}

#[async_trait]
impl PermissionProvider for StaticPermissions {
    async fn permissions(&self, actor_id: ActorId) -> ActorPermissions {
        self.actors
            .get(&actor_id)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

/// Checks the matched handler's required permissions and level range.
pub struct PermissionMiddleware {
    provider: Arc<dyn PermissionProvider>,
    denied_message: String,
}

impl PermissionMiddleware {
    pub const PRIORITY: i32 = 0;

    pub fn new(provider: Arc<dyn PermissionProvider>) -> Self {
        Self {
            provider,
            denied_message: "You are not allowed to use this command.".to_string(),
        }
    }

    pub fn denied_message(mut self, message: impl Into<String>) -> Self {
        self.denied_message = message.into();
        self
    }
}

#[async_trait]
impl Middleware for PermissionMiddleware {
    fn name(&self) -> &str {
        "permission"
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
        let Some(descriptor) = descriptor else {
            return next.run(ctx).await;
        };

        let unrestricted =
            descriptor.permissions().is_empty() && *descriptor.access() == (0..=u8::MAX);
        if unrestricted {
            return next.run(ctx).await;
        }

        let granted = self.provider.permissions(ctx.actor_id()).await;
        let level_ok = descriptor.access().contains(&granted.level);
        let missing = descriptor
            .permissions()
            .iter()
            .find(|p| !granted.has(p.as_str()));

        if level_ok && missing.is_none() {
            return next.run(ctx).await;
        }

        debug!(
            actor_id = ctx.actor_id(),
            trigger = descriptor.trigger(),
            level = granted.level,
            missing = missing.map(String::as_str),
            "Permission denied"
        );
        DispatchResult::stop(self.denied_message.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_permissions() {
        let admin = ActorPermissions {
            level: 100,
            permissions: [WILDCARD.to_string()].into_iter().collect(),
        };
        let provider = StaticPermissions::default().with_actor(1, admin);

        let granted = provider.permissions(1).await;
        assert!(granted.has("anything"));

        let granted = provider.permissions(2).await;
        assert_eq!(granted.level, 0);
        assert!(!granted.has("anything"));
    }
}
