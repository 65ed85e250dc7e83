//! Handler parameter extraction.
//!
//! There are two families of extractors:
//!
//! - **Injected** ([`Ctx`], [`Actor`], [`Chat`], [`RawEvent`], [`Client`],
//!   [`SessionData`]): read from the dispatch context, consume nothing.
//! - **Values** (`String`, integers, `f64`, `bool`, `Option<T>`, `Vec<T>`,
//!   [`Custom`]): take the next bound argument, in declaration order.
//!
//! A value extractor receiving the wrong kind of value means the declared
//! parameter specs and the function signature disagree. That is a system
//! failure, not a user error.

use std::any::Any;
use std::ops::Deref;
use std::sync::Arc;

use serde::de::DeserializeOwned;

use courier_core::{ActorId, BoxedBot, BoxedEvent, ChatId};

use crate::args::{ArgValue, BoundArgs, FromArgValue};
use crate::context::DispatchContext;
use crate::error::ArgumentError;

/// A trait for types that can be used as handler parameters.
pub trait Extract: Sized + Send {
    fn extract(ctx: &Arc<DispatchContext>, args: &mut BoundArgs) -> Result<Self, ArgumentError>;
}

// ============================================================================
// Injected
// ============================================================================

/// The dispatch context itself.
pub type Ctx = Arc<DispatchContext>;

impl Extract for Arc<DispatchContext> {
    fn extract(ctx: &Arc<DispatchContext>, _args: &mut BoundArgs) -> Result<Self, ArgumentError> {
        Ok(ctx.clone())
    }
}

/// The id of the actor who sent the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor(pub ActorId);

impl Extract for Actor {
    fn extract(ctx: &Arc<DispatchContext>, _args: &mut BoundArgs) -> Result<Self, ArgumentError> {
        Ok(Self(ctx.actor_id()))
    }
}

/// The id of the chat the event arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chat(pub ChatId);

impl Extract for Chat {
    fn extract(ctx: &Arc<DispatchContext>, _args: &mut BoundArgs) -> Result<Self, ArgumentError> {
        Ok(Self(ctx.chat_id()))
    }
}

/// The inbound event, type-erased.
#[derive(Debug, Clone)]
pub struct RawEvent(pub BoxedEvent);

impl Extract for RawEvent {
    fn extract(ctx: &Arc<DispatchContext>, _args: &mut BoundArgs) -> Result<Self, ArgumentError> {
        Ok(Self(ctx.event().clone()))
    }
}

impl Deref for RawEvent {
    type Target = BoxedEvent;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The bot used for outbound calls.
#[derive(Clone)]
pub struct Client(pub BoxedBot);

impl Extract for Client {
    fn extract(ctx: &Arc<DispatchContext>, _args: &mut BoundArgs) -> Result<Self, ArgumentError> {
        Ok(Self(ctx.bot().clone()))
    }
}

impl Deref for Client {
    type Target = BoxedBot;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// The actor's session payload, deserialized.
///
/// Fails when there is no session payload; use `Option<SessionData<T>>`
/// where a session is not guaranteed.
#[derive(Debug, Clone)]
pub struct SessionData<T>(pub T);

impl<T: DeserializeOwned + Send> Extract for SessionData<T> {
    fn extract(ctx: &Arc<DispatchContext>, _args: &mut BoundArgs) -> Result<Self, ArgumentError> {
        match ctx.session_data::<T>() {
            Ok(Some(data)) => Ok(Self(data)),
            Ok(None) | Err(_) => Err(ArgumentError::Unavailable("session data")),
        }
    }
}

impl<T: DeserializeOwned + Send> Extract for Option<SessionData<T>> {
    fn extract(ctx: &Arc<DispatchContext>, _args: &mut BoundArgs) -> Result<Self, ArgumentError> {
        Ok(ctx.session_data::<T>().ok().flatten().map(SessionData))
    }
}

// ============================================================================
// Values
// ============================================================================

fn required<T: FromArgValue>(args: &mut BoundArgs) -> Result<T, ArgumentError> {
    match args.next_value(T::EXPECTED)? {
        ArgValue::Absent => Err(ArgumentError::TypeMismatch {
            expected: T::EXPECTED,
            found: "absent",
        }),
        value => T::from_arg(value),
    }
}

macro_rules! impl_extract_value {
    ($($ty:ty),*) => {
        $(
            impl Extract for $ty {
                fn extract(
                    _ctx: &Arc<DispatchContext>,
                    args: &mut BoundArgs,
                ) -> Result<Self, ArgumentError> {
                    required::<$ty>(args)
                }
            }

            impl Extract for Option<$ty> {
                fn extract(
                    _ctx: &Arc<DispatchContext>,
                    args: &mut BoundArgs,
                ) -> Result<Self, ArgumentError> {
                    match args.next_value(<$ty as FromArgValue>::EXPECTED)? {
                        ArgValue::Absent => Ok(None),
                        value => <$ty>::from_arg(value).map(Some),
                    }
                }
            }

            impl Extract for Vec<$ty> {
                fn extract(
                    _ctx: &Arc<DispatchContext>,
                    args: &mut BoundArgs,
                ) -> Result<Self, ArgumentError> {
                    match args.next_value("list")? {
                        ArgValue::List(items) => items.into_iter().map(<$ty>::from_arg).collect(),
                        ArgValue::Absent => Ok(Vec::new()),
                        other => Err(ArgumentError::TypeMismatch {
                            expected: "list",
                            found: other.kind(),
                        }),
                    }
                }
            }
        )*
    };
}

impl_extract_value!(String, i64, i32, u32, u64, usize, f64, bool);

/// A value produced by a custom resolver.
#[derive(Debug, Clone, PartialEq)]
pub struct Custom<T>(pub T);

fn downcast_custom<T: Any + Clone>(value: ArgValue) -> Result<T, ArgumentError> {
    match value {
        ArgValue::Custom(any) => any
            .downcast_ref::<T>()
            .cloned()
            .ok_or(ArgumentError::TypeMismatch {
                expected: std::any::type_name::<T>(),
                found: "custom value of another type",
            }),
        other => Err(ArgumentError::TypeMismatch {
            expected: std::any::type_name::<T>(),
            found: other.kind(),
        }),
    }
}

impl<T: Any + Clone + Send> Extract for Custom<T> {
    fn extract(_ctx: &Arc<DispatchContext>, args: &mut BoundArgs) -> Result<Self, ArgumentError> {
        downcast_custom(args.next_value("custom")?).map(Custom)
    }
}

impl<T: Any + Clone + Send> Extract for Option<Custom<T>> {
    fn extract(_ctx: &Arc<DispatchContext>, args: &mut BoundArgs) -> Result<Self, ArgumentError> {
        match args.next_value("custom")? {
            ArgValue::Absent => Ok(None),
            value => downcast_custom(value).map(|v| Some(Custom(v))),
        }
    }
}

impl<T: Any + Clone + Send> Extract for Vec<Custom<T>> {
    fn extract(_ctx: &Arc<DispatchContext>, args: &mut BoundArgs) -> Result<Self, ArgumentError> {
        match args.next_value("list")? {
            ArgValue::List(items) => items
                .into_iter()
                .map(|item| downcast_custom(item).map(Custom))
                .collect(),
            ArgValue::Absent => Ok(Vec::new()),
            other => Err(ArgumentError::TypeMismatch {
                expected: "list",
                found: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::{InMemorySessionStore, Session, SessionStore};
    use crate::testing::{RecordingBot, text_event};
    use serde::Deserialize;
    use serde_json::json;

    fn ctx() -> Arc<DispatchContext> {
        Arc::new(DispatchContext::new(
            text_event(5, "/pay Alice 100"),
            RecordingBot::new().boxed(),
            Arc::new(InMemorySessionStore::new()),
        ))
    }

    #[test]
    fn test_injected_do_not_consume() {
        let ctx = ctx();
        let mut args: BoundArgs = [ArgValue::Text("Alice".into())].into_iter().collect();

        let Actor(actor) = Actor::extract(&ctx, &mut args).unwrap();
        let Chat(chat) = Chat::extract(&ctx, &mut args).unwrap();
        assert_eq!((actor, chat), (5, 5));
        assert_eq!(args.len(), 1);

        assert_eq!(String::extract(&ctx, &mut args).unwrap(), "Alice");
        assert!(args.is_empty());
    }

    #[test]
    fn test_absent_value_requires_option() {
        let ctx = ctx();
        let mut args: BoundArgs = [ArgValue::Absent, ArgValue::Absent].into_iter().collect();

        assert_eq!(Option::<i64>::extract(&ctx, &mut args).unwrap(), None);
        assert!(matches!(
            i64::extract(&ctx, &mut args),
            Err(ArgumentError::TypeMismatch { found: "absent", .. })
        ));
    }

    #[test]
    fn test_vec_from_list() {
        let ctx = ctx();
        let mut args: BoundArgs = [ArgValue::List(vec![ArgValue::Int(1), ArgValue::Int(2)])]
            .into_iter()
            .collect();
        assert_eq!(Vec::<u32>::extract(&ctx, &mut args).unwrap(), vec![1, 2]);
    }

    #[test]
    fn test_custom_downcast() {
        #[derive(Debug, Clone, PartialEq)]
        struct Color(u8, u8, u8);

        let ctx = ctx();
        let mut args: BoundArgs = [ArgValue::custom(Color(1, 2, 3)), ArgValue::Int(4)]
            .into_iter()
            .collect();
        assert_eq!(
            Custom::<Color>::extract(&ctx, &mut args).unwrap(),
            Custom(Color(1, 2, 3))
        );
        assert!(Custom::<Color>::extract(&ctx, &mut args).is_err());
    }

    #[tokio::test]
    async fn test_session_data() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Draft {
            title: String,
        }

        let ctx = ctx();
        let mut args = BoundArgs::new();
        assert!(SessionData::<Draft>::extract(&ctx, &mut args).is_err());
        assert!(
            Option::<SessionData<Draft>>::extract(&ctx, &mut args)
                .unwrap()
                .is_none()
        );

        ctx.sessions()
            .set(5, Session::new("draft", json!({"title": "hello"})))
            .await
            .unwrap();
        ctx.set_session_snapshot(ctx.sessions().get(5).await.unwrap());

        let SessionData(draft) = SessionData::<Draft>::extract(&ctx, &mut args).unwrap();
        assert_eq!(draft.title, "hello");
    }
}
