//! Handler descriptors.
//!
//! A [`HandlerDescriptor`] is everything the dispatcher knows about one
//! registered handler: the trigger it answers to, the callable itself, the
//! declared parameters, and the policies the middleware chain enforces. It is
//! built once during composition with a [`DescriptorBuilder`] and never
//! mutated afterwards.
//!
//! ```rust,ignore
//! async fn pay(actor: Actor, name: String, amount: i64) -> String {
//!     format!("{} paid {name} {amount}", actor.0)
//! }
//!
//! let pay = HandlerDescriptor::builder(pay)
//!     .param(ParamSpec::actor())
//!     .param(ParamSpec::string("name"))
//!     .param(ParamSpec::int("amount"))
//!     .permission("wallet.pay")
//!     .cooldown(RateLimitPolicy::new(3, Duration::from_secs(60)));
//! ```

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::ops::RangeInclusive;
use std::time::Duration;

use crate::error::DescriptorError;
use crate::fsm::SessionPolicy;
use crate::handler::{BoxedHandler, Handler, into_handler};

// =============================================================================
// Parameter specs
// =============================================================================

/// Context values injected without consuming a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Injected {
    Actor,
    Chat,
    Event,
    Client,
    Session,
}

/// The type a token-consuming parameter resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeTag {
    String,
    Int,
    Float,
    Bool,
    /// One of a fixed set of case-insensitive choices.
    Choice(Vec<String>),
    /// A `@username` reference.
    Mention,
    /// A type resolved by a resolver registered under this name.
    Custom(String),
}

impl TypeTag {
    /// Short name used in error messages and logs.
    pub fn name(&self) -> &str {
        match self {
            Self::String => "string",
            Self::Int => "integer",
            Self::Float => "number",
            Self::Bool => "boolean",
            Self::Choice(_) => "choice",
            Self::Mention => "mention",
            Self::Custom(name) => name,
        }
    }
}

/// How a parameter is filled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamKind {
    Injected(Injected),
    Token {
        tag: TypeTag,
        required: bool,
        vararg: bool,
    },
}

/// One declared handler parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSpec {
    name: String,
    display: Option<String>,
    kind: ParamKind,
}

impl ParamSpec {
    fn token(name: impl Into<String>, tag: TypeTag) -> Self {
        Self {
            name: name.into(),
            display: None,
            kind: ParamKind::Token {
                tag,
                required: true,
                vararg: false,
            },
        }
    }

    fn injected(name: &str, what: Injected) -> Self {
        Self {
            name: name.to_string(),
            display: None,
            kind: ParamKind::Injected(what),
        }
    }

    pub fn string(name: impl Into<String>) -> Self {
        Self::token(name, TypeTag::String)
    }

    pub fn int(name: impl Into<String>) -> Self {
        Self::token(name, TypeTag::Int)
    }

    pub fn float(name: impl Into<String>) -> Self {
        Self::token(name, TypeTag::Float)
    }

    pub fn bool(name: impl Into<String>) -> Self {
        Self::token(name, TypeTag::Bool)
    }

    pub fn mention(name: impl Into<String>) -> Self {
        Self::token(name, TypeTag::Mention)
    }

    pub fn choice<I, S>(name: impl Into<String>, choices: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let choices = choices.into_iter().map(Into::into).collect();
        Self::token(name, TypeTag::Choice(choices))
    }

    /// A parameter converted by the resolver registered as `type_name`.
    pub fn custom(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::token(name, TypeTag::Custom(type_name.into()))
    }

    pub fn actor() -> Self {
        Self::injected("actor", Injected::Actor)
    }

    pub fn chat() -> Self {
        Self::injected("chat", Injected::Chat)
    }

    pub fn event() -> Self {
        Self::injected("event", Injected::Event)
    }

    pub fn client() -> Self {
        Self::injected("client", Injected::Client)
    }

    pub fn session() -> Self {
        Self::injected("session", Injected::Session)
    }

    /// Marks the parameter optional: a missing token binds to absent.
    pub fn optional(mut self) -> Self {
        if let ParamKind::Token { required, .. } = &mut self.kind {
            *required = false;
        }
        self
    }

    /// Marks the parameter as consuming every remaining token.
    pub fn vararg(mut self) -> Self {
        if let ParamKind::Token { vararg, .. } = &mut self.kind {
            *vararg = true;
        }
        self
    }

    /// Overrides the name shown in usage strings and error messages.
    pub fn display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn display_name(&self) -> &str {
        self.display.as_deref().unwrap_or(&self.name)
    }

    pub fn kind(&self) -> &ParamKind {
        &self.kind
    }

    pub fn is_token(&self) -> bool {
        matches!(self.kind, ParamKind::Token { .. })
    }

    fn usage_fragment(&self) -> Option<String> {
        let ParamKind::Token {
            required, vararg, ..
        } = &self.kind
        else {
            return None;
        };
        let dots = if *vararg { "..." } else { "" };
        let name = self.display_name();
        Some(if *required {
            format!("<{name}{dots}>")
        } else {
            format!("[{name}{dots}]")
        })
    }
}

// =============================================================================
// Policies
// =============================================================================

/// Per-actor invocation limit for one handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub capacity: u32,
    pub period: Duration,
}

impl RateLimitPolicy {
    pub fn new(capacity: u32, period: Duration) -> Self {
        Self { capacity, period }
    }
}

/// How the scheduler runs a handler body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Inside the actor's lane, ordered with the actor's other events.
    #[default]
    Sequential,
    /// Spawned off the lane once middleware has passed. Not ordered.
    Detached,
}

// =============================================================================
// HandlerDescriptor
// =============================================================================

/// Immutable description of a registered handler.
pub struct HandlerDescriptor {
    trigger: String,
    handler: BoxedHandler,
    params: Vec<ParamSpec>,
    permissions: BTreeSet<String>,
    access: RangeInclusive<u8>,
    rate_limit: Option<RateLimitPolicy>,
    mode: ExecutionMode,
    session_policy: SessionPolicy,
    usage: String,
    description: Option<String>,
}

impl HandlerDescriptor {
    /// Starts building a descriptor around a handler function.
    pub fn builder<F, T>(handler: F) -> DescriptorBuilder
    where
        F: Handler<T>,
        T: 'static,
    {
        DescriptorBuilder::new(into_handler(handler))
    }

    /// Normalized trigger (or state tag, for state handlers).
    pub fn trigger(&self) -> &str {
        &self.trigger
    }

    pub fn handler(&self) -> &BoxedHandler {
        &self.handler
    }

    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }

    pub fn permissions(&self) -> &BTreeSet<String> {
        &self.permissions
    }

    pub fn access(&self) -> &RangeInclusive<u8> {
        &self.access
    }

    pub fn rate_limit(&self) -> Option<RateLimitPolicy> {
        self.rate_limit
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    pub fn session_policy(&self) -> SessionPolicy {
        self.session_policy
    }

    pub fn usage(&self) -> &str {
        &self.usage
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    /// Names of custom resolvers this descriptor depends on, with the
    /// parameter that uses each.
    pub(crate) fn custom_types(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().filter_map(|p| match &p.kind {
            ParamKind::Token {
                tag: TypeTag::Custom(name),
                ..
            } => Some((p.name(), name.as_str())),
            _ => None,
        })
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("trigger", &self.trigger)
            .field("params", &self.params)
            .field("permissions", &self.permissions)
            .field("access", &self.access)
            .field("rate_limit", &self.rate_limit)
            .field("mode", &self.mode)
            .field("session_policy", &self.session_policy)
            .finish_non_exhaustive()
    }
}

/// Builder for [`HandlerDescriptor`].
///
/// The trigger is supplied by whoever registers the descriptor, so the same
/// builder shape serves commands, group subcommands and state handlers.
pub struct DescriptorBuilder {
    handler: BoxedHandler,
    params: Vec<ParamSpec>,
    permissions: BTreeSet<String>,
    access: RangeInclusive<u8>,
    rate_limit: Option<RateLimitPolicy>,
    mode: ExecutionMode,
    session_policy: SessionPolicy,
    usage: Option<String>,
    description: Option<String>,
}

impl DescriptorBuilder {
    fn new(handler: BoxedHandler) -> Self {
        Self {
            handler,
            params: Vec::new(),
            permissions: BTreeSet::new(),
            access: 0..=u8::MAX,
            rate_limit: None,
            mode: ExecutionMode::default(),
            session_policy: SessionPolicy::default(),
            usage: None,
            description: None,
        }
    }

    /// Declares the next parameter, in handler signature order.
    pub fn param(mut self, spec: ParamSpec) -> Self {
        self.params.push(spec);
        self
    }

    /// Requires a named permission.
    pub fn permission(mut self, permission: impl Into<String>) -> Self {
        self.permissions.insert(permission.into());
        self
    }

    /// Restricts the handler to actors whose level is in `range`.
    pub fn levels(mut self, range: RangeInclusive<u8>) -> Self {
        self.access = range;
        self
    }

    pub fn cooldown(mut self, policy: RateLimitPolicy) -> Self {
        self.rate_limit = Some(policy);
        self
    }

    /// Runs the handler body outside the actor's ordered lane.
    pub fn detached(mut self) -> Self {
        self.mode = ExecutionMode::Detached;
        self
    }

    /// Session handling after a state handler returns.
    pub fn session_policy(mut self, policy: SessionPolicy) -> Self {
        self.session_policy = policy;
        self
    }

    pub fn usage(mut self, usage: impl Into<String>) -> Self {
        self.usage = Some(usage.into());
        self
    }

    pub fn describe(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Validates the parameter list and freezes the descriptor.
    pub fn build(self, trigger: &str) -> Result<HandlerDescriptor, DescriptorError> {
        let trigger = normalize(trigger);
        if trigger.is_empty() {
            return Err(DescriptorError::EmptyTrigger);
        }

        let mut seen = HashSet::new();
        for spec in &self.params {
            if !seen.insert(spec.name()) {
                return Err(DescriptorError::DuplicateParam {
                    trigger,
                    param: spec.name().to_string(),
                });
            }
        }

        let tokens: Vec<&ParamSpec> = self.params.iter().filter(|p| p.is_token()).collect();
        for (i, spec) in tokens.iter().enumerate() {
            let is_vararg = matches!(spec.kind, ParamKind::Token { vararg: true, .. });
            if is_vararg && i + 1 != tokens.len() {
                return Err(DescriptorError::VarargNotLast {
                    trigger,
                    param: spec.name().to_string(),
                });
            }
        }

        let usage = self.usage.unwrap_or_else(|| {
            std::iter::once(trigger.clone())
                .chain(self.params.iter().filter_map(ParamSpec::usage_fragment))
                .collect::<Vec<_>>()
                .join(" ")
        });

        Ok(HandlerDescriptor {
            trigger,
            handler: self.handler,
            params: self.params,
            permissions: self.permissions,
            access: self.access,
            rate_limit: self.rate_limit,
            mode: self.mode,
            session_policy: self.session_policy,
            usage,
            description: self.description,
        })
    }
}

/// Lower-cases, trims and collapses whitespace runs to single spaces.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn noop() {}

    #[test]
    fn test_generated_usage() {
        let descriptor = HandlerDescriptor::builder(noop)
            .param(ParamSpec::actor())
            .param(ParamSpec::string("name"))
            .param(ParamSpec::int("amount").optional())
            .build("/Pay")
            .unwrap();
        assert_eq!(descriptor.trigger(), "/pay");
        assert_eq!(descriptor.usage(), "/pay <name> [amount]");
    }

    #[test]
    fn test_vararg_usage_and_display_name() {
        let descriptor = HandlerDescriptor::builder(noop)
            .param(ParamSpec::mention("users").display("user").vararg())
            .build("/invite")
            .unwrap();
        assert_eq!(descriptor.usage(), "/invite <user...>");
    }

    #[test]
    fn test_vararg_must_be_last_token_param() {
        let err = HandlerDescriptor::builder(noop)
            .param(ParamSpec::string("tags").vararg())
            .param(ParamSpec::chat())
            .param(ParamSpec::int("count"))
            .build("/tag")
            .unwrap_err();
        assert_eq!(
            err,
            DescriptorError::VarargNotLast {
                trigger: "/tag".into(),
                param: "tags".into()
            }
        );

        // Trailing injected parameters are fine.
        assert!(
            HandlerDescriptor::builder(noop)
                .param(ParamSpec::string("tags").vararg())
                .param(ParamSpec::chat())
                .build("/tag")
                .is_ok()
        );
    }

    #[test]
    fn test_empty_trigger_rejected() {
        let err = HandlerDescriptor::builder(noop).build("   ").unwrap_err();
        assert_eq!(err, DescriptorError::EmptyTrigger);
    }

    #[test]
    fn test_normalize() {
        assert_eq!(normalize("  /Settings \t  AUDIO "), "/settings audio");
        assert_eq!(normalize(""), "");
    }
}
