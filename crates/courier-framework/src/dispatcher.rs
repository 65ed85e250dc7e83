//! The dispatcher: the outer boundary of the dispatch pipeline.
//!
//! For each event the dispatcher resolves a descriptor from the trigger
//! registry, runs the middleware chain (which includes the FSM router) and
//! the handler endpoint, then turns the final [`DispatchResult`] into a
//! [`DispatchOutcome`]:
//!
//! - `Stop` messages are delivered to the actor here, in one place.
//! - `Redirect` re-runs the pipeline once against the new text.
//! - `Error` and panics are logged with the correlation id, reported to the
//!   [`ErrorSink`], and the actor gets a generic message.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use tokio_util::task::TaskTracker;
use tracing::{Instrument, Span, debug, error, info, warn};

use courier_core::{BoxedBot, BoxedEvent};

use crate::args::{ArgResolver, ResolverRegistry, bind};
use crate::context::{DispatchContext, HandledBy};
use crate::descriptor::{DescriptorBuilder, ExecutionMode, HandlerDescriptor, normalize};
use crate::error::{BuildError, DescriptorError, DispatchError};
use crate::fsm::{FsmMiddleware, FsmRouter, InMemorySessionStore, SessionStore, StateRegistry};
use crate::middleware::{
    CooldownMiddleware, Endpoint, Middleware, Next, PermissionMiddleware, PermissionProvider,
    StaticPermissions, TracingMiddleware, sort_chain,
};
use crate::outcome::{DispatchOutcome, DispatchResult};
use crate::registry::{CommandGroup, TriggerRegistry, TriggerRegistryBuilder};

// ============================================================================
// Error sink
// ============================================================================

/// Receives system-class failures, separately from what the actor is told.
pub trait ErrorSink: Send + Sync + 'static {
    fn report(&self, ctx: &DispatchContext, error: &DispatchError, trigger: Option<&str>);
}

/// Reports failures as `tracing` error events.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn report(&self, ctx: &DispatchContext, error: &DispatchError, trigger: Option<&str>) {
        error!(
            correlation_id = %ctx.correlation_id(),
            actor_id = ctx.actor_id(),
            chat_id = ctx.chat_id(),
            trigger = trigger.unwrap_or("-"),
            error = ?error,
            "Dispatch failed: {error}"
        );
    }
}

// ============================================================================
// Settings
// ============================================================================

/// User-facing texts and routing knobs.
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Accept `/cmd@name` only for this bot name.
    pub bot_username: Option<String>,
    pub cancel_keywords: Vec<String>,
    pub cancel_message: String,
    /// Shown for system failures, followed by the correlation id.
    pub error_message: String,
    pub permission_denied_message: String,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            bot_username: None,
            cancel_keywords: vec!["/cancel".to_string(), "cancel".to_string()],
            cancel_message: "Cancelled.".to_string(),
            error_message: "Something went wrong.".to_string(),
            permission_denied_message: "You are not allowed to use this command.".to_string(),
        }
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Composes a [`Dispatcher`].
///
/// ```rust,ignore
/// let dispatcher = Dispatcher::builder()
///     .command("/start", HandlerDescriptor::builder(start))
///     .group(
///         CommandGroup::new("/settings")
///             .default(HandlerDescriptor::builder(show_settings))
///             .sub("audio", HandlerDescriptor::builder(audio).param(ParamSpec::choice("level", ["low", "high"]))),
///     )
///     .state("ask_name", HandlerDescriptor::builder(got_name).param(ParamSpec::string("name")))
///     .help("/help")
///     .build()?;
/// ```
pub struct DispatcherBuilder {
    registry: TriggerRegistryBuilder,
    states: StateRegistry,
    resolvers: ResolverRegistry,
    middleware: Vec<Arc<dyn Middleware>>,
    sessions: Arc<dyn SessionStore>,
    permissions: Arc<dyn PermissionProvider>,
    error_sink: Arc<dyn ErrorSink>,
    settings: DispatchSettings,
    help_trigger: Option<String>,
    errors: Vec<DescriptorError>,
}

impl Default for DispatcherBuilder {
    fn default() -> Self {
        Self {
            registry: TriggerRegistryBuilder::new(),
            states: StateRegistry::new(),
            resolvers: ResolverRegistry::new(),
            middleware: Vec::new(),
            sessions: Arc::new(InMemorySessionStore::new()),
            permissions: Arc::new(StaticPermissions::default()),
            error_sink: Arc::new(TracingErrorSink),
            settings: DispatchSettings::default(),
            help_trigger: None,
            errors: Vec::new(),
        }
    }
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a command. The last registration of a trigger wins.
    pub fn command(mut self, trigger: &str, descriptor: DescriptorBuilder) -> Self {
        if let Err(e) = self.registry.command(trigger, descriptor) {
            self.errors.push(e);
        }
        self
    }

    /// Registers a command group.
    pub fn group(mut self, group: CommandGroup) -> Self {
        if let Err(e) = group.register_into(&mut self.registry) {
            self.errors.push(e);
        }
        self
    }

    /// Binds a handler to a conversation state.
    ///
    /// State handlers bypass the command middleware, so permission, level
    /// and cooldown policies are rejected here.
    pub fn state(mut self, tag: &str, descriptor: DescriptorBuilder) -> Self {
        match descriptor.build(tag).and_then(check_state_policies) {
            Ok(descriptor) => self.states.insert(descriptor),
            Err(e) => self.errors.push(e),
        }
        self
    }

    /// Registers a resolver for a custom parameter type.
    pub fn resolver(mut self, type_name: impl Into<String>, resolver: impl ArgResolver) -> Self {
        self.resolvers.register(type_name, resolver);
        self
    }

    /// Adds a middleware. Placement is decided by its priority.
    pub fn middleware(mut self, middleware: impl Middleware) -> Self {
        self.middleware.push(Arc::new(middleware));
        self
    }

    pub fn session_store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.sessions = store;
        self
    }

    pub fn permissions(mut self, provider: Arc<dyn PermissionProvider>) -> Self {
        self.permissions = provider;
        self
    }

    pub fn error_sink(mut self, sink: Arc<dyn ErrorSink>) -> Self {
        self.error_sink = sink;
        self
    }

    pub fn settings(mut self, settings: DispatchSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Registers a generated help command listing every other command.
    pub fn help(mut self, trigger: impl Into<String>) -> Self {
        self.help_trigger = Some(trigger.into());
        self
    }

    pub fn build(self) -> Result<Dispatcher, BuildError> {
        let Self {
            mut registry,
            states,
            resolvers,
            middleware,
            sessions,
            permissions,
            error_sink,
            settings,
            help_trigger,
            errors,
        } = self;

        if let Some(err) = errors.into_iter().next() {
            return Err(err.into());
        }

        for descriptor in registry.descriptors().chain(states.descriptors()) {
            for (param, type_name) in descriptor.custom_types() {
                if !resolvers.contains(type_name) {
                    return Err(BuildError::UnknownResolver {
                        trigger: descriptor.trigger().to_string(),
                        param: param.to_string(),
                        type_name: type_name.to_string(),
                    });
                }
            }
        }

        if let Some(trigger) = help_trigger {
            let listing = help_listing(registry.descriptors());
            let help = move || {
                let listing = listing.clone();
                async move { listing }
            };
            registry.command(&trigger, HandlerDescriptor::builder(help).describe("Show this list"))?;
        }

        let resolvers = Arc::new(resolvers);
        let router = FsmRouter::new(states, resolvers.clone())
            .cancel_keywords(settings.cancel_keywords.iter().cloned())
            .cancel_message(settings.cancel_message.clone());

        let mut chain: Vec<Arc<dyn Middleware>> = vec![
            Arc::new(TracingMiddleware),
            Arc::new(FsmMiddleware::new(Arc::new(router))),
            Arc::new(
                PermissionMiddleware::new(permissions)
                    .denied_message(settings.permission_denied_message.clone()),
            ),
            Arc::new(CooldownMiddleware::new()),
        ];
        chain.extend(middleware);
        sort_chain(&mut chain);

        if let Some(username) = &settings.bot_username {
            registry = registry.bot_username(username.clone());
        }
        let registry = registry.build();

        info!(
            commands = registry.len(),
            middleware = chain.len(),
            "Dispatcher ready"
        );

        Ok(Dispatcher {
            registry,
            resolvers,
            chain,
            sessions,
            error_sink,
            settings,
            detached: TaskTracker::new(),
        })
    }
}

fn check_state_policies(
    descriptor: HandlerDescriptor,
) -> Result<HandlerDescriptor, DescriptorError> {
    let policy = if !descriptor.permissions().is_empty() {
        "permissions"
    } else if *descriptor.access() != (0..=u8::MAX) {
        "an access level range"
    } else if descriptor.rate_limit().is_some() {
        "a cooldown"
    } else {
        return Ok(descriptor);
    };
    Err(DescriptorError::StatePolicy {
        state: descriptor.trigger().to_string(),
        policy,
    })
}

fn help_listing<'a>(descriptors: impl Iterator<Item = &'a Arc<HandlerDescriptor>>) -> String {
    let mut lines: Vec<String> = descriptors
        .map(|d| match d.description() {
            Some(description) => format!("{} - {description}", d.usage()),
            None => d.usage().to_string(),
        })
        .collect();
    lines.sort();
    lines.join("\n")
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Routes events to handlers.
pub struct Dispatcher {
    registry: TriggerRegistry,
    resolvers: Arc<ResolverRegistry>,
    chain: Vec<Arc<dyn Middleware>>,
    sessions: Arc<dyn SessionStore>,
    error_sink: Arc<dyn ErrorSink>,
    settings: DispatchSettings,
    detached: TaskTracker,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn registry(&self) -> &TriggerRegistry {
        &self.registry
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    /// Dispatches one event to at most one handler.
    pub async fn dispatch(&self, event: BoxedEvent, bot: BoxedBot) -> DispatchOutcome {
        let mut ctx = Arc::new(DispatchContext::new(event, bot, self.sessions.clone()));
        let mut redirected = false;

        loop {
            let (result, trigger) = self.run_chain(&ctx).await;

            match result {
                DispatchResult::Redirect(target) => {
                    let from = ctx.text().unwrap_or_default().to_string();
                    if redirected || normalize(&target) == normalize(&from) {
                        let err = DispatchError::RedirectLoop { from, to: target };
                        return self.fail(&ctx, err, trigger.as_deref()).await;
                    }
                    debug!(
                        correlation_id = %ctx.correlation_id(),
                        from = %from,
                        to = %target,
                        "Redirecting"
                    );
                    redirected = true;
                    ctx = Arc::new(ctx.redirected(target));
                }
                DispatchResult::Error(err) => {
                    return self.fail(&ctx, err, trigger.as_deref()).await;
                }
                DispatchResult::Stop(message) => {
                    if let Some(message) = &message {
                        self.deliver(&ctx, message).await;
                    }
                    return match ctx.handled_by() {
                        Some(by) => outcome_for(by),
                        None => DispatchOutcome::Stopped { message },
                    };
                }
                DispatchResult::Continue => {
                    return match ctx.handled_by() {
                        Some(by) => outcome_for(by),
                        None => {
                            debug!(correlation_id = %ctx.correlation_id(), "No handler matched");
                            DispatchOutcome::NotMatched
                        }
                    };
                }
            }
        }
    }

    /// Stops accepting detached work and waits for spawned handlers.
    pub async fn wait_detached(&self) {
        self.detached.close();
        self.detached.wait().await;
    }

    async fn run_chain(&self, ctx: &Arc<DispatchContext>) -> (DispatchResult, Option<String>) {
        let route = ctx.text().and_then(|text| self.registry.find_match(text));
        let trigger = route.as_ref().map(|m| m.descriptor.trigger().to_string());

        let endpoint = CommandEndpoint {
            args: route.as_ref().map(|m| m.args).unwrap_or_default(),
            resolvers: &self.resolvers,
            detached: &self.detached,
            error_sink: &self.error_sink,
            error_message: &self.settings.error_message,
        };
        let next = Next::new(&self.chain, route.as_ref().map(|m| m.descriptor), &endpoint);

        let result = match AssertUnwindSafe(next.run(ctx)).catch_unwind().await {
            Ok(result) => result,
            Err(payload) => DispatchResult::Error(DispatchError::from_panic(payload)),
        };
        (result, trigger)
    }

    async fn fail(
        &self,
        ctx: &DispatchContext,
        error: DispatchError,
        trigger: Option<&str>,
    ) -> DispatchOutcome {
        let correlation_id = ctx.correlation_id();
        self.error_sink.report(ctx, &error, trigger);

        let message = format!("{} (ref: {correlation_id})", self.settings.error_message);
        self.deliver(ctx, &message).await;
        DispatchOutcome::Failed { correlation_id }
    }

    async fn deliver(&self, ctx: &DispatchContext, message: &str) {
        if let Err(e) = ctx.reply(message).await {
            warn!(
                correlation_id = %ctx.correlation_id(),
                chat_id = ctx.chat_id(),
                "Failed to deliver message: {e}"
            );
        }
    }
}

fn outcome_for(by: HandledBy) -> DispatchOutcome {
    match by {
        HandledBy::Command(trigger) => DispatchOutcome::Handled { trigger },
        HandledBy::Detached(trigger) => DispatchOutcome::Detached { trigger },
        HandledBy::State(state) => DispatchOutcome::StateHandled { state },
        HandledBy::Cancelled => DispatchOutcome::Cancelled,
    }
}

// ============================================================================
// Endpoint
// ============================================================================

/// Binds arguments and invokes the matched command handler.
struct CommandEndpoint<'a> {
    args: &'a str,
    resolvers: &'a ResolverRegistry,
    detached: &'a TaskTracker,
    error_sink: &'a Arc<dyn ErrorSink>,
    error_message: &'a str,
}

#[async_trait]
impl<'a> Endpoint for CommandEndpoint<'a> {
    async fn call(
        &self,
        ctx: &Arc<DispatchContext>,
        descriptor: Option<&Arc<HandlerDescriptor>>,
    ) -> DispatchResult {
        let Some(descriptor) = descriptor else {
            return DispatchResult::Continue;
        };

        let args = match bind(descriptor, self.args, self.resolvers) {
            Ok(args) => args,
            Err(err) if err.is_user_facing() => {
                debug!(trigger = descriptor.trigger(), "Rejected arguments: {err}");
                return DispatchResult::Stop(Some(crate::fsm::usage_message(&err, descriptor)));
            }
            Err(err) => return DispatchResult::Error(DispatchError::Binding(err)),
        };

        let trigger = descriptor.trigger().to_string();
        match descriptor.mode() {
            ExecutionMode::Sequential => {
                ctx.mark_handled(HandledBy::Command(trigger));
                (descriptor.handler())(ctx.clone(), args).await
            }
            ExecutionMode::Detached => {
                ctx.mark_handled(HandledBy::Detached(trigger.clone()));
                let handler = descriptor.handler().clone();
                let sink = self.error_sink.clone();
                let error_message = self.error_message.to_string();
                let ctx = ctx.clone();

                self.detached.spawn(
                    async move {
                        let result = match AssertUnwindSafe(handler(ctx.clone(), args))
                            .catch_unwind()
                            .await
                        {
                            Ok(result) => result,
                            Err(payload) => {
                                DispatchResult::Error(DispatchError::from_panic(payload))
                            }
                        };
                        finish_detached(&ctx, result, &trigger, sink.as_ref(), &error_message)
                            .await;
                    }
                    .instrument(Span::current()),
                );
                DispatchResult::Continue
            }
        }
    }
}

async fn finish_detached(
    ctx: &DispatchContext,
    result: DispatchResult,
    trigger: &str,
    sink: &dyn ErrorSink,
    error_message: &str,
) {
    let message = match result {
        DispatchResult::Continue | DispatchResult::Stop(None) => return,
        DispatchResult::Stop(Some(message)) => message,
        DispatchResult::Redirect(target) => {
            warn!(trigger, to = %target, "Detached handlers cannot redirect, ignoring");
            return;
        }
        DispatchResult::Error(err) => {
            sink.report(ctx, &err, Some(trigger));
            format!("{error_message} (ref: {})", ctx.correlation_id())
        }
    };
    if let Err(e) = ctx.reply(&message).await {
        warn!(correlation_id = %ctx.correlation_id(), "Failed to deliver message: {e}");
    }
}
