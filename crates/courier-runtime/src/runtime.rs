//! Runtime orchestration.
//!
//! The runtime ties the pieces together: events pulled from an
//! [`EventSource`] are queued on the per-actor [`Scheduler`] and dispatched
//! through the [`Dispatcher`], replying through one shared bot.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use courier_runtime::Runtime;
//!
//! let runtime = Runtime::builder()
//!     .config_file("config/courier.toml")
//!     .dispatcher(|d| d.command("/ping", HandlerDescriptor::builder(ping)))
//!     .build()?;
//!
//! runtime.run(events).await?;
//! ```

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use courier_core::{BoxedBot, BoxedEvent};
use courier_framework::{
    DispatchOutcome, Dispatcher, DispatcherBuilder, Scheduler, SchedulerError, TaskHandle,
};
use courier_transport::{ApiBot, ApiTransport, ResilientClient};

use crate::config::{ConfigLoader, CourierConfig, validate_config};
use crate::error::{RuntimeError, RuntimeResult};
use crate::logging;

/// Where inbound events come from.
///
/// Returning `None` means the source is exhausted and the runtime should
/// stop.
#[async_trait]
pub trait EventSource: Send {
    async fn next_event(&mut self) -> Option<BoxedEvent>;
}

#[async_trait]
impl EventSource for mpsc::Receiver<BoxedEvent> {
    async fn next_event(&mut self) -> Option<BoxedEvent> {
        self.recv().await
    }
}

#[async_trait]
impl EventSource for mpsc::UnboundedReceiver<BoxedEvent> {
    async fn next_event(&mut self) -> Option<BoxedEvent> {
        self.recv().await
    }
}

/// A configured dispatcher, scheduler and bot.
pub struct Runtime {
    config: CourierConfig,
    dispatcher: Arc<Dispatcher>,
    scheduler: Scheduler,
    bot: BoxedBot,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    pub fn config(&self) -> &CourierConfig {
        &self.config
    }

    pub fn dispatcher(&self) -> &Arc<Dispatcher> {
        &self.dispatcher
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn bot(&self) -> &BoxedBot {
        &self.bot
    }

    /// Queues one event behind earlier events of the same actor.
    ///
    /// The handle resolves to the dispatch outcome; dropping it leaves the
    /// event queued.
    pub async fn dispatch(
        &self,
        event: BoxedEvent,
    ) -> Result<TaskHandle<DispatchOutcome>, SchedulerError> {
        let actor_id = event.actor_id();
        let dispatcher = self.dispatcher.clone();
        let bot = self.bot.clone();

        self.scheduler
            .submit(actor_id, async move {
                let outcome = dispatcher.dispatch(event, bot).await;
                debug!(actor_id, ?outcome, "Event dispatched");
                outcome
            })
            .await
    }

    /// Runs until Ctrl+C, SIGTERM, or the source is exhausted.
    pub async fn run<S: EventSource>(&self, source: S) -> RuntimeResult<()> {
        info!("Courier runtime is now running. Press Ctrl+C to stop.");
        self.run_until(source, wait_for_shutdown()).await
    }

    /// Runs until `shutdown` completes or the source is exhausted, then
    /// drains every queued event.
    pub async fn run_until<S, F>(&self, mut source: S, shutdown: F) -> RuntimeResult<()>
    where
        S: EventSource,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                event = source.next_event() => {
                    let Some(event) = event else {
                        info!("Event source closed");
                        break;
                    };
                    // A blocked submit must not hide the shutdown signal.
                    tokio::select! {
                        _ = &mut shutdown => {
                            warn!("Shutdown requested while waiting for a queue slot, event dropped");
                            break;
                        }
                        submitted = self.dispatch(event) => {
                            if let Err(e) = submitted {
                                warn!(error = %e, "Event dropped");
                            }
                        }
                    }
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Stops accepting events and waits for queued and detached work.
    pub async fn shutdown(&self) {
        info!(pending = self.scheduler.pending(), "Stopping Courier runtime");
        self.scheduler.shutdown().await;
        self.dispatcher.wait_detached().await;
        info!("Runtime stopped");
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("bot", &self.bot.id())
            .field("scheduler", &self.scheduler)
            .finish_non_exhaustive()
    }
}

/// Waits for shutdown signals (Ctrl+C or SIGTERM).
pub async fn wait_for_shutdown() {
    #[cfg(unix)]
    {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c() => {}
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, shutting down");
                    }
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to register SIGTERM handler");
                ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    ctrl_c().await;
}

async fn ctrl_c() {
    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl+C, shutting down"),
        Err(e) => {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    }
}

// =============================================================================
// RuntimeBuilder
// =============================================================================

type Configure = Box<dyn FnOnce(DispatcherBuilder) -> DispatcherBuilder + Send>;

/// Builder for a [`Runtime`].
///
/// Without an explicit bot or transport, the bot talks HTTP to
/// `client.base_url` (requires the `http-client` feature).
pub struct RuntimeBuilder {
    config_loader: ConfigLoader,
    config: Option<CourierConfig>,
    configure: Vec<Configure>,
    bot: Option<BoxedBot>,
    transport: Option<Arc<dyn ApiTransport>>,
    init_logging: bool,
}

impl RuntimeBuilder {
    /// Creates a new runtime builder.
    pub fn new() -> Self {
        Self {
            config_loader: ConfigLoader::new(),
            config: None,
            configure: Vec::new(),
            bot: None,
            transport: None,
            init_logging: true,
        }
    }

    /// Sets a specific configuration file to load.
    pub fn config_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.file(path);
        self
    }

    /// Sets the configuration profile (e.g., "development", "production").
    pub fn profile(mut self, profile: impl Into<String>) -> Self {
        self.config_loader = self.config_loader.profile(profile.into());
        self
    }

    /// Adds a search path for configuration files.
    pub fn search_path<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config_loader = self.config_loader.search_path(path);
        self
    }

    /// Disables loading environment variables.
    pub fn without_env(mut self) -> Self {
        self.config_loader = self.config_loader.without_env();
        self
    }

    /// Merges additional configuration programmatically.
    pub fn merge(mut self, config: CourierConfig) -> Self {
        self.config_loader = self.config_loader.merge(config);
        self
    }

    /// Uses `config` as-is instead of loading configuration.
    pub fn config(mut self, config: CourierConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Registers handlers, resolvers or middleware.
    ///
    /// Runs after the configured dispatch settings and permissions are
    /// applied, so it can override them.
    pub fn dispatcher<F>(mut self, configure: F) -> Self
    where
        F: FnOnce(DispatcherBuilder) -> DispatcherBuilder + Send + 'static,
    {
        self.configure.push(Box::new(configure));
        self
    }

    /// Replies through `bot` instead of a configured API client.
    pub fn bot(mut self, bot: BoxedBot) -> Self {
        self.bot = Some(bot);
        self
    }

    /// Sends API calls through `transport`, wrapped in the configured
    /// rate limiting and retries.
    pub fn transport(mut self, transport: Arc<dyn ApiTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Leaves the global tracing subscriber alone.
    pub fn without_logging(mut self) -> Self {
        self.init_logging = false;
        self
    }

    /// Builds the runtime.
    pub fn build(self) -> RuntimeResult<Runtime> {
        let config = match self.config {
            Some(config) => config,
            None => self.config_loader.load()?,
        };
        validate_config(&config)?;

        if self.init_logging {
            logging::init_from_config(&config.logging);
        }

        let mut builder = Dispatcher::builder()
            .settings(config.dispatch.to_settings())
            .permissions(config.permissions.to_provider()?);
        for configure in self.configure {
            builder = configure(builder);
        }
        let dispatcher = Arc::new(builder.build()?);

        let bot = match (self.bot, self.transport) {
            (Some(bot), _) => bot,
            (None, Some(transport)) => api_bot(&config, transport)?,
            (None, None) => http_bot(&config)?,
        };

        let scheduler = Scheduler::new(config.scheduler.to_scheduler_config());
        info!(
            bot = bot.id(),
            workers = config.scheduler.workers,
            queue_capacity = config.scheduler.queue_capacity,
            "Runtime initialized"
        );

        Ok(Runtime {
            config,
            dispatcher,
            scheduler,
            bot,
        })
    }
}

impl Default for RuntimeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn api_bot(config: &CourierConfig, transport: Arc<dyn ApiTransport>) -> RuntimeResult<BoxedBot> {
    let client = ResilientClient::new(transport, config.client.to_client_config())?;
    let id = config
        .dispatch
        .bot_username
        .clone()
        .unwrap_or_else(|| "courier".to_string());
    Ok(Arc::new(ApiBot::new(id, Arc::new(client))))
}

#[cfg(feature = "http-client")]
fn http_bot(config: &CourierConfig) -> RuntimeResult<BoxedBot> {
    use courier_transport::HttpTransport;

    let Some(base_url) = &config.client.base_url else {
        return Err(RuntimeError::NoBot);
    };
    let timeout = config.client.to_client_config().timeout;
    let mut transport = HttpTransport::new(base_url, timeout)?;
    if let Some(token) = &config.client.access_token {
        transport = transport.with_access_token(token.clone());
    }
    api_bot(config, Arc::new(transport))
}

#[cfg(not(feature = "http-client"))]
fn http_bot(_config: &CourierConfig) -> RuntimeResult<BoxedBot> {
    Err(RuntimeError::NoBot)
}
