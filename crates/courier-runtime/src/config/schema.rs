//! Configuration schema definitions.

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use courier_framework::{
    ActorPermissions, Backpressure, DispatchSettings, SchedulerConfig, StaticPermissions,
};
use courier_transport::{ClientConfig, RetryConfig};

use super::error::{ConfigError, ConfigResult};

/// Root configuration structure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub logging: LoggingConfig,
    pub client: ClientSection,
    pub scheduler: SchedulerSection,
    pub dispatch: DispatchSection,
    pub permissions: PermissionsSection,
}

// =============================================================================
// Logging
// =============================================================================

/// Log verbosity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }

    pub fn to_tracing_level(self) -> tracing::Level {
        match self {
            Self::Trace => tracing::Level::TRACE,
            Self::Debug => tracing::Level::DEBUG,
            Self::Info => tracing::Level::INFO,
            Self::Warn => tracing::Level::WARN,
            Self::Error => tracing::Level::ERROR,
        }
    }
}

impl std::fmt::Display for LogLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line format of log output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Full,
    Pretty,
    /// Requires the `json-log` feature.
    Json,
}

/// Where log lines go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogOutput {
    #[default]
    Stdout,
    Stderr,
    File,
}

/// Rotation of the log file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Never,
    Hourly,
    Daily,
}

/// Which span lifecycle events are logged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpanEventConfig {
    pub new: bool,
    pub enter: bool,
    pub exit: bool,
    pub close: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
    pub output: LogOutput,
    /// Log file, used with `output = "file"`.
    pub file_path: Option<PathBuf>,
    pub rotation: LogRotation,
    /// Per-module levels, e.g. `courier_transport = "debug"`.
    pub filters: HashMap<String, LogLevel>,
    pub span_events: SpanEventConfig,
    pub thread_ids: bool,
    /// Include file and line of each event.
    pub file_location: bool,
}

// =============================================================================
// Client
// =============================================================================

/// Outbound API client settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSection {
    /// Base URL calls are posted under, as `{base_url}/{method}`.
    pub base_url: Option<String>,
    pub access_token: Option<String>,
    /// Read timeout of one attempt, in milliseconds.
    pub timeout_ms: u64,
    pub rate_limit: RateLimitSection,
    pub retry: RetrySection,
}

impl Default for ClientSection {
    fn default() -> Self {
        Self {
            base_url: None,
            access_token: None,
            timeout_ms: 30_000,
            rate_limit: RateLimitSection::default(),
            retry: RetrySection::default(),
        }
    }
}

impl ClientSection {
    pub fn to_client_config(&self) -> ClientConfig {
        ClientConfig {
            timeout: Duration::from_millis(self.timeout_ms),
            rate_limit_capacity: self.rate_limit.capacity,
            rate_limit_period: Duration::from_millis(self.rate_limit.period_ms),
            retry: self.retry.to_retry_config(),
        }
    }
}

/// Token bucket refilled to `capacity` every `period_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitSection {
    pub capacity: u32,
    pub period_ms: u64,
}

impl Default for RateLimitSection {
    fn default() -> Self {
        Self {
            capacity: 30,
            period_ms: 1000,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    /// Maximum number of retries after a transport failure.
    pub max_retries: u32,
    /// Initial delay between retries in milliseconds.
    pub initial_delay_ms: u64,
    /// Maximum delay between retries in milliseconds.
    pub max_delay_ms: u64,
    /// Exponential backoff multiplier.
    pub backoff_multiplier: f64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay_ms: 500,
            max_delay_ms: 30_000,
            backoff_multiplier: 2.0,
        }
    }
}

impl RetrySection {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            multiplier: self.backoff_multiplier,
        }
    }
}

// =============================================================================
// Scheduler
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Events processed at once, across all actors.
    pub workers: usize,
    /// Events waiting to start before back-pressure applies.
    pub queue_capacity: usize,
    pub backpressure: Backpressure,
}

impl Default for SchedulerSection {
    fn default() -> Self {
        let defaults = SchedulerConfig::default();
        Self {
            workers: defaults.workers,
            queue_capacity: defaults.queue_capacity,
            backpressure: defaults.backpressure,
        }
    }
}

impl SchedulerSection {
    pub fn to_scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            workers: self.workers,
            queue_capacity: self.queue_capacity,
            backpressure: self.backpressure,
        }
    }
}

// =============================================================================
// Dispatch
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchSection {
    /// Accept `/command@name` addressed to this bot only.
    pub bot_username: Option<String>,
    pub cancel_keywords: Vec<String>,
    pub cancel_message: String,
    pub error_message: String,
    pub permission_denied_message: String,
}

impl Default for DispatchSection {
    fn default() -> Self {
        let defaults = DispatchSettings::default();
        Self {
            bot_username: defaults.bot_username,
            cancel_keywords: defaults.cancel_keywords,
            cancel_message: defaults.cancel_message,
            error_message: defaults.error_message,
            permission_denied_message: defaults.permission_denied_message,
        }
    }
}

impl DispatchSection {
    pub fn to_settings(&self) -> DispatchSettings {
        DispatchSettings {
            bot_username: self.bot_username.clone(),
            cancel_keywords: self.cancel_keywords.clone(),
            cancel_message: self.cancel_message.clone(),
            error_message: self.error_message.clone(),
            permission_denied_message: self.permission_denied_message.clone(),
        }
    }
}

// =============================================================================
// Permissions
// =============================================================================

/// Static permission table.
///
/// ```toml
/// [permissions.default]
/// level = 0
///
/// [permissions.actors.1001]
/// level = 10
/// permissions = ["*"]
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PermissionsSection {
    pub default: ActorPermissions,
    /// Keyed by actor id.
    pub actors: BTreeMap<String, ActorPermissions>,
}

impl PermissionsSection {
    pub fn to_provider(&self) -> ConfigResult<Arc<StaticPermissions>> {
        let mut provider = StaticPermissions::new(self.default.clone());
        for (actor, permissions) in &self.actors {
            let actor_id = actor.trim().parse().map_err(|_| {
                ConfigError::validation(format!(
                    "permissions.actors key `{actor}` is not an actor id"
                ))
            })?;
            provider = provider.with_actor(actor_id, permissions.clone());
        }
        Ok(Arc::new(provider))
    }
}
