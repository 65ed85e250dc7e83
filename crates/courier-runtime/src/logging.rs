//! Logging setup over `tracing-subscriber`.
//!
//! The runtime builder installs a subscriber from [`LoggingConfig`]. The
//! `dispatch` span (one per event) and the `api_call` span (one per outbound
//! call) carry `correlation_id`, `actor_id` and `method`, so their lifecycle
//! events are worth enabling when tracing a slow conversation:
//!
//! ```toml
//! [logging]
//! level = "info"
//! format = "json"
//! span_events = { close = true }
//!
//! [logging.filters]
//! courier_transport = "debug"
//! ```
//!
//! `RUST_LOG`, when set, replaces `level`; `filters` still apply on top.

use std::ffi::OsStr;
use std::path::Path;

use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::Registry;
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::config::{LogFormat, LogOutput, LogRotation, LoggingConfig, SpanEventConfig};

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync>;

/// Installs the global subscriber described by `config`.
///
/// Does nothing if a global subscriber is already installed.
pub fn init_from_config(config: &LoggingConfig) {
    let _ = LoggingBuilder::from_config(config).try_init();
}

/// Builds a subscriber from a [`LoggingConfig`] plus extra filter directives.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    config: LoggingConfig,
    extra_directives: Vec<String>,
}

impl LoggingBuilder {
    pub fn from_config(config: &LoggingConfig) -> Self {
        Self {
            config: config.clone(),
            extra_directives: Vec::new(),
        }
    }

    /// Adds a filter directive such as `courier_framework::scheduler=trace`.
    pub fn directive(mut self, directive: impl Into<String>) -> Self {
        self.extra_directives.push(directive.into());
        self
    }

    /// Per-module directives, configured ones sorted by module first.
    fn directives(&self) -> Vec<String> {
        let mut configured: Vec<String> = self
            .config
            .filters
            .iter()
            .map(|(module, level)| format!("{module}={level}"))
            .collect();
        configured.sort();
        configured.extend(self.extra_directives.iter().cloned());
        configured
    }

    fn filter(&self) -> EnvFilter {
        let mut filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(self.config.level.as_str()));
        for directive in self.directives() {
            if let Ok(d) = directive.parse() {
                filter = filter.add_directive(d);
            }
        }
        filter
    }

    fn writer(&self) -> BoxMakeWriter {
        match (self.config.output, &self.config.file_path) {
            (LogOutput::Stdout, _) => BoxMakeWriter::new(std::io::stdout),
            (LogOutput::Stderr, _) => BoxMakeWriter::new(std::io::stderr),
            (LogOutput::File, Some(path)) => {
                let directory = path.parent().unwrap_or_else(|| Path::new("."));
                let file_name = path
                    .file_name()
                    .unwrap_or_else(|| OsStr::new("courier.log"));
                let appender = match self.config.rotation {
                    LogRotation::Never => tracing_appender::rolling::never(directory, file_name),
                    LogRotation::Hourly => tracing_appender::rolling::hourly(directory, file_name),
                    LogRotation::Daily => tracing_appender::rolling::daily(directory, file_name),
                };
                BoxMakeWriter::new(appender)
            }
            // Rejected by config validation; only reachable when built by hand.
            (LogOutput::File, None) => BoxMakeWriter::new(std::io::stderr),
        }
    }

    fn layer(&self) -> BoxedLayer {
        let spans = span_events(&self.config.span_events);
        let writer = self.writer();
        let config = &self.config;

        match config.format {
            #[cfg(feature = "json-log")]
            LogFormat::Json => fmt::layer()
                .json()
                .with_span_events(spans)
                .with_current_span(true)
                .with_writer(writer)
                .boxed(),
            // Plain text without the `json-log` feature.
            #[cfg(not(feature = "json-log"))]
            LogFormat::Json => fmt::layer()
                .with_span_events(spans)
                .with_writer(writer)
                .boxed(),
            LogFormat::Compact => fmt::layer()
                .compact()
                .with_span_events(spans)
                .with_thread_ids(config.thread_ids)
                .with_file(config.file_location)
                .with_line_number(config.file_location)
                .with_writer(writer)
                .boxed(),
            LogFormat::Full => fmt::layer()
                .with_span_events(spans)
                .with_thread_ids(config.thread_ids)
                .with_file(config.file_location)
                .with_line_number(config.file_location)
                .with_writer(writer)
                .boxed(),
            LogFormat::Pretty => fmt::layer()
                .pretty()
                .with_span_events(spans)
                .with_thread_ids(config.thread_ids)
                .with_file(config.file_location)
                .with_line_number(config.file_location)
                .with_writer(writer)
                .boxed(),
        }
    }

    /// Installs the subscriber globally.
    pub fn try_init(self) -> Result<(), TryInitError> {
        tracing_subscriber::registry()
            .with(self.layer())
            .with(self.filter())
            .try_init()
    }
}

fn span_events(config: &SpanEventConfig) -> FmtSpan {
    [
        (config.new, FmtSpan::NEW),
        (config.enter, FmtSpan::ENTER),
        (config.exit, FmtSpan::EXIT),
        (config.close, FmtSpan::CLOSE),
    ]
    .into_iter()
    .filter(|(enabled, _)| *enabled)
    .fold(FmtSpan::NONE, |acc, (_, flag)| acc | flag)
}
