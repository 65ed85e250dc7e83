//! Configuration for the Courier runtime.
//!
//! Settings are layered with figment (defaults, files, `COURIER_*` env
//! vars) into a [`CourierConfig`], then checked by [`validate_config`].

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use schema::{
    ClientSection, CourierConfig, DispatchSection, LogFormat, LogLevel, LogOutput, LogRotation,
    LoggingConfig, PermissionsSection, RateLimitSection, RetrySection, SchedulerSection,
    SpanEventConfig,
};
pub use validation::validate_config;
