//! Runtime error types.

use thiserror::Error;

use courier_framework::{BuildError, SchedulerError};
use courier_transport::ClientError;

use crate::config::ConfigError;

/// Errors that can occur while building or running the runtime.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Configuration could not be loaded or is invalid.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The dispatcher rejected its handlers or resolvers.
    #[error("Failed to build dispatcher: {0}")]
    Build(#[from] BuildError),

    /// The API client could not be created.
    #[error("Failed to build API client: {0}")]
    Client(#[from] ClientError),

    /// Neither a bot, a transport nor `client.base_url` was provided.
    #[error("No bot configured: set client.base_url or provide a bot to the runtime builder")]
    NoBot,

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
