//! Courier Runtime - wiring for the Courier bot framework.
//!
//! This crate provides:
//! - Layered configuration (`CourierConfig`, `ConfigLoader`)
//! - Logging setup from configuration (`LoggingBuilder`)
//! - The `Runtime`, which feeds events from an `EventSource` through the
//!   per-actor scheduler into the dispatcher
//!
//! ```ignore
//! use courier_runtime::Runtime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (tx, rx) = tokio::sync::mpsc::channel(256);
//!     spawn_front_door(tx);
//!
//!     Runtime::builder()
//!         .dispatcher(|d| d.command("/ping", HandlerDescriptor::builder(ping)))
//!         .build()?
//!         .run(rx)
//!         .await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

// Re-exports
pub use config::{ConfigError, ConfigLoader, ConfigResult, CourierConfig};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::LoggingBuilder;
pub use runtime::{EventSource, Runtime, RuntimeBuilder, wait_for_shutdown};

// Re-export tracing for use by other crates
pub use tracing;
pub use tracing_subscriber;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use tracing::{Level, debug, error, info, instrument, span, trace, warn};
}
