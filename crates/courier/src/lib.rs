//! # Courier
//!
//! A type-safe command dispatch framework for chat bots.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌───────────┐     ┌──────────────────────────────┐     ┌────────────┐
//! │ EventSource │────▶│ Scheduler │────▶│ Dispatcher                   │────▶│ Handler    │
//! │ (front door)│     │ per actor │     │ middleware ─▶ fsm ─▶ routing │     │ (bound     │
//! └─────────────┘     └───────────┘     └──────────────────────────────┘     │  args)     │
//!                                                                            └─────┬──────┘
//!                                                       ResilientClient ◀──────────┘
//!                                                (rate limit, retry, multipart)
//! ```
//!
//! - **Scheduler**: events of one actor run in order, different actors in parallel
//! - **Dispatcher**: runs the middleware chain, conversation states and the
//!   longest-match trigger registry
//! - **Handlers**: plain async functions whose parameters are bound from the
//!   message text or injected from the context
//! - **ResilientClient**: outbound API calls with a shared token bucket,
//!   backoff on transport failures and `attach://` file uploads
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use courier::prelude::*;
//!
//! async fn pay(name: String, amount: i64) -> String {
//!     format!("Paid {amount} to {name}")
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let (tx, rx) = tokio::sync::mpsc::channel(256);
//!     spawn_front_door(tx);
//!
//!     Runtime::builder()
//!         .dispatcher(|d| {
//!             d.command(
//!                 "/pay",
//!                 HandlerDescriptor::builder(pay)
//!                     .param(ParamSpec::string("name"))
//!                     .param(ParamSpec::int("amount")),
//!             )
//!         })
//!         .build()?
//!         .run(rx)
//!         .await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: load `courier.toml` (default)
//! - `yaml-config`: load `courier.yaml`
//! - `json-log`: JSON log lines
//! - `http-client`: reqwest-backed API transport

pub use courier_core as core;
pub use courier_framework as framework;
pub use courier_runtime as runtime;
pub use courier_transport as transport;

/// Prelude module for convenient imports.
///
/// ```rust,ignore
/// use courier::prelude::*;
/// ```
pub mod prelude {
    // Runtime - main entry point
    pub use courier_runtime::{CourierConfig, EventSource, Runtime, RuntimeBuilder};

    // Handlers and routing
    pub use courier_framework::prelude::*;
    pub use courier_framework::{
        ArgResolver, ArgValue, DispatcherBuilder, Middleware, Next, StateRegistry,
    };

    // Events and bots
    pub use courier_core::prelude::*;

    // Outbound calls
    pub use courier_transport::{ApiRequest, InputFile, ResilientClient};

    // Logging
    pub use courier_runtime::prelude::*;
}
