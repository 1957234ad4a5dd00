//! Local stand-in for a serverless function runtime.
//!
//! [`Supervisor`] starts the function executable with
//! `AWS_LAMBDA_RUNTIME_API` pointing at a [`RuntimeApi`] on an ephemeral
//! port. Front ends call [`Broker::invoke`]; the broker queues the event until
//! the function polls for it and hands the function's reported result back to
//! the caller.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lambo_core::EventEnvelope;
//! use lambo_runtime::{Broker, LaunchOptions, RuntimeConfig, Supervisor};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = RuntimeConfig::default();
//! let broker = Arc::new(Broker::new(&config));
//! let mut supervisor =
//!     Supervisor::launch(LaunchOptions::new("./bootstrap"), broker.clone(), &config).await?;
//!
//! let response = broker
//!     .invoke(EventEnvelope::Opaque(serde_json::json!({"hello": "world"})))
//!     .await?;
//! println!("{response:?}");
//!
//! supervisor.close().await?;
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod error;
pub mod runtime_api;
pub mod supervisor;

pub use broker::{Broker, Invocation, InvocationResult};
pub use config::{DeadlineMode, RuntimeConfig, parse_duration};
pub use error::LaunchError;
pub use runtime_api::RuntimeApi;
pub use supervisor::{LaunchOptions, Supervisor, validate_executable};
