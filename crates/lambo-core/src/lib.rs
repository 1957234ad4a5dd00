//! Shared model for running a function locally.
//!
//! Front ends turn real requests into an [`EventEnvelope`], hand it to an
//! [`Invoker`], and render the [`ResponseEnvelope`] they get back. The
//! runtime crate provides the invoker that talks to the function process.

pub mod envelope;
pub mod error;
pub mod gateway;
pub mod invoke;

pub use envelope::{EnvelopeKind, EventEnvelope, ResponseEnvelope};
pub use error::InvokeError;
pub use gateway::{GatewayRequest, GatewayResponse, RequestContext};
pub use invoke::Invoker;
