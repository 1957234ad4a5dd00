//! Front ends that feed real requests into a function.
//!
//! - `gateway`: behaves like an API gateway in proxy mode; any HTTP request
//!   becomes a gateway-shaped event and the function's response is rendered
//!   back as HTTP.
//! - `proxy`: accepts pre-built trigger events as JSON and returns the
//!   function's result as JSON.

pub mod convert;
pub mod error;
pub mod gateway;
pub mod proxy;

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use axum::Router;
use lambo_core::Invoker;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::EntryError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Gateway,
    Proxy,
}

impl FromStr for EntryKind {
    type Err = EntryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gateway" => Ok(EntryKind::Gateway),
            "proxy" => Ok(EntryKind::Proxy),
            other => Err(EntryError::UnknownKind(other.to_string())),
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryKind::Gateway => f.write_str("gateway"),
            EntryKind::Proxy => f.write_str("proxy"),
        }
    }
}

/// A front end bound to an invoker.
pub struct EntryPoint {
    kind: EntryKind,
    invoker: Arc<dyn Invoker>,
}

impl EntryPoint {
    pub fn new(kind: EntryKind, invoker: Arc<dyn Invoker>) -> Self {
        Self { kind, invoker }
    }

    pub fn kind(&self) -> EntryKind {
        self.kind
    }

    pub fn router(&self) -> Router {
        match self.kind {
            EntryKind::Gateway => gateway::router(self.invoker.clone()),
            EntryKind::Proxy => proxy::router(self.invoker.clone()),
        }
    }

    pub async fn listen_and_serve(
        self,
        addr: &str,
        shutdown: CancellationToken,
    ) -> Result<(), EntryError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| EntryError::Bind {
                addr: addr.to_string(),
                source,
            })?;
        self.serve(listener, shutdown).await
    }

    /// Serve until `shutdown` is cancelled.
    pub async fn serve(
        self,
        listener: TcpListener,
        shutdown: CancellationToken,
    ) -> Result<(), EntryError> {
        if let Ok(addr) = listener.local_addr() {
            tracing::info!(kind = %self.kind, "Listening at http://{addr}");
        }
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(EntryError::Serve)
    }
}
