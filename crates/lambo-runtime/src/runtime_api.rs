//! HTTP side of the Runtime API: the endpoints a function process polls for
//! work and reports results to.

use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{Method, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Router;
use lambo_core::{InvokeError, ResponseEnvelope};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

use crate::broker::Broker;
use crate::config::{DeadlineMode, RuntimeConfig};

pub const DEFAULT_API_VERSION: &str = "2018-06-01";

pub const HEADER_REQUEST_ID: &str = "lambda-runtime-aws-request-id";
pub const HEADER_DEADLINE_MS: &str = "lambda-runtime-deadline-ms";
pub const HEADER_FUNCTION_ARN: &str = "lambda-runtime-invoked-function-arn";

#[derive(Clone)]
struct ApiState {
    broker: Arc<Broker>,
    deadline: DeadlineMode,
    max_duration: Duration,
    function_arn: String,
    shutdown: CancellationToken,
}

/// The Runtime API emulator.
///
/// | Method | Path | |
/// |---|---|---|
/// | GET | `/{version}/runtime/invocation/next` | next job |
/// | POST | `/{version}/runtime/invocation/{id}/response` | success |
/// | POST | `/{version}/runtime/invocation/{id}/error` | failure |
/// | POST | `/{version}/runtime/init/error` | initialisation failure |
pub struct RuntimeApi {
    state: ApiState,
    api_version: String,
    max_payload_bytes: usize,
}

impl RuntimeApi {
    pub fn new(
        broker: Arc<Broker>,
        config: &RuntimeConfig,
        function_name: &str,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            state: ApiState {
                broker,
                deadline: config.deadline,
                max_duration: config.max_duration,
                function_arn: format!(
                    "arn:aws:lambda:{}:000000000000:function:{function_name}",
                    config.region
                ),
                shutdown,
            },
            api_version: config.api_version.clone(),
            max_payload_bytes: config.max_payload_bytes,
        }
    }

    pub fn router(&self) -> Router {
        let invocation = format!("/{}/runtime/invocation", self.api_version);
        Router::new()
            .route(&format!("{invocation}/next"), get(next_invocation))
            .route(&format!("{invocation}/{{id}}/{{outcome}}"), post(report_outcome))
            .route(&format!("/{}/runtime/init/error", self.api_version), post(init_error))
            .fallback(unmatched)
            .method_not_allowed_fallback(wrong_method)
            .layer(DefaultBodyLimit::max(self.max_payload_bytes))
            .with_state(self.state.clone())
    }

    /// Serve on `listener` until the shutdown token is cancelled.
    ///
    /// Cancelling also releases any poll that is still waiting for work.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        let shutdown = self.state.shutdown.clone();
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await?;
        tracing::info!("Runtime API stopped");
        Ok(())
    }
}

async fn next_invocation(State(state): State<ApiState>) -> Response {
    tracing::debug!("Function connected, waiting for an invocation");

    let invocation = tokio::select! {
        invocation = state.broker.next() => invocation,
        () = state.shutdown.cancelled() => None,
    };
    let Some(invocation) = invocation else {
        return StatusCode::SERVICE_UNAVAILABLE.into_response();
    };

    let payload = match invocation.event.to_payload() {
        Ok(payload) => payload,
        Err(e) => {
            state.broker.resolve(
                &invocation.id,
                Err(InvokeError::Serialization(e.to_string())),
            );
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    tracing::debug!(id = %invocation.id, bytes = payload.len(), "Sending invocation to function");
    (
        StatusCode::OK,
        [
            ("content-type", "application/json".to_string()),
            (HEADER_REQUEST_ID, invocation.id),
            (HEADER_DEADLINE_MS, deadline_header(state.deadline, state.max_duration)),
            (HEADER_FUNCTION_ARN, state.function_arn.clone()),
        ],
        payload,
    )
        .into_response()
}

async fn report_outcome(
    State(state): State<ApiState>,
    Path((id, outcome)): Path<(String, String)>,
    body: Result<Bytes, BytesRejection>,
) -> StatusCode {
    if outcome != "response" && outcome != "error" {
        return StatusCode::NOT_FOUND;
    }

    let body = match body {
        Ok(body) => body,
        Err(e) => {
            state.broker.resolve(
                &id,
                Err(InvokeError::Deserialization(e.body_text())),
            );
            return StatusCode::INTERNAL_SERVER_ERROR;
        }
    };

    if outcome == "response" {
        handle_response(&state.broker, &id, &body)
    } else {
        handle_error(&state.broker, &id, &body)
    }
}

fn handle_response(broker: &Broker, id: &str, body: &[u8]) -> StatusCode {
    tracing::debug!(id, "Received success report");

    let Some(kind) = broker.kind_of(id) else {
        tracing::warn!(id, "Success report for unknown invocation ignored");
        return StatusCode::ACCEPTED;
    };

    match ResponseEnvelope::from_payload(kind, body) {
        Ok(response) => {
            broker.resolve(id, Ok(response));
            StatusCode::ACCEPTED
        }
        Err(e) => {
            broker.resolve(id, Err(InvokeError::Deserialization(e.to_string())));
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

fn handle_error(broker: &Broker, id: &str, body: &[u8]) -> StatusCode {
    tracing::debug!(id, "Received error report");
    let message = String::from_utf8_lossy(body).into_owned();
    broker.resolve(id, Err(InvokeError::Function(message)));
    StatusCode::ACCEPTED
}

async fn init_error(body: Bytes) -> StatusCode {
    tracing::error!(
        report = %String::from_utf8_lossy(&body),
        "Function reported an initialisation error"
    );
    StatusCode::ACCEPTED
}

async fn unmatched(uri: Uri) -> StatusCode {
    let path = uri.path();
    let Some((_, rest)) = path.split_once("/invocation/") else {
        tracing::debug!(%uri, "Unexpected request");
        return StatusCode::NOT_FOUND;
    };

    if rest.split('/').count() != 2 {
        tracing::debug!(%uri, "Malformed invocation path");
        return StatusCode::BAD_REQUEST;
    }
    StatusCode::NOT_FOUND
}

async fn wrong_method(method: Method, uri: Uri) -> StatusCode {
    tracing::debug!(%method, %uri, "Unexpected request");
    StatusCode::NOT_FOUND
}

fn deadline_header(mode: DeadlineMode, max_duration: Duration) -> String {
    let budget = i64::try_from(max_duration.as_millis()).unwrap_or(i64::MAX);
    match mode {
        DeadlineMode::Absolute => chrono::Utc::now()
            .timestamp_millis()
            .saturating_add(budget)
            .to_string(),
        DeadlineMode::Relative => budget.to_string(),
    }
}
