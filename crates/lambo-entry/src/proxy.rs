use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::{Json, Router};
use lambo_core::{EventEnvelope, Invoker};

/// Trigger events arrive already wrapped as
/// `{"event_type": "...", "event_body": ...}` and are passed through as is.
pub fn router(invoker: Arc<dyn Invoker>) -> Router {
    Router::new().fallback(handle).with_state(invoker)
}

async fn handle(State(invoker): State<Arc<dyn Invoker>>, body: Bytes) -> Response {
    let event: EventEnvelope = match serde_json::from_slice(&body) {
        Ok(event) => event,
        Err(e) => {
            tracing::debug!(error = %e, "Rejected malformed trigger event");
            return (StatusCode::BAD_REQUEST, format!("invalid trigger event: {e}")).into_response();
        }
    };

    tracing::debug!(kind = %event.kind(), "Forwarding event to function");
    match invoker.invoke(event).await {
        Ok(response) => {
            tracing::debug!(?response, "Invocation succeeded");
            Json(response).into_response()
        }
        Err(e) => {
            tracing::debug!(error = %e, "Invocation failed");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}
