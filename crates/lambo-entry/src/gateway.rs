use std::sync::Arc;

use axum::Router;
use axum::extract::{Request, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lambo_core::{EventEnvelope, Invoker};

use crate::convert::{gateway_request_from_http, render_gateway_response};

/// Every request, whatever its method or path, becomes one gateway-shaped
/// invocation.
pub fn router(invoker: Arc<dyn Invoker>) -> Router {
    Router::new().fallback(handle).with_state(invoker)
}

async fn handle(State(invoker): State<Arc<dyn Invoker>>, request: Request) -> Response {
    tracing::debug!(method = %request.method(), uri = %request.uri(), "Request received");

    let gateway = match gateway_request_from_http(request).await {
        Ok(gateway) => gateway,
        Err(rejection) => return rejection,
    };

    tracing::debug!("Forwarding request to function");
    let response = match invoker.invoke(EventEnvelope::Gateway(gateway)).await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(error = %e, "Invocation failed");
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    match response.into_gateway() {
        Ok(response) => {
            tracing::debug!(status = response.status_code, "Invocation succeeded");
            render_gateway_response(response)
        }
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
