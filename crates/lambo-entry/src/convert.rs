//! Conversions between plain HTTP and the gateway envelope shapes.

use std::net::SocketAddr;

use axum::body::Body;
use axum::extract::{ConnectInfo, Query, Request};
use axum::http::{HeaderName, HeaderValue, StatusCode, header};
use axum::response::{IntoResponse, Response};
use lambo_core::GatewayRequest;
use lambo_core::GatewayResponse;

/// Largest request body a front end accepts.
pub const MAX_BODY_BYTES: usize = 6 * 1024 * 1024;

/// Build the gateway-shaped event for an incoming HTTP request.
///
/// The path is kept exactly as received, percent-encoding included.
pub async fn gateway_request_from_http(request: Request) -> Result<GatewayRequest, Response> {
    let (parts, body) = request.into_parts();

    let body = axum::body::to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|e| (StatusCode::PAYLOAD_TOO_LARGE, e.to_string()).into_response())?;

    let query = Query::<Vec<(String, String)>>::try_from_uri(&parts.uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();

    let headers = parts.headers.iter().map(|(name, value)| {
        (
            name.as_str().to_owned(),
            String::from_utf8_lossy(value.as_bytes()).into_owned(),
        )
    });

    let mut gateway = GatewayRequest::new(parts.method.as_str(), parts.uri.path())
        .with_headers(headers)
        .with_query(query)
        .with_body(&body)
        .with_request_id(uuid::Uuid::new_v4().to_string());

    gateway.request_context.stage = "local".into();
    gateway.request_context.request_time_epoch = chrono::Utc::now().timestamp_millis();
    if let Some(ConnectInfo(addr)) = parts.extensions.get::<ConnectInfo<SocketAddr>>() {
        gateway.request_context.identity.source_ip = addr.ip().to_string();
    }
    if let Some(agent) = parts.headers.get(header::USER_AGENT) {
        gateway.request_context.identity.user_agent =
            String::from_utf8_lossy(agent.as_bytes()).into_owned();
    }

    Ok(gateway)
}

/// Render a function's gateway response as a real HTTP response.
///
/// A 204 or an empty body writes no body. Headers that are not valid HTTP
/// are dropped.
pub fn render_gateway_response(response: GatewayResponse) -> Response {
    let Ok(status) = StatusCode::from_u16(response.status_code) else {
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("function returned invalid status code {}", response.status_code),
        )
            .into_response();
    };

    let body = if status == StatusCode::NO_CONTENT || response.body.is_empty() {
        Body::empty()
    } else {
        Body::from(response.body_bytes())
    };

    let mut rendered = Response::new(body);
    *rendered.status_mut() = status;

    let headers = rendered.headers_mut();
    for (name, values) in &response.multi_value_headers {
        for value in values {
            if let Some((name, value)) = header_pair(name, value) {
                headers.append(name, value);
            }
        }
    }
    for (name, value) in &response.headers {
        if let Some((name, value)) = header_pair(name, value) {
            headers.insert(name, value);
        }
    }

    rendered
}

fn header_pair(name: &str, value: &str) -> Option<(HeaderName, HeaderValue)> {
    match (HeaderName::try_from(name), HeaderValue::try_from(value)) {
        (Ok(name), Ok(value)) => Some((name, value)),
        _ => {
            tracing::warn!(name, "Dropping invalid response header");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;

    async fn convert(request: Request) -> GatewayRequest {
        gateway_request_from_http(request).await.unwrap()
    }

    async fn body_of(response: Response) -> Vec<u8> {
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec()
    }

    #[tokio::test]
    async fn path_keeps_its_encoding() {
        let request = Request::builder()
            .uri("http://blah/blah%2fhello")
            .body(Body::empty())
            .unwrap();
        assert_eq!(convert(request).await.path, "/blah%2fhello");
    }

    #[tokio::test]
    async fn method_headers_and_query_are_carried() {
        let request = Request::builder()
            .method("PUT")
            .uri("/items?k=a&k=b&q=one%20two")
            .header("x-trace", "1")
            .header("user-agent", "tests")
            .body(Body::from("payload"))
            .unwrap();

        let gateway = convert(request).await;
        assert_eq!(gateway.http_method, "PUT");
        assert_eq!(gateway.path, "/items");
        assert_eq!(gateway.headers["x-trace"], "1");
        assert_eq!(gateway.query_string_parameters["q"], "one two");
        assert_eq!(gateway.query_string_parameters["k[1]"], "b");
        assert_eq!(gateway.multi_value_query_string_parameters["k"], vec!["a", "b"]);
        assert_eq!(gateway.body, "payload");
        assert!(!gateway.is_base64_encoded);
        assert_eq!(gateway.request_context.stage, "local");
        assert_eq!(gateway.request_context.identity.user_agent, "tests");
        assert!(!gateway.request_context.request_id.is_empty());
    }

    #[tokio::test]
    async fn binary_body_is_base64_encoded() {
        let request = Request::builder()
            .uri("/")
            .body(Body::from(vec![0u8, 159, 146, 150]))
            .unwrap();
        let gateway = convert(request).await;
        assert!(gateway.is_base64_encoded);
        assert_eq!(gateway.body, "AJ+Slg==");
    }

    #[tokio::test]
    async fn renders_status_headers_and_body() {
        let response = render_gateway_response(GatewayResponse {
            status_code: 201,
            headers: BTreeMap::from([("x-served-by".to_string(), "lambo".to_string())]),
            body: "created".into(),
            ..GatewayResponse::default()
        });
        assert_eq!(response.status(), StatusCode::CREATED);
        assert_eq!(response.headers()["x-served-by"], "lambo");
        assert_eq!(body_of(response).await, b"created");
    }

    #[tokio::test]
    async fn renders_base64_body_as_bytes() {
        let response = render_gateway_response(GatewayResponse {
            body: "AJ+Slg==".into(),
            is_base64_encoded: true,
            ..GatewayResponse::default()
        });
        assert_eq!(body_of(response).await, vec![0u8, 159, 146, 150]);
    }

    #[tokio::test]
    async fn no_content_has_no_body() {
        let response = render_gateway_response(GatewayResponse {
            status_code: 204,
            body: "ignored".into(),
            ..GatewayResponse::default()
        });
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(body_of(response).await.is_empty());
    }

    #[tokio::test]
    async fn invalid_status_is_an_error() {
        let response = render_gateway_response(GatewayResponse {
            status_code: 42,
            ..GatewayResponse::default()
        });
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
