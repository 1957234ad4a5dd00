//! Front end -> broker -> Runtime API -> function and back, over real sockets.
//!
//! The in-process tests play the function with an HTTP client task. The
//! ignored test launches a shell-script function and needs `/bin/sh` and
//! `curl`:
//!
//! ```bash
//! cargo test -p lambo-entry --test end_to_end -- --ignored
//! ```

use std::sync::Arc;
use std::time::Duration;

use lambo_core::Invoker;
use lambo_entry::{EntryKind, EntryPoint};
use lambo_runtime::runtime_api::HEADER_REQUEST_ID;
use lambo_runtime::{Broker, RuntimeApi, RuntimeConfig};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// What the fake function does with each job it receives.
#[derive(Clone, Copy)]
enum Behaviour {
    /// Reply with a gateway response echoing the request path.
    EchoPath,
    /// Reply with the opaque payload it was given.
    EchoPayload,
    /// Report `boom` as an error.
    Fail,
}

struct Stack {
    front: String,
    shutdown: CancellationToken,
}

async fn start(kind: EntryKind, behaviour: Behaviour) -> Stack {
    let config = RuntimeConfig::default();
    let broker = Arc::new(Broker::new(&config));
    let shutdown = CancellationToken::new();

    let api_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let api_addr = api_listener.local_addr().unwrap();
    let api = RuntimeApi::new(broker.clone(), &config, "e2e", shutdown.clone());
    tokio::spawn(api.serve(api_listener));
    tokio::spawn(fake_function(
        format!("http://{api_addr}/2018-06-01/runtime/invocation"),
        behaviour,
    ));

    let front_listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let front_addr = front_listener.local_addr().unwrap();
    let invoker: Arc<dyn Invoker> = broker;
    tokio::spawn(EntryPoint::new(kind, invoker).serve(front_listener, shutdown.clone()));

    Stack {
        front: format!("http://{front_addr}"),
        shutdown,
    }
}

/// A single sequential poll loop, like a real runtime client.
async fn fake_function(base: String, behaviour: Behaviour) {
    let http = reqwest::Client::new();
    loop {
        let Ok(job) = http.get(format!("{base}/next")).send().await else {
            return;
        };
        if !job.status().is_success() {
            return;
        }
        let id = job.headers()[HEADER_REQUEST_ID]
            .to_str()
            .unwrap()
            .to_string();
        let payload: Value = job.json().await.unwrap();

        let (outcome, body) = match behaviour {
            Behaviour::EchoPath => (
                "response",
                json!({"statusCode": 200, "body": payload["path"]}).to_string(),
            ),
            Behaviour::EchoPayload => ("response", payload.to_string()),
            Behaviour::Fail => ("error", "boom".to_string()),
        };
        let _ = http
            .post(format!("{base}/{id}/{outcome}"))
            .body(body)
            .send()
            .await;
    }
}

#[tokio::test]
async fn gateway_success_renders_function_response() {
    let stack = start(EntryKind::Gateway, Behaviour::EchoPath).await;

    let response = reqwest::get(format!("{}/foo", stack.front)).await.unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "/foo");

    stack.shutdown.cancel();
}

#[tokio::test]
async fn gateway_failure_renders_500_with_message() {
    let stack = start(EntryKind::Gateway, Behaviour::Fail).await;

    let response = reqwest::get(format!("{}/foo", stack.front)).await.unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(response.text().await.unwrap(), "boom");

    stack.shutdown.cancel();
}

#[tokio::test]
async fn gateway_serves_concurrent_requests_one_at_a_time() {
    let stack = start(EntryKind::Gateway, Behaviour::EchoPath).await;

    let requests = (0..20).map(|n| {
        let url = format!("{}/item/{n}", stack.front);
        tokio::spawn(async move {
            let response = reqwest::get(url).await.unwrap();
            (n, response.text().await.unwrap())
        })
    });
    for request in requests.collect::<Vec<_>>() {
        let (n, body) = request.await.unwrap();
        assert_eq!(body, format!("/item/{n}"));
    }

    stack.shutdown.cancel();
}

#[tokio::test]
async fn proxy_passes_opaque_events_through() {
    let stack = start(EntryKind::Proxy, Behaviour::EchoPayload).await;

    let response = reqwest::Client::new()
        .post(&stack.front)
        .json(&json!({"event_type": "", "event_body": {"Records": [1, 2]}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["response_body"], json!({"Records": [1, 2]}));

    stack.shutdown.cancel();
}

#[tokio::test]
async fn proxy_rejects_malformed_events() {
    let stack = start(EntryKind::Proxy, Behaviour::EchoPayload).await;

    let response = reqwest::Client::new()
        .post(&stack.front)
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    stack.shutdown.cancel();
}

#[tokio::test]
async fn proxy_failure_renders_500_with_message() {
    let stack = start(EntryKind::Proxy, Behaviour::Fail).await;

    let response = reqwest::Client::new()
        .post(&stack.front)
        .json(&json!({"event_body": {}}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 500);
    assert_eq!(response.text().await.unwrap(), "boom");

    stack.shutdown.cancel();
}

#[cfg(unix)]
#[tokio::test]
#[ignore] // Requires /bin/sh and curl
async fn gateway_against_real_function_process() {
    use std::os::unix::fs::PermissionsExt;

    use lambo_runtime::{LaunchOptions, Supervisor};

    let script = r#"#!/bin/sh
api="http://$AWS_LAMBDA_RUNTIME_API/2018-06-01/runtime/invocation"
while true; do
  id=$(curl -s -D - -o /dev/null "$api/next" | tr -d '\r' | awk -F': ' 'tolower($1)=="lambda-runtime-aws-request-id" {print $2}')
  [ -z "$id" ] && exit 0
  curl -s -o /dev/null -X POST -d '{"statusCode":200,"body":"/foo"}' "$api/$id/response"
done
"#;
    let tmp = tempfile::tempdir().unwrap();
    let path = tmp.path().join("bootstrap");
    std::fs::write(&path, script).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();

    let config = RuntimeConfig::default();
    let broker = Arc::new(Broker::new(&config));
    let mut supervisor = Supervisor::launch(LaunchOptions::new(&path), broker.clone(), &config)
        .await
        .unwrap();

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = CancellationToken::new();
    let invoker: Arc<dyn Invoker> = broker;
    tokio::spawn(EntryPoint::new(EntryKind::Gateway, invoker).serve(listener, shutdown.clone()));

    let response = tokio::time::timeout(
        Duration::from_secs(10),
        reqwest::get(format!("http://{addr}/foo")),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "/foo");

    shutdown.cancel();
    supervisor.close().await.unwrap();
}
