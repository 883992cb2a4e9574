//! HttpFlowSource against a mock instance.

use std::time::Duration;

use flowkeep_core::{Flow, InstanceConfig, InstanceName};
use flowkeep_sync::{FetchError, FlowSource, HttpFlowSource};
use serde_json::json;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn instance(url: &str) -> InstanceConfig {
    InstanceConfig {
        name: InstanceName::from("mock"),
        url: url.to_string(),
        api_key: "secret-key".to_string(),
        enabled: true,
    }
}

async fn fetch(instance: InstanceConfig) -> Result<Vec<Flow>, FetchError> {
    fetch_with_timeout(instance, Duration::from_secs(5)).await
}

/// ureq is blocking; keep it off the runtime driving the mock server.
async fn fetch_with_timeout(
    instance: InstanceConfig,
    timeout: Duration,
) -> Result<Vec<Flow>, FetchError> {
    tokio::task::spawn_blocking(move || HttpFlowSource::new(timeout).fetch(&instance))
        .await
        .expect("fetch task")
}

#[tokio::test]
async fn returns_flows_with_bearer_auth() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chatflows"))
        .and(header("Authorization", "Bearer secret-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {
                "id": "abc123",
                "name": "Test Flow",
                "flowData": "{\"a\":1}",
                "updatedDate": "2024-05-01T10:00:00.000Z",
                "type": "chatflow",
                "deployed": false
            },
            {
                "id": "def456",
                "name": null,
                "flowData": null,
                "updatedDate": "2024-05-02T10:00:00.000Z"
            }
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let flows = fetch(instance(&server.uri())).await.expect("flows");

    assert_eq!(flows.len(), 2);
    assert_eq!(flows[0].name, "Test Flow");
    assert_eq!(flows[0].category(), "chatflow");
    assert_eq!(flows[0].updated_at, "2024-05-01T10:00:00.000Z");
    assert_eq!(flows[1].name, "");
    assert_eq!(flows[1].category(), "uncategorized");
}

#[tokio::test]
async fn trailing_slash_in_base_url_is_tolerated() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chatflows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    let flows = fetch(instance(&format!("{}/", server.uri())))
        .await
        .expect("flows");
    assert!(flows.is_empty());
}

#[tokio::test]
async fn server_error_is_reported_with_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chatflows"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .mount(&server)
        .await;

    let err = fetch(instance(&server.uri())).await.unwrap_err();
    match err {
        FetchError::Remote { status, body, .. } => {
            assert_eq!(status, 500);
            assert_eq!(body, "boom");
        }
        other => panic!("expected Remote, got {other:?}"),
    }
}

#[tokio::test]
async fn unauthorized_is_a_remote_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(401).set_body_string("Unauthorized Access"))
        .mount(&server)
        .await;

    let err = fetch(instance(&server.uri())).await.unwrap_err();
    assert!(matches!(err, FetchError::Remote { status: 401, .. }), "got: {err}");
}

#[tokio::test]
async fn non_array_body_is_a_decode_error() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chatflows"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"chatflows": []})))
        .mount(&server)
        .await;

    let err = fetch(instance(&server.uri())).await.unwrap_err();
    assert!(matches!(err, FetchError::Decode { .. }), "got: {err}");
}

#[tokio::test]
async fn unreachable_instance_is_a_transport_error() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let err = fetch(instance(&uri)).await.unwrap_err();
    assert!(matches!(err, FetchError::Transport { .. }), "got: {err}");
}

#[tokio::test]
async fn slow_instance_hits_the_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/v1/chatflows"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!([]))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let started = std::time::Instant::now();
    let err = fetch_with_timeout(instance(&server.uri()), Duration::from_millis(500))
        .await
        .unwrap_err();

    assert!(matches!(err, FetchError::Transport { .. }), "got: {err}");
    assert!(
        started.elapsed() < Duration::from_secs(4),
        "gave up after {:?}",
        started.elapsed()
    );
}
