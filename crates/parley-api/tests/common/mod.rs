#![allow(dead_code)]

use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;
use wiremock::{Request as MockRequest, Respond, ResponseTemplate};

use parley_api::{create_router, ApiConfig, AppState};
use parley_avatar::{AvatarClient, AvatarConfig};
use parley_db::{DbClient, DbConfig, RetryConfig};
use parley_pipeline::PollPolicy;
use parley_storage::{StorageClient, StorageConfig};

/// State whose database, object storage and provider all live on `server`.
/// Storage objects sit under the `media` bucket path.
pub fn test_state(server_uri: &str, config: ApiConfig, poll: PollPolicy) -> AppState {
    let db = DbClient::new(DbConfig {
        base_url: format!("{}/rest/v1", server_uri),
        service_key: "service-key".into(),
        timeout: Duration::from_secs(5),
        connect_timeout: Duration::from_secs(2),
        retry: RetryConfig {
            max_retries: 0,
            base_delay_ms: 1,
            max_delay_ms: 1,
        },
    })
    .unwrap();

    let storage = StorageClient::new(StorageConfig {
        endpoint_url: server_uri.to_string(),
        access_key_id: "key".into(),
        secret_access_key: "secret".into(),
        bucket_name: "media".into(),
        region: "auto".into(),
        public_base_url: "https://cdn.example.com/media".into(),
    });

    let avatar = AvatarClient::new(AvatarConfig {
        base_url: server_uri.to_string(),
        stream_url: None,
        timeout: Duration::from_secs(5),
        max_retries: 0,
        retry_base_delay: Duration::from_millis(1),
        ..AvatarConfig::default()
    })
    .unwrap();

    AppState::from_parts(config, db, storage, avatar, poll)
}

pub fn fast_poll() -> PollPolicy {
    PollPolicy::flat(Duration::from_millis(10), 5)
}

pub fn app(state: AppState) -> Router {
    create_router(state, None)
}

pub async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

pub fn post_json(path: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

/// PostgREST-style `return=representation`: echo the posted row in an array.
pub struct EchoRow;

impl Respond for EchoRow {
    fn respond(&self, request: &MockRequest) -> ResponseTemplate {
        let row: Value = serde_json::from_slice(&request.body).unwrap();
        ResponseTemplate::new(201).set_body_json(Value::Array(vec![row]))
    }
}

/// Wait for the background pollers to release every in-flight request.
pub async fn wait_for_idle(state: &AppState) {
    for _ in 0..200 {
        if state.in_flight.is_empty() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("background pollers did not finish");
}
