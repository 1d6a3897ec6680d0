mod common;

use std::net::SocketAddr;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;

use common::{fast_poll, test_state};
use parley_api::{create_router, ApiConfig};

/// Fake provider: expects init, answers `ready`, echoes each audio chunk as
/// a frame and finishes with `complete` after `end`.
async fn fake_provider() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.unwrap();
        let mut ws = tokio_tungstenite::accept_async(stream).await.unwrap();
        let mut frames = 0u64;

        while let Some(Ok(Message::Text(text))) = ws.next().await {
            let message: Value = serde_json::from_str(&text).unwrap();
            let reply = match message["type"].as_str() {
                Some("init") => json!({"type": "ready"}),
                Some("audio_chunk") => {
                    frames += 1;
                    json!({"type": "frame", "data": message["audio_b64"], "format": "jpeg", "index": frames})
                }
                Some("end") => json!({"type": "complete", "frames": frames}),
                _ => json!({"type": "error", "message": "unexpected"}),
            };
            ws.send(Message::Text(reply.to_string().into())).await.unwrap();
        }
    });

    format!("ws://{}", addr)
}

async fn serve(stream_url: Option<String>) -> SocketAddr {
    let server = wiremock::MockServer::start().await;
    let mut state = test_state(&server.uri(), ApiConfig::default(), fast_poll());
    state.stream_url = stream_url;

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = create_router(state, None);
    tokio::spawn(async move {
        // Keep the mock server alive with the app
        let _server = server;
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn next_json<S>(ws: &mut S) -> Value
where
    S: StreamExt<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => return serde_json::from_str(&text).unwrap(),
            Some(Ok(Message::Close(_))) | None => return Value::Null,
            Some(Ok(_)) => continue,
            Some(Err(e)) => panic!("client socket error: {}", e),
        }
    }
}

#[tokio::test]
async fn test_proxy_relays_both_directions() {
    let upstream = fake_provider().await;
    let addr = serve(Some(upstream)).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/functions/v1/ditto-stream", addr))
        .await
        .unwrap();

    ws.send(Message::Text(json!({"type": "init", "image_b64": "aW1n"}).to_string().into()))
        .await
        .unwrap();
    assert_eq!(next_json(&mut ws).await["type"], "ready");

    for chunk in ["YQ==", "Yg=="] {
        ws.send(Message::Text(
            json!({"type": "audio_chunk", "audio_b64": chunk, "sample_rate": 16000})
                .to_string()
                .into(),
        ))
        .await
        .unwrap();
        let frame = next_json(&mut ws).await;
        assert_eq!(frame["type"], "frame");
        assert_eq!(frame["data"], chunk);
    }

    ws.send(Message::Text(json!({"type": "end"}).to_string().into()))
        .await
        .unwrap();
    let complete = next_json(&mut ws).await;
    assert_eq!(complete, json!({"type": "complete", "frames": 2}));

    // Terminal event ends the session from the server side
    assert_eq!(next_json(&mut ws).await, Value::Null);
}

#[tokio::test]
async fn test_first_message_must_be_init() {
    let addr = serve(Some("ws://127.0.0.1:9".into())).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/functions/v1/ditto-stream", addr))
        .await
        .unwrap();

    ws.send(Message::Text(json!({"type": "end"}).to_string().into()))
        .await
        .unwrap();

    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert!(error["message"].as_str().unwrap().contains("init"));
    assert_eq!(next_json(&mut ws).await, Value::Null);
}

#[tokio::test]
async fn test_unreachable_upstream_becomes_error_message() {
    // Bind and drop to get a port nobody listens on
    let port = TcpListener::bind("127.0.0.1:0").await.unwrap().local_addr().unwrap().port();
    let addr = serve(Some(format!("ws://127.0.0.1:{}", port))).await;

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{}/functions/v1/ditto-stream", addr))
        .await
        .unwrap();
    ws.send(Message::Text(json!({"type": "init", "image_b64": "aW1n"}).to_string().into()))
        .await
        .unwrap();

    let error = next_json(&mut ws).await;
    assert_eq!(error["type"], "error");
    assert!(error["message"].as_str().unwrap().starts_with("Upstream connection failed"));
}
