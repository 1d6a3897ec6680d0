//! Streaming avatar proxy with backpressure.
//!
//! The client must open with an `init` message. After that, client messages
//! are forwarded to the provider's stream and provider events are forwarded
//! back. Provider failures reach the client as `error` messages, and closing
//! either side closes both.

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::stream::SplitStream;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use parley_avatar::{StreamReceiver, StreamSession};
use parley_models::{StreamClientMessage, StreamServerMessage};

use crate::metrics;
use crate::state::AppState;

static ACTIVE_WS_CONNECTIONS: AtomicI64 = AtomicI64::new(0);

const WS_SEND_BUFFER_SIZE: usize = 32;
const WS_INIT_TIMEOUT: Duration = Duration::from_secs(60);

/// `GET /functions/v1/ditto-stream`
pub async fn ditto_stream(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let count = ACTIVE_WS_CONNECTIONS.fetch_add(1, Ordering::SeqCst) + 1;
    metrics::set_ws_active_connections(count);
    metrics::record_ws_connection();

    ws.on_upgrade(|socket| async move {
        proxy_socket(socket, state.stream_url).await;
        let count = ACTIVE_WS_CONNECTIONS.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::set_ws_active_connections(count);
    })
}

/// Queue a server message for the client. Returns false once the client is gone.
async fn send_ws_message(tx: &mpsc::Sender<Message>, msg: &StreamServerMessage) -> bool {
    let json = match serde_json::to_string(msg) {
        Ok(j) => j,
        Err(_) => return false,
    };
    match tx.try_send(Message::Text(json)) {
        Ok(()) => true,
        Err(mpsc::error::TrySendError::Full(message)) => {
            debug!("Stream send buffer full, applying backpressure");
            tx.send(message).await.is_ok()
        }
        Err(mpsc::error::TrySendError::Closed(_)) => false,
    }
}

async fn send_error(tx: &mpsc::Sender<Message>, message: impl Into<String>) {
    let message = message.into();
    warn!("Stream proxy error: {}", message);
    send_ws_message(tx, &StreamServerMessage::error(message)).await;
}

/// Next decodable client message, or `None` once the client has gone away.
async fn next_client_message(
    receiver: &mut SplitStream<WebSocket>,
) -> Option<Result<StreamClientMessage, serde_json::Error>> {
    while let Some(frame) = receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => return Some(serde_json::from_str(&text)),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
    None
}

async fn proxy_socket(socket: WebSocket, upstream_url: Option<String>) {
    let (ws_sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<Message>(WS_SEND_BUFFER_SIZE);

    let send_task = tokio::spawn(async move {
        let mut ws_sender = ws_sender;
        while let Some(msg) = rx.recv().await {
            if ws_sender.send(msg).await.is_err() {
                return;
            }
        }
        let _ = ws_sender.close().await;
    });

    relay(&mut receiver, &tx, upstream_url).await;

    drop(tx);
    let _ = send_task.await;
}

async fn relay(receiver: &mut SplitStream<WebSocket>, tx: &mpsc::Sender<Message>, upstream_url: Option<String>) {
    let init = match timeout(WS_INIT_TIMEOUT, next_client_message(receiver)).await {
        Ok(Some(Ok(init @ StreamClientMessage::Init { .. }))) => init,
        Ok(Some(Ok(other))) => {
            send_error(tx, format!("Expected init, got {}", other.kind())).await;
            return;
        }
        Ok(Some(Err(e))) => {
            send_error(tx, format!("Invalid message: {}", e)).await;
            return;
        }
        Ok(None) => return,
        Err(_) => {
            send_error(tx, "Timed out waiting for init").await;
            return;
        }
    };

    let Some(url) = upstream_url else {
        send_error(tx, "Streaming is not configured").await;
        return;
    };

    let session = match StreamSession::connect(&url).await {
        Ok(session) => session,
        Err(e) => {
            send_error(tx, format!("Upstream connection failed: {}", e)).await;
            return;
        }
    };
    let (mut upstream, events) = session.split();

    if let Err(e) = upstream.send(&init).await {
        send_error(tx, format!("Upstream send failed: {}", e)).await;
        return;
    }
    metrics::record_stream_message("upstream", init.kind());
    info!("Stream session opened");

    let mut downstream = tokio::spawn(forward_events(events, tx.clone()));

    loop {
        tokio::select! {
            _ = &mut downstream => break,
            incoming = next_client_message(receiver) => match incoming {
                Some(Ok(message)) => {
                    if let Err(e) = upstream.send(&message).await {
                        send_error(tx, format!("Upstream send failed: {}", e)).await;
                        break;
                    }
                    metrics::record_stream_message("upstream", message.kind());
                }
                Some(Err(e)) => send_error(tx, format!("Invalid message: {}", e)).await,
                None => {
                    debug!("Client closed stream");
                    break;
                }
            },
        }
    }

    downstream.abort();
    let _ = upstream.close().await;
    info!("Stream session closed");
}

/// Forward provider events to the client until a terminal event, an error or
/// either side closing.
async fn forward_events(mut events: StreamReceiver, tx: mpsc::Sender<Message>) {
    while let Some(event) = events.next_event().await {
        match event {
            Ok(message) => {
                let terminal = message.is_terminal();
                if !send_ws_message(&tx, &message).await {
                    return;
                }
                metrics::record_stream_message("downstream", message.kind());
                if terminal {
                    return;
                }
            }
            Err(e) => {
                send_error(&tx, format!("Upstream stream failed: {}", e)).await;
                return;
            }
        }
    }
    send_error(&tx, "Upstream closed the stream").await;
}
