//! WebSocket session with the streaming avatar provider.
//!
//! The session speaks the JSON protocol from `parley_models::stream`. It can
//! be used directly or split into a sender and a receiver so that audio can
//! be pushed while frames are being consumed.

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use parley_models::{StreamClientMessage, StreamServerMessage};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::error::{AvatarError, AvatarResult};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// An open streaming session.
pub struct StreamSession {
    ws: WsStream,
}

impl StreamSession {
    /// Connect to the provider's streaming endpoint.
    pub async fn connect(url: &str) -> AvatarResult<Self> {
        let (ws, response) = tokio_tungstenite::connect_async(url).await?;
        info!(status = %response.status(), "Connected to avatar stream");
        Ok(Self { ws })
    }

    /// Send one protocol message.
    pub async fn send(&mut self, message: &StreamClientMessage) -> AvatarResult<()> {
        send_json(&mut self.ws, message).await
    }

    /// Open the session with the reference portrait.
    pub async fn init(
        &mut self,
        image_b64: impl Into<String>,
        figure_id: Option<String>,
        sample_rate: Option<u32>,
    ) -> AvatarResult<()> {
        self.send(&StreamClientMessage::Init {
            image_b64: image_b64.into(),
            figure_id,
            sample_rate,
        })
        .await
    }

    /// Send a slice of PCM audio.
    pub async fn send_audio(&mut self, audio_b64: impl Into<String>, sample_rate: u32) -> AvatarResult<()> {
        self.send(&StreamClientMessage::AudioChunk {
            audio_b64: audio_b64.into(),
            sample_rate,
            chunksize: None,
        })
        .await
    }

    /// Signal that no more audio follows.
    pub async fn end(&mut self) -> AvatarResult<()> {
        self.send(&StreamClientMessage::End).await
    }

    /// Next server event, or `None` once the socket is closed.
    pub async fn next_event(&mut self) -> Option<AvatarResult<StreamServerMessage>> {
        next_json(&mut self.ws).await
    }

    /// Close the socket.
    pub async fn close(mut self) -> AvatarResult<()> {
        self.ws.close(None).await?;
        Ok(())
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (StreamSender, StreamReceiver) {
        let (sink, stream) = self.ws.split();
        (StreamSender { sink }, StreamReceiver { stream })
    }
}

/// Write half of a split session.
pub struct StreamSender {
    sink: SplitSink<WsStream, WsMessage>,
}

impl StreamSender {
    pub async fn send(&mut self, message: &StreamClientMessage) -> AvatarResult<()> {
        let json = serde_json::to_string(message)?;
        debug!(kind = message.kind(), "-> avatar stream");
        self.sink.send(WsMessage::Text(json.into())).await?;
        Ok(())
    }

    pub async fn close(mut self) -> AvatarResult<()> {
        self.sink.close().await?;
        Ok(())
    }
}

/// Read half of a split session.
pub struct StreamReceiver {
    stream: SplitStream<WsStream>,
}

impl StreamReceiver {
    pub async fn next_event(&mut self) -> Option<AvatarResult<StreamServerMessage>> {
        next_json(&mut self.stream).await
    }
}

async fn send_json(ws: &mut WsStream, message: &StreamClientMessage) -> AvatarResult<()> {
    let json = serde_json::to_string(message)?;
    debug!(kind = message.kind(), "-> avatar stream");
    ws.send(WsMessage::Text(json.into())).await?;
    Ok(())
}

/// Read until a text frame decodes into a server message.
///
/// Pings, pongs and binary frames are skipped. A text frame that does not
/// decode is reported as an error without ending the stream.
async fn next_json<S>(stream: &mut S) -> Option<AvatarResult<StreamServerMessage>>
where
    S: futures_util::Stream<Item = Result<WsMessage, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = match stream.next().await? {
            Ok(m) => m,
            Err(e) => return Some(Err(e.into())),
        };

        match message {
            WsMessage::Text(text) => {
                let parsed = serde_json::from_str::<StreamServerMessage>(&text).map_err(|e| {
                    AvatarError::UnexpectedResponse(format!("invalid stream message: {}", e))
                });
                return Some(parsed);
            }
            WsMessage::Close(frame) => {
                debug!(?frame, "Avatar stream closed by provider");
                return None;
            }
            WsMessage::Binary(data) => {
                warn!(bytes = data.len(), "Ignoring binary frame from avatar stream");
            }
            _ => {}
        }
    }
}
